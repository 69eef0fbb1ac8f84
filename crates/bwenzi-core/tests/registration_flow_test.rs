// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end registration flow through the engine.

mod common;

use common::{REGISTRATION_INPUTS, TestContext};

const MSISDN: &str = "260977123456";

#[tokio::test]
async fn test_new_caller_gets_terms() {
    let ctx = TestContext::new();

    let reply = ctx.start("s-terms", MSISDN).await;
    assert!(reply.continue_session);
    assert!(reply.text.starts_with("Welcome to Bwenzi!"));
    assert!(reply.text.contains("1. Accept"));
    assert_eq!(ctx.stored_state("s-terms").await.as_deref(), Some("reg_terms"));
}

#[tokio::test]
async fn test_full_registration_to_business_question() {
    let ctx = TestContext::new();
    let sid = "s-full";

    let reply = ctx.start(sid, MSISDN).await;
    assert!(reply.text.contains("1. Accept"));

    let reply = ctx.input(sid, MSISDN, "1").await;
    assert_eq!(reply.text, "First name:");

    let reply = ctx.input(sid, MSISDN, "John").await;
    assert_eq!(reply.text, "Hi John!\nLast name:");

    let reply = ctx.input(sid, MSISDN, "Doe").await;
    assert_eq!(reply.text, "Gender:\n1. Male\n2. Female");

    let reply = ctx.input(sid, MSISDN, "1").await;
    assert!(reply.text.starts_with("Step 4/6\nProvince:"));

    let reply = ctx.input(sid, MSISDN, "5").await;
    assert!(reply.text.starts_with("Step 5/6\nDistrict in Lusaka:"));

    let reply = ctx.input(sid, MSISDN, "1").await;
    assert!(reply.text.starts_with("Step 6/6\nDistrict: Lusaka"));

    let reply = ctx.input(sid, MSISDN, "Kabwata Central").await;
    assert!(reply.text.starts_with("Business Sector:"));

    let reply = ctx.input(sid, MSISDN, "3").await;
    assert!(reply.text.starts_with("NRC Number:"));

    let reply = ctx.input(sid, MSISDN, "0").await;
    assert_eq!(reply.text, "Create 4-digit PIN:");

    let reply = ctx.input(sid, MSISDN, "1234").await;
    assert_eq!(reply.text, "Confirm PIN:");

    let reply = ctx.input(sid, MSISDN, "1234").await;
    assert!(reply.continue_session);
    assert!(reply.text.starts_with("PIN set!"));

    assert_eq!(
        ctx.stored_state(sid).await.as_deref(),
        Some("biz_has_business")
    );
    let reg = ctx.stored_registration(sid).await.unwrap();
    assert_eq!(reg["first_name"], "John");
    assert_eq!(reg["last_name"], "Doe");
    assert_eq!(reg["gender"], "Male");
    assert_eq!(reg["province"], "Lusaka");
    assert_eq!(reg["district"], "Lusaka");
    assert_eq!(reg["address"], "Kabwata Central");
    assert_eq!(reg["business_sector"], "retail");
    assert_eq!(reg["nrc_number"], "");
    assert_eq!(reg["pin"], "1234");
    assert_eq!(reg["phone_number"], MSISDN);
}

#[tokio::test]
async fn test_terms_decline_ends_session() {
    let ctx = TestContext::new();
    let sid = "s-decline";

    ctx.start(sid, MSISDN).await;
    let reply = ctx.input(sid, MSISDN, "2").await;

    assert!(!reply.continue_session);
    assert_eq!(reply.text, "Registration cancelled.\nThank you!");
    assert!(ctx.stored_state(sid).await.is_none());
}

#[tokio::test]
async fn test_invalid_terms_choice_reprompts() {
    let ctx = TestContext::new();
    let sid = "s-badterms";

    ctx.start(sid, MSISDN).await;
    let reply = ctx.input(sid, MSISDN, "9").await;

    assert!(reply.continue_session);
    assert!(reply.text.starts_with("Invalid choice.\nWelcome to Bwenzi!"));
    // The step did not advance; accepting still works.
    let reply = ctx.input(sid, MSISDN, "1").await;
    assert_eq!(reply.text, "First name:");
}

#[tokio::test]
async fn test_name_validation() {
    let ctx = TestContext::new();
    let sid = "s-names";

    ctx.start(sid, MSISDN).await;
    ctx.input(sid, MSISDN, "1").await;

    let reply = ctx.input(sid, MSISDN, "J0hn").await;
    assert_eq!(reply.text, "Letters only please.\nFirst name:");

    let reply = ctx.input(sid, MSISDN, "  ").await;
    assert_eq!(reply.text, "Enter your first name:");

    // Hyphens and apostrophes are part of real names
    let reply = ctx.input(sid, MSISDN, "anne-marie").await;
    assert!(reply.text.ends_with("Last name:"));

    let reply = ctx.input(sid, MSISDN, "O'Brien").await;
    assert_eq!(reply.text, "Gender:\n1. Male\n2. Female");
}

#[tokio::test]
async fn test_invalid_gender_does_not_advance() {
    let ctx = TestContext::new();
    let sid = "s-gender";

    let reply = ctx.drive(sid, MSISDN, &["1", "John", "Doe", "7"]).await;
    assert_eq!(reply.text, "Invalid selection.\nGender:\n1. Male\n2. Female");

    let reply = ctx.input(sid, MSISDN, "2").await;
    assert!(reply.text.starts_with("Step 4/6\nProvince:"));
    let reg = ctx.stored_registration(sid).await.unwrap();
    assert_eq!(reg["gender"], "Female");
}

#[tokio::test]
async fn test_invalid_province_and_district_redisplay_menus() {
    let ctx = TestContext::new();
    let sid = "s-geo";

    let reply = ctx.drive(sid, MSISDN, &["1", "John", "Doe", "1", "11"]).await;
    assert!(reply.text.starts_with("Step 4/6\nProvince:"));

    let reply = ctx.input(sid, MSISDN, "2").await;
    assert!(reply.text.starts_with("Step 5/6\nDistrict in Copperbelt:"));

    let reply = ctx.input(sid, MSISDN, "99").await;
    assert!(reply.text.starts_with("Step 5/6\nDistrict in Copperbelt:"));

    let reply = ctx.input(sid, MSISDN, "2").await;
    assert!(reply.text.starts_with("Step 6/6\nDistrict: Kitwe"));
}

#[tokio::test]
async fn test_address_minimum_length() {
    let ctx = TestContext::new();
    let sid = "s-addr";

    let reply = ctx
        .drive(sid, MSISDN, &["1", "John", "Doe", "1", "5", "1", "ab"])
        .await;
    assert_eq!(reply.text, "Address too short.\nAddress/Township:");

    let reply = ctx.input(sid, MSISDN, "Kabwata").await;
    assert!(reply.text.starts_with("Business Sector:"));
}

#[tokio::test]
async fn test_nrc_format_and_skip() {
    let ctx = TestContext::new();
    let sid = "s-nrc";

    let reply = ctx
        .drive(
            sid,
            MSISDN,
            &["1", "John", "Doe", "1", "5", "1", "Kabwata", "3", "12345"],
        )
        .await;
    assert_eq!(reply.text, "Format: 123456/12/1\nNRC (0=skip):");

    let reply = ctx.input(sid, MSISDN, "123456/78/1").await;
    assert_eq!(reply.text, "Create 4-digit PIN:");
    let reg = ctx.stored_registration(sid).await.unwrap();
    assert_eq!(reg["nrc_number"], "123456/78/1");
}

#[tokio::test]
async fn test_pin_mismatch_restarts_pin_entry() {
    let ctx = TestContext::new();
    let sid = "s-pin";

    let reply = ctx
        .drive(
            sid,
            MSISDN,
            &["1", "John", "Doe", "1", "5", "1", "Kabwata", "3", "0", "12"],
        )
        .await;
    assert_eq!(reply.text, "4 digits only.\nCreate PIN:");

    ctx.input(sid, MSISDN, "1234").await;
    let reply = ctx.input(sid, MSISDN, "9999").await;
    assert_eq!(reply.text, "PINs don't match.\nCreate 4-digit PIN:");

    // Second attempt with a fresh PIN succeeds
    ctx.input(sid, MSISDN, "5678").await;
    let reply = ctx.input(sid, MSISDN, "5678").await;
    assert!(reply.text.starts_with("PIN set!"));
    let reg = ctx.stored_registration(sid).await.unwrap();
    assert_eq!(reg["pin"], "5678");
}

#[tokio::test]
async fn test_accumulated_input_uses_last_segment() {
    let ctx = TestContext::new();
    let sid = "s-accum";

    ctx.start(sid, MSISDN).await;
    ctx.input(sid, MSISDN, "1").await;

    // Aggregators that send the full input history still work
    let reply = ctx.input(sid, MSISDN, "1*John").await;
    assert_eq!(reply.text, "Hi John!\nLast name:");

    let reply = ctx.input(sid, MSISDN, "1*John*Banda").await;
    assert_eq!(reply.text, "Gender:\n1. Male\n2. Female");
}

#[tokio::test]
async fn test_new_session_flag_restarts_from_scratch() {
    let ctx = TestContext::new();
    let sid = "s-restart";

    ctx.drive(sid, MSISDN, &["1", "John", "Doe"]).await;
    let reg = ctx.stored_registration(sid).await.unwrap();
    assert_eq!(reg["first_name"], "John");

    // Fresh dial-in with the same aggregator session id starts over
    let reply = ctx.start(sid, MSISDN).await;
    assert!(reply.text.starts_with("Welcome to Bwenzi!"));
    let reg = ctx.stored_registration(sid).await.unwrap();
    assert_eq!(reg["first_name"], "");
}

#[tokio::test]
async fn test_business_profile_collected() {
    let ctx = TestContext::new();
    let sid = "s-biz";

    let reply = ctx.drive(sid, MSISDN, REGISTRATION_INPUTS).await;
    assert!(reply.text.starts_with("PIN set!"));

    let reply = ctx.input(sid, MSISDN, "1").await;
    assert!(reply.text.starts_with("Business Type:"));
    assert!(reply.text.contains("7. Other"));

    let reply = ctx.input(sid, MSISDN, "5").await;
    assert_eq!(reply.text, "Business name:\n(or 0 to skip)");

    let reply = ctx.input(sid, MSISDN, "Zed Tech").await;
    assert!(reply.text.starts_with("Monthly revenue:"));

    let reply = ctx.input(sid, MSISDN, "2").await;
    assert!(reply.text.starts_with("Choose Plan:"));

    let reg = ctx.stored_registration(sid).await.unwrap();
    assert_eq!(reg["has_business"], true);
    assert_eq!(reg["business_sector"], "Technology");
    assert_eq!(reg["business_name"], "Zed Tech");
    assert_eq!(reg["monthly_revenue_range"], "K1,000 - K5,000");
}

#[tokio::test]
async fn test_planning_a_business_skips_profiling() {
    let ctx = TestContext::new();
    let sid = "s-plan";

    ctx.drive(sid, MSISDN, REGISTRATION_INPUTS).await;
    let reply = ctx.input(sid, MSISDN, "2").await;
    assert!(reply.text.starts_with("Choose Plan:"));

    let reg = ctx.stored_registration(sid).await.unwrap();
    assert_eq!(reg["has_business"], false);
    assert_eq!(reg["business_sector"], "planning");
}
