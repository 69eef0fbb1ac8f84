// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Subscription selection and the payment handoff contract: every payment
//! outcome ends the conversation with the session already gone.

mod common;

use common::{GatewayScript, REGISTRATION_INPUTS, TO_CONFIRM_INPUTS, TestContext};

const MSISDN: &str = "260977123456";

/// Take a fresh caller all the way to the payment confirmation prompt.
async fn drive_to_confirm(ctx: &TestContext, sid: &str) {
    let inputs: Vec<&str> = REGISTRATION_INPUTS
        .iter()
        .chain(TO_CONFIRM_INPUTS.iter())
        .copied()
        .collect();
    let reply = ctx.drive(sid, MSISDN, &inputs).await;

    assert!(reply.text.starts_with("Confirm payment:\nJohn Doe"));
    assert!(reply.text.contains("Basic: K2.00"));
    assert!(reply.text.contains("From: 260977123456"));
    assert!(reply.text.ends_with("1. Pay Now\n2. Cancel"));
}

#[tokio::test]
async fn test_cooperative_fee_added_to_monthly_total() {
    let ctx = TestContext::new();
    let sid = "p-coop";

    ctx.drive(sid, MSISDN, REGISTRATION_INPUTS).await;
    ctx.input(sid, MSISDN, "3").await;
    let reply = ctx.input(sid, MSISDN, "1").await;
    assert_eq!(reply.text, "Join Cooperative?\n(K500/year)\n1. Yes\n2. No");

    // 2.00 + 500/12 = 43.67
    let reply = ctx.input(sid, MSISDN, "1").await;
    assert!(reply.text.starts_with("Total: K43.67/month"));
    assert!(reply.text.contains("1. Mobile Money"));
}

#[tokio::test]
async fn test_successful_handoff_parks_registration_and_clears_session() {
    let ctx = TestContext::new();
    let sid = "p-ok";
    drive_to_confirm(&ctx, sid).await;

    let reply = ctx.input(sid, MSISDN, "1").await;

    assert!(!reply.continue_session);
    assert!(reply.text.starts_with("Payment initiated."));
    assert!(reply.text.contains("Ref: BWZ"));

    // Session is gone from the durable tier
    assert!(ctx.stored_state(sid).await.is_none());
    assert_eq!(ctx.store.session_count(), 0);

    // Registration is parked for the payment callback to complete
    assert_eq!(ctx.store.pending_count(), 1);

    let calls = ctx.gateway.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (phone, amount, reference) = &calls[0];
    assert_eq!(phone, "260977123456");
    assert_eq!(*amount, 2.00);
    assert!(reference.starts_with("BWZ"));
    assert!(reply.text.contains(reference.as_str()));
}

#[tokio::test]
async fn test_rejected_collection_still_ends_and_clears() {
    let ctx = TestContext::new();
    let sid = "p-reject";
    drive_to_confirm(&ctx, sid).await;
    ctx.gateway.script(GatewayScript::Reject);

    let reply = ctx.input(sid, MSISDN, "1").await;

    assert!(!reply.continue_session);
    assert_eq!(reply.text, "Payment error.\nPlease try again later.\nThank you!");
    assert!(ctx.stored_state(sid).await.is_none());
    assert_eq!(ctx.store.session_count(), 0);
    assert_eq!(ctx.store.pending_count(), 0);
}

#[tokio::test]
async fn test_gateway_failure_still_ends_and_clears() {
    let ctx = TestContext::new();
    let sid = "p-fail";
    drive_to_confirm(&ctx, sid).await;
    ctx.gateway.script(GatewayScript::Fail);

    let reply = ctx.input(sid, MSISDN, "1").await;

    assert!(!reply.continue_session);
    assert_eq!(reply.text, "Service error.\nPlease try again.\nThank you!");
    assert!(ctx.stored_state(sid).await.is_none());
    assert_eq!(ctx.store.session_count(), 0);
}

#[tokio::test]
async fn test_confirmation_cancel_clears_session() {
    let ctx = TestContext::new();
    let sid = "p-cancel";
    drive_to_confirm(&ctx, sid).await;

    let reply = ctx.input(sid, MSISDN, "2").await;

    assert!(!reply.continue_session);
    assert_eq!(reply.text, "Registration cancelled.");
    assert!(ctx.stored_state(sid).await.is_none());
    assert_eq!(ctx.gateway.call_count(), 0);
}

#[tokio::test]
async fn test_invalid_confirmation_choice_redisplays() {
    let ctx = TestContext::new();
    let sid = "p-again";
    drive_to_confirm(&ctx, sid).await;

    let reply = ctx.input(sid, MSISDN, "9").await;
    assert!(reply.continue_session);
    assert!(reply.text.starts_with("Confirm payment:"));
    assert_eq!(ctx.gateway.call_count(), 0);
}

#[tokio::test]
async fn test_different_payment_number_collected() {
    let ctx = TestContext::new();
    let sid = "p-other";

    let inputs: Vec<&str> = REGISTRATION_INPUTS
        .iter()
        .chain(["3", "1", "2", "1", "2"].iter())
        .copied()
        .collect();
    let reply = ctx.drive(sid, MSISDN, &inputs).await;
    assert_eq!(reply.text, "Mobile Money number:\n(e.g. 0977123456)");

    let reply = ctx.input(sid, MSISDN, "0123456789").await;
    assert!(reply.text.starts_with("Invalid number."));

    let reply = ctx.input(sid, MSISDN, "0765555555").await;
    assert!(reply.text.contains("From: 260765555555"));

    ctx.input(sid, MSISDN, "1").await;
    let calls = ctx.gateway.calls.lock().unwrap();
    assert_eq!(calls[0].0, "260765555555");
}

#[tokio::test]
async fn test_bank_transfer_completes_registration_directly() {
    let ctx = TestContext::new();
    let sid = "p-bank";

    let inputs: Vec<&str> = REGISTRATION_INPUTS
        .iter()
        .chain(["3", "1", "2", "2"].iter())
        .copied()
        .collect();
    let reply = ctx.drive(sid, MSISDN, &inputs).await;
    assert!(reply.text.starts_with("Bank transfer:"));
    assert!(reply.text.contains("Amount: K2.00"));

    // "Done" goes straight to account creation, no gateway involved
    let reply = ctx.input(sid, MSISDN, "1").await;
    assert!(!reply.continue_session);
    assert!(reply.text.starts_with("Welcome John!\nAccount created successfully."));
    assert!(ctx.stored_state(sid).await.is_none());
    assert_eq!(ctx.gateway.call_count(), 0);

    assert_eq!(ctx.directory.created_count(), 1);
    let created = ctx.directory.created.lock().unwrap();
    assert_eq!(created[0].first_name, "John");
    assert_eq!(created[0].phone_number, "+260977123456");
    drop(created);

    // Welcome SMS is sent off the turn
    assert!(ctx.notifier.wait_for_sent(1).await);
    let sent = ctx.notifier.sent.lock().unwrap();
    assert_eq!(sent[0].0, "+260977123456");
    assert!(sent[0].1.starts_with("Welcome John!"));
}

fn seeded_subscription_record(
    session_id: &str,
    state: &str,
    scratch: &str,
) -> bwenzi_core::persistence::SessionRecord {
    let now = chrono::Utc::now();
    bwenzi_core::persistence::SessionRecord {
        session_id: session_id.to_string(),
        msisdn: MSISDN.to_string(),
        state: state.to_string(),
        scratch: scratch.to_string(),
        registration: format!(
            r#"{{"first_name":"John","last_name":"Doe","phone_number":"{}","payment_method":"mobile_money","payment_number":"260977123456"}}"#,
            MSISDN
        ),
        attempts: "{}".to_string(),
        created_at: now,
        last_activity: now,
    }
}

#[tokio::test]
async fn test_confirmation_with_lost_fee_restarts_plan_selection() {
    let ctx = TestContext::new();
    let sid = "p-lostfee";
    // Row written without the fee scratch, as after a partial bag loss
    ctx.store
        .seed_session(seeded_subscription_record(sid, "sub_confirm", "{}"));

    let reply = ctx.input(sid, MSISDN, "9").await;

    assert!(reply.continue_session);
    assert!(reply.text.starts_with("Choose Plan:"));
    assert!(!reply.text.contains("K0.00"));
    assert_eq!(
        ctx.stored_state(sid).await.as_deref(),
        Some("sub_plan_select")
    );
}

#[tokio::test]
async fn test_bank_details_with_lost_fee_restarts_plan_selection() {
    let ctx = TestContext::new();
    let sid = "p-lostfee-bank";
    ctx.store
        .seed_session(seeded_subscription_record(sid, "sub_payment_method", "{}"));

    let reply = ctx.input(sid, MSISDN, "2").await;

    assert!(reply.continue_session);
    assert!(reply.text.starts_with("Choose Plan:"));
    assert_eq!(
        ctx.stored_state(sid).await.as_deref(),
        Some("sub_plan_select")
    );
}

// The retry states are entered by the payment callback component writing
// the session row; this engine only ever resumes them.
fn failed_payment_record(session_id: &str) -> bwenzi_core::persistence::SessionRecord {
    let now = chrono::Utc::now();
    bwenzi_core::persistence::SessionRecord {
        session_id: session_id.to_string(),
        msisdn: MSISDN.to_string(),
        state: "pay_failed".to_string(),
        scratch: r#"{"total_fee":2.0,"payment_ref":"BWZ0123456789"}"#.to_string(),
        registration: format!(
            r#"{{"first_name":"John","last_name":"Doe","phone_number":"{}","payment_method":"mobile_money","payment_number":"260977123456"}}"#,
            MSISDN
        ),
        attempts: "{}".to_string(),
        created_at: now,
        last_activity: now,
    }
}

#[tokio::test]
async fn test_failed_payment_retry_charges_again_and_completes() {
    let ctx = TestContext::new();
    let sid = "p-retry";
    ctx.store.seed_session(failed_payment_record(sid));

    let reply = ctx.input(sid, MSISDN, "1").await;

    assert!(!reply.continue_session);
    assert!(reply.text.starts_with("Welcome John!"));
    assert_eq!(ctx.gateway.call_count(), 1);
    let calls = ctx.gateway.calls.lock().unwrap();
    assert_eq!(calls[0].2, "BWZ0123456789");
    drop(calls);
    assert_eq!(ctx.directory.created_count(), 1);
    assert!(ctx.stored_state(sid).await.is_none());
}

#[tokio::test]
async fn test_failed_payment_retry_can_fail_again() {
    let ctx = TestContext::new();
    let sid = "p-refail";
    ctx.store.seed_session(failed_payment_record(sid));
    ctx.gateway.script(GatewayScript::Reject);

    let reply = ctx.input(sid, MSISDN, "1").await;

    assert!(reply.continue_session);
    assert!(reply.text.starts_with("Payment failed."));
    assert_eq!(ctx.stored_state(sid).await.as_deref(), Some("pay_failed"));
}

#[tokio::test]
async fn test_failed_payment_cancel_clears_without_charge() {
    let ctx = TestContext::new();
    let sid = "p-giveup";
    ctx.store.seed_session(failed_payment_record(sid));

    let reply = ctx.input(sid, MSISDN, "2").await;

    assert!(!reply.continue_session);
    assert_eq!(reply.text, "Registration cancelled.\nNo charges applied.");
    assert_eq!(ctx.gateway.call_count(), 0);
    assert!(ctx.stored_state(sid).await.is_none());
}

#[tokio::test]
async fn test_notifier_failure_does_not_affect_reply() {
    let ctx = TestContext::new();
    let sid = "p-sms";
    ctx.notifier.fail();

    let inputs: Vec<&str> = REGISTRATION_INPUTS
        .iter()
        .chain(["3", "1", "2", "2"].iter())
        .copied()
        .collect();
    ctx.drive(sid, MSISDN, &inputs).await;

    let reply = ctx.input(sid, MSISDN, "1").await;
    assert!(!reply.continue_session);
    assert!(reply.text.starts_with("Welcome John!\nAccount created successfully."));
}

#[tokio::test]
async fn test_directory_failure_still_terminal_with_support_pointer() {
    let ctx = TestContext::new();
    let sid = "p-dir";
    ctx.directory.fail_create();

    let inputs: Vec<&str> = REGISTRATION_INPUTS
        .iter()
        .chain(["3", "1", "2", "2"].iter())
        .copied()
        .collect();
    ctx.drive(sid, MSISDN, &inputs).await;

    let reply = ctx.input(sid, MSISDN, "1").await;
    assert!(!reply.continue_session);
    assert!(reply.text.contains("contact support"));
    assert!(ctx.stored_state(sid).await.is_none());
}
