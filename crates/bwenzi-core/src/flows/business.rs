// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Business profiling flow.
//!
//! Members without a business (or only planning one) skip straight to
//! subscription selection.

use crate::engine::{TurnReply, UssdEngine};
use crate::error::EngineError;
use crate::geography::{BUSINESS_SECTORS, REVENUE_RANGES};
use crate::session::{BizStep, RegistrationPatch, Session, SessionPatch, SessionState};

use super::subscription;

/// Route one turn within the business namespace.
pub(crate) async fn handle(
    engine: &UssdEngine,
    session: &Session,
    step: BizStep,
    input: &str,
) -> Result<TurnReply, EngineError> {
    match step {
        BizStep::HasBusiness => handle_has_business(engine, session, input).await,
        BizStep::Sector => handle_sector(engine, session, input).await,
        BizStep::Name => handle_name(engine, session, input).await,
        BizStep::Revenue => handle_revenue(engine, session, input).await,
    }
}

fn sector_menu() -> String {
    let mut menu = String::from("Business Type:\n");
    for (i, sector) in BUSINESS_SECTORS.iter().enumerate() {
        menu.push_str(&format!("{}. {}\n", i + 1, sector));
    }
    menu.truncate(menu.len() - 1);
    menu
}

fn revenue_menu() -> String {
    let mut menu = String::from("Monthly revenue:\n");
    for (i, range) in REVENUE_RANGES.iter().enumerate() {
        menu.push_str(&format!("{}. {}\n", i + 1, range));
    }
    menu
}

async fn handle_has_business(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    match input {
        "1" => {
            engine
                .sessions
                .update(
                    &session.session_id,
                    SessionPatch::state(SessionState::Business(BizStep::Sector))
                        .with_registration(RegistrationPatch {
                            has_business: Some(true),
                            ..RegistrationPatch::default()
                        }),
                )
                .await;
            Ok(TurnReply::prompt(sector_menu()))
        }
        "2" => {
            engine
                .sessions
                .update(
                    &session.session_id,
                    SessionPatch::default().with_registration(RegistrationPatch {
                        has_business: Some(false),
                        business_sector: Some("planning".to_string()),
                        ..RegistrationPatch::default()
                    }),
                )
                .await;
            Ok(subscription::begin(engine, &session.session_id).await)
        }
        "3" => Ok(subscription::begin(engine, &session.session_id).await),
        _ => Ok(TurnReply::prompt(
            "Do you have a business?\n1. Yes\n2. Planning\n3. No",
        )),
    }
}

async fn handle_sector(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    let sector = input
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|&n| n >= 1 && n <= BUSINESS_SECTORS.len())
        .map(|n| BUSINESS_SECTORS[n - 1]);

    let Some(sector) = sector else {
        return Ok(TurnReply::prompt(sector_menu()));
    };

    engine
        .sessions
        .update(
            &session.session_id,
            SessionPatch::state(SessionState::Business(BizStep::Name)).with_registration(
                RegistrationPatch {
                    business_sector: Some(sector.to_string()),
                    ..RegistrationPatch::default()
                },
            ),
        )
        .await;

    Ok(TurnReply::prompt("Business name:\n(or 0 to skip)"))
}

async fn handle_name(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    let name = input.trim();

    let registration = if name == "0" {
        RegistrationPatch::default()
    } else {
        RegistrationPatch {
            business_name: Some(name.to_string()),
            ..RegistrationPatch::default()
        }
    };

    engine
        .sessions
        .update(
            &session.session_id,
            SessionPatch::state(SessionState::Business(BizStep::Revenue))
                .with_registration(registration),
        )
        .await;

    Ok(TurnReply::prompt(revenue_menu()))
}

async fn handle_revenue(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    let range = input
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|&n| n >= 1 && n <= REVENUE_RANGES.len())
        .map(|n| REVENUE_RANGES[n - 1]);

    let Some(range) = range else {
        return Ok(TurnReply::prompt(revenue_menu()));
    };

    engine
        .sessions
        .update(
            &session.session_id,
            SessionPatch::default().with_registration(RegistrationPatch {
                monthly_revenue_range: Some(range.to_string()),
                ..RegistrationPatch::default()
            }),
        )
        .await;

    Ok(subscription::begin(engine, &session.session_id).await)
}
