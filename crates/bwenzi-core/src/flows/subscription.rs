// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Subscription and payment-setup flow.
//!
//! Collects the plan, cooperative opt-in, and payment method, and funnels
//! into the final confirmation that hands off to the payment controller.

use crate::engine::{TurnReply, UssdEngine};
use crate::error::EngineError;
use crate::session::{
    RegistrationPatch, ScratchPatch, Session, SessionPatch, SessionState, SubStep,
};
use crate::validate;

use super::{payment, title_case};

/// Annual cooperative membership fee, spread over monthly billing.
const COOPERATIVE_ANNUAL_FEE: f64 = 500.0;

fn plan_menu() -> String {
    [
        "Choose Plan:",
        "1. Basic K2.00",
        "   Wallet + K500 loans",
        "2. Premium K2.00",
        "   Basic + K2000 loans",
        "3. Enterprise K2.00",
        "   Premium + K10000",
    ]
    .join("\n")
}

/// Enter the subscription flow at plan selection. Also used as the landing
/// point when the business flow is skipped.
pub(crate) async fn begin(engine: &UssdEngine, session_id: &str) -> TurnReply {
    engine
        .sessions
        .update(
            session_id,
            SessionPatch::state(SessionState::Subscription(SubStep::PlanSelect)),
        )
        .await;

    TurnReply::prompt(plan_menu())
}

/// Route one turn within the subscription namespace.
pub(crate) async fn handle(
    engine: &UssdEngine,
    session: &Session,
    step: SubStep,
    input: &str,
) -> Result<TurnReply, EngineError> {
    match step {
        SubStep::PlanSelect => handle_plan_select(engine, session, input).await,
        SubStep::Cooperative => handle_cooperative(engine, session, input).await,
        SubStep::PaymentMethod => handle_payment_method(engine, session, input).await,
        SubStep::MobileChoice => handle_mobile_choice(engine, session, input).await,
        SubStep::MobileNumber => handle_mobile_number(engine, session, input).await,
        SubStep::Confirm => handle_confirm(engine, session, input).await,
    }
}

async fn handle_plan_select(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    let (plan_id, price) = match input {
        "1" => ("basic", 2.00),
        "2" => ("premium", 2.00),
        "3" => ("enterprise", 2.00),
        _ => return Ok(begin(engine, &session.session_id).await),
    };

    engine
        .sessions
        .update(
            &session.session_id,
            SessionPatch::state(SessionState::Subscription(SubStep::Cooperative))
                .with_registration(RegistrationPatch {
                    subscription_plan: Some(plan_id.to_string()),
                    ..RegistrationPatch::default()
                })
                .with_scratch(ScratchPatch {
                    plan_price: Some(price),
                    ..ScratchPatch::default()
                }),
        )
        .await;

    Ok(TurnReply::prompt(
        "Join Cooperative?\n(K500/year)\n1. Yes\n2. No",
    ))
}

async fn handle_cooperative(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    // Plan price is set at plan selection; a missing value means the
    // session bag was lost, so restart the flow rather than guess a fee.
    let Some(base_price) = session.scratch.plan_price else {
        return Ok(begin(engine, &session.session_id).await);
    };

    let (join, total_fee, message) = match input {
        "1" => {
            let total = base_price + COOPERATIVE_ANNUAL_FEE / 12.0;
            (
                true,
                total,
                format!("Total: K{:.2}/month\n(includes cooperative)", total),
            )
        }
        "2" => (false, base_price, format!("Monthly: K{:.2}", base_price)),
        _ => {
            return Ok(TurnReply::prompt(
                "Join Cooperative?\n(K500/year)\n1. Yes\n2. No",
            ));
        }
    };

    engine
        .sessions
        .update(
            &session.session_id,
            SessionPatch::state(SessionState::Subscription(SubStep::PaymentMethod))
                .with_registration(RegistrationPatch {
                    cooperative_join: Some(join),
                    ..RegistrationPatch::default()
                })
                .with_scratch(ScratchPatch {
                    total_fee: Some(total_fee),
                    ..ScratchPatch::default()
                }),
        )
        .await;

    Ok(TurnReply::prompt(format!(
        "{}\nPayment:\n1. Mobile Money\n2. Bank Transfer",
        message
    )))
}

async fn handle_payment_method(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    match input {
        "1" => {
            match validate::normalize_phone(&session.registration.phone_number) {
                Some((cleaned, _)) => {
                    engine
                        .sessions
                        .update(
                            &session.session_id,
                            SessionPatch::state(SessionState::Subscription(SubStep::MobileChoice))
                                .with_registration(RegistrationPatch {
                                    payment_method: Some("mobile_money".to_string()),
                                    ..RegistrationPatch::default()
                                }),
                        )
                        .await;
                    Ok(TurnReply::prompt(format!(
                        "Mobile Money:\n1. Use {}\n2. Enter different number",
                        validate::local_display(&cleaned)
                    )))
                }
                None => {
                    // Session number unusable for billing, ask for one
                    engine
                        .sessions
                        .update(
                            &session.session_id,
                            SessionPatch::state(SessionState::Subscription(SubStep::MobileNumber))
                                .with_registration(RegistrationPatch {
                                    payment_method: Some("mobile_money".to_string()),
                                    ..RegistrationPatch::default()
                                }),
                        )
                        .await;
                    Ok(TurnReply::prompt("Mobile Money number:\n(e.g. 0977123456)"))
                }
            }
        }
        "2" => {
            // Never show a zero amount off a lost bag; re-derive the fee
            let Some(total_fee) = session.scratch.total_fee else {
                return Ok(begin(engine, &session.session_id).await);
            };
            engine
                .sessions
                .update(
                    &session.session_id,
                    SessionPatch::state(SessionState::Subscription(SubStep::Confirm))
                        .with_registration(RegistrationPatch {
                            payment_method: Some("bank_transfer".to_string()),
                            ..RegistrationPatch::default()
                        }),
                )
                .await;
            Ok(TurnReply::prompt(bank_details(total_fee)))
        }
        _ => Ok(TurnReply::prompt(
            "Payment method:\n1. Mobile Money\n2. Bank Transfer",
        )),
    }
}

async fn handle_mobile_choice(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    match input {
        "1" => match validate::normalize_phone(&session.registration.phone_number) {
            Some((cleaned, _)) => {
                engine
                    .sessions
                    .update(
                        &session.session_id,
                        SessionPatch::state(SessionState::Subscription(SubStep::Confirm))
                            .with_registration(RegistrationPatch {
                                payment_number: Some(cleaned),
                                ..RegistrationPatch::default()
                            }),
                    )
                    .await;
                confirmation(engine, &session.session_id).await
            }
            None => {
                engine
                    .sessions
                    .update(
                        &session.session_id,
                        SessionPatch::state(SessionState::Subscription(SubStep::MobileNumber)),
                    )
                    .await;
                Ok(TurnReply::prompt(
                    "Error with current number.\nEnter Mobile Money number:",
                ))
            }
        },
        "2" => {
            engine
                .sessions
                .update(
                    &session.session_id,
                    SessionPatch::state(SessionState::Subscription(SubStep::MobileNumber)),
                )
                .await;
            Ok(TurnReply::prompt("Mobile Money number:\n(e.g. 0977123456)"))
        }
        _ => {
            let display = validate::normalize_phone(&session.registration.phone_number)
                .map(|(cleaned, _)| validate::local_display(&cleaned))
                .unwrap_or_else(|| session.registration.phone_number.clone());
            Ok(TurnReply::prompt(format!(
                "Mobile Money:\n1. Use {}\n2. Enter different number",
                display
            )))
        }
    }
}

async fn handle_mobile_number(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    let Some((cleaned, _)) = validate::normalize_phone(input.trim()) else {
        return Ok(TurnReply::prompt(
            "Invalid number.\nValid: 097X, 096X, 095X, 076X, 077X, 075X, 098X\nTry again:",
        ));
    };

    engine
        .sessions
        .update(
            &session.session_id,
            SessionPatch::state(SessionState::Subscription(SubStep::Confirm)).with_registration(
                RegistrationPatch {
                    payment_number: Some(cleaned),
                    ..RegistrationPatch::default()
                },
            ),
        )
        .await;

    confirmation(engine, &session.session_id).await
}

async fn handle_confirm(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    match input {
        "1" => payment::initiate(engine, &session.session_id).await,
        "2" => {
            engine.sessions.clear(&session.session_id).await;
            Ok(TurnReply::end("Registration cancelled."))
        }
        _ => confirmation(engine, &session.session_id).await,
    }
}

/// Build the final confirmation prompt from the freshest session data.
async fn confirmation(engine: &UssdEngine, session_id: &str) -> Result<TurnReply, EngineError> {
    let Some(session) = engine.sessions.get(session_id).await else {
        return Ok(TurnReply::end("Session error.\nPlease try again."));
    };

    let reg = &session.registration;
    let Some(total_fee) = session.scratch.total_fee else {
        return Ok(begin(engine, session_id).await);
    };

    let mut text = format!(
        "Confirm payment:\n{} {}\n{}: K{:.2}\n",
        reg.first_name,
        reg.last_name,
        title_case(&reg.subscription_plan),
        total_fee
    );
    if !reg.payment_number.is_empty() {
        text.push_str(&format!("From: {}\n", reg.payment_number));
    }
    text.push_str("1. Pay Now\n2. Cancel");

    Ok(TurnReply::prompt(text))
}

fn bank_details(total_fee: f64) -> String {
    format!(
        "Bank transfer:\nStandard Chartered\nBwenzi Ltd\n0100234567890\nAmount: K{:.2}\nSend proof to:\n+260977000000\n1. Done\n2. Change method",
        total_fee
    )
}
