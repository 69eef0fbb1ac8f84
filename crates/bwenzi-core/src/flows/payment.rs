// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Payment handoff controller.
//!
//! The mobile-money gateway runs its own USSD prompt on the handset, and a
//! handset can only hold one USSD dialogue at a time. The session is
//! therefore cleared BEFORE the terminal reply goes out, in every outcome:
//! if the session lingered, the gateway's prompt would collide with ours.

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clients::NewMember;
use crate::engine::{TurnReply, UssdEngine};
use crate::error::EngineError;
use crate::persistence::PendingRegistrationRecord;
use crate::session::{PayStep, ScratchPatch, Session, SessionPatch, SessionState};

/// Route one turn within the payment namespace.
pub(crate) async fn handle(
    engine: &UssdEngine,
    session: &Session,
    step: PayStep,
    input: &str,
) -> Result<TurnReply, EngineError> {
    match step {
        PayStep::Processing => process_charge(engine, session).await,
        PayStep::Success => complete_with_payment(engine, session).await,
        PayStep::Failed => handle_failure(engine, session, input).await,
    }
}

/// Hand off to payment after final confirmation.
///
/// Mobile money: initiate the collection, park the registration keyed by
/// the payment reference, tear the session down, and end the dialogue so
/// the gateway can take over the handset. Bank transfer: complete the
/// registration immediately.
pub(crate) async fn initiate(
    engine: &UssdEngine,
    session_id: &str,
) -> Result<TurnReply, EngineError> {
    let Some(session) = engine.sessions.get(session_id).await else {
        return Ok(TurnReply::end("Session error.\nPlease try again."));
    };

    if session.registration.payment_method != "mobile_money" {
        return complete_registration(engine, &session).await;
    }

    let Some(amount) = session.scratch.total_fee else {
        warn!(session_id, "no total fee recorded, aborting payment");
        engine.sessions.clear(session_id).await;
        return Ok(TurnReply::end(
            "Service error.\nPlease try again.\nThank you!",
        ));
    };

    let reference = new_payment_reference();
    let phone = session.registration.payment_number.clone();

    match engine.gateway.collect(&phone, amount, &reference).await {
        Ok(true) => {
            info!(session_id, reference, amount, "payment collection initiated");
            park_registration(engine, &session, amount, &reference).await;
            engine.sessions.clear(session_id).await;
            Ok(TurnReply::end(format!(
                "Payment initiated.\nCheck your phone for payment prompt.\nRef: {}\nThank you!",
                reference
            )))
        }
        Ok(false) => {
            warn!(session_id, reference, "payment collection rejected");
            engine.sessions.clear(session_id).await;
            Ok(TurnReply::end(
                "Payment error.\nPlease try again later.\nThank you!",
            ))
        }
        Err(e) => {
            error!(session_id, reference, error = %e, "payment initiation failed");
            engine.sessions.clear(session_id).await;
            Ok(TurnReply::end(
                "Service error.\nPlease try again.\nThank you!",
            ))
        }
    }
}

/// Re-attempt an in-session charge using the stored payment reference.
async fn process_charge(
    engine: &UssdEngine,
    session: &Session,
) -> Result<TurnReply, EngineError> {
    let (Some(amount), Some(reference)) = (
        session.scratch.total_fee,
        session.scratch.payment_ref.clone(),
    ) else {
        engine.sessions.clear(&session.session_id).await;
        return Ok(TurnReply::end(
            "Service error.\nPlease try again.\nThank you!",
        ));
    };

    let phone = session.registration.payment_number.clone();
    match engine.gateway.collect(&phone, amount, &reference).await {
        Ok(true) => {
            engine
                .sessions
                .update(
                    &session.session_id,
                    SessionPatch::state(SessionState::Payment(PayStep::Success)),
                )
                .await;
            complete_with_payment(engine, session).await
        }
        Ok(false) => {
            engine
                .sessions
                .update(
                    &session.session_id,
                    SessionPatch::state(SessionState::Payment(PayStep::Failed)),
                )
                .await;
            Ok(TurnReply::prompt(
                "Payment failed.\nInsufficient funds or network error.\n1. Retry\n2. Cancel",
            ))
        }
        Err(e) => {
            error!(session_id = %session.session_id, error = %e, "charge attempt failed");
            engine
                .sessions
                .update(
                    &session.session_id,
                    SessionPatch::state(SessionState::Payment(PayStep::Failed)),
                )
                .await;
            Ok(TurnReply::prompt("Payment error.\n1. Retry\n2. Cancel"))
        }
    }
}

async fn handle_failure(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    match input {
        "1" => process_charge(engine, session).await,
        "2" => {
            engine.sessions.clear(&session.session_id).await;
            Ok(TurnReply::end("Registration cancelled.\nNo charges applied."))
        }
        _ => Ok(TurnReply::prompt("Payment failed.\n1. Retry\n2. Cancel")),
    }
}

/// Complete registration after a successful in-session charge. Always
/// terminal, and the session is gone before the reply leaves.
async fn complete_with_payment(
    engine: &UssdEngine,
    session: &Session,
) -> Result<TurnReply, EngineError> {
    let mut reply = complete_registration(engine, session).await?;
    engine.sessions.clear(&session.session_id).await;
    reply.continue_session = false;
    Ok(reply)
}

/// Create the member account and send the welcome SMS.
///
/// Directory failures still end the conversation with a support pointer;
/// the handset is a terrible place to retry account creation.
pub(crate) async fn complete_registration(
    engine: &UssdEngine,
    session: &Session,
) -> Result<TurnReply, EngineError> {
    let reg = &session.registration;
    let first_name = reg.first_name.clone();
    let member = NewMember::from_registration(reg);

    match engine.directory.create_member(&member).await {
        Ok(created) => {
            info!(
                session_id = %session.session_id,
                member_id = %created.id,
                "member account created"
            );

            // Welcome SMS is best-effort and must not delay the reply
            let notifier = engine.notifier.clone();
            let phone = member.phone_number.clone();
            let message = format!(
                "Welcome {}! Bwenzi account created. Visit https://bwenzi.io or dial *388#",
                first_name
            );
            tokio::spawn(async move {
                if let Err(e) = notifier.send(&phone, &message).await {
                    warn!(error = %e, "welcome SMS failed");
                }
            });

            engine.sessions.clear(&session.session_id).await;
            Ok(TurnReply::end(format!(
                "Welcome {}!\nAccount created successfully.\nDial *388# to access services.\nThank you!",
                first_name
            )))
        }
        Err(e) => {
            error!(session_id = %session.session_id, error = %e, "member creation failed");
            engine.sessions.clear(&session.session_id).await;
            Ok(TurnReply::end(format!(
                "Welcome {}!\nRegistration completed.\nIf you have issues, please contact support.\nThank you!",
                first_name
            )))
        }
    }
}

async fn park_registration(
    engine: &UssdEngine,
    session: &Session,
    amount: f64,
    reference: &str,
) {
    let registration = match serde_json::to_string(&session.registration) {
        Ok(json) => json,
        Err(e) => {
            error!(reference, error = %e, "failed to encode pending registration");
            return;
        }
    };

    let record = PendingRegistrationRecord {
        payment_reference: reference.to_string(),
        msisdn: session.msisdn.clone(),
        amount,
        registration,
        created_at: Utc::now(),
    };

    // A lost pending row means support has to finish the registration by
    // hand, but it must not block the payment handoff.
    if let Err(e) = engine.store.save_pending_registration(&record).await {
        error!(reference, error = %e, "failed to park pending registration");
    }
}

fn new_payment_reference() -> String {
    let unique = Uuid::new_v4().simple().to_string();
    format!("BWZ{}", unique[..10].to_uppercase())
}
