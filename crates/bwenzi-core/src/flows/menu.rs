// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Existing-member login and main menu.
//!
//! Every dial-in by a known member goes through PIN verification before the
//! menu is shown; three wrong PINs end the session.

use tracing::{error, info};

use crate::engine::{TurnReply, UssdEngine};
use crate::error::EngineError;
use crate::session::{Attempts, Session, SessionPatch, SessionState};

const MAX_PIN_ATTEMPTS: u32 = 3;

/// Verify the login PIN for an existing member.
pub(crate) async fn handle_login_pin(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    let Some(member_id) = session.scratch.member_id.clone() else {
        engine.sessions.clear(&session.session_id).await;
        return Ok(TurnReply::end("Session error.\nPlease try again."));
    };

    match engine.directory.verify_pin(&member_id, input.trim()).await {
        Ok(true) => {
            let first_name = session
                .scratch
                .member_name
                .clone()
                .unwrap_or_else(|| "Member".to_string());
            Ok(show_main_menu(engine, &session.session_id, &first_name).await)
        }
        Ok(false) => {
            let attempts = session.attempts.pin + 1;
            if attempts >= MAX_PIN_ATTEMPTS {
                info!(session_id = %session.session_id, "PIN attempts exhausted, blocking");
                engine.sessions.clear(&session.session_id).await;
                return Ok(TurnReply::end(
                    "Too many attempts.\nAccess blocked.\nContact support.",
                ));
            }

            engine
                .sessions
                .update(
                    &session.session_id,
                    SessionPatch::default().with_attempts(Attempts { pin: attempts }),
                )
                .await;
            Ok(TurnReply::prompt(format!(
                "Wrong PIN.\n{} attempts left.\nEnter PIN:",
                MAX_PIN_ATTEMPTS - attempts
            )))
        }
        Err(e) => {
            error!(session_id = %session.session_id, error = %e, "PIN verification failed");
            engine.sessions.clear(&session.session_id).await;
            Ok(TurnReply::end("Verification error.\nPlease try again later."))
        }
    }
}

/// Move to the main menu after successful authentication.
pub(crate) async fn show_main_menu(
    engine: &UssdEngine,
    session_id: &str,
    first_name: &str,
) -> TurnReply {
    engine
        .sessions
        .update(session_id, SessionPatch::state(SessionState::MainMenu))
        .await;

    TurnReply::prompt(format!(
        "Hi {}!\n1. Balance\n2. Send Money\n3. Loans\n4. Bills\n5. Business\n0. Exit",
        first_name
    ))
}

/// Route one turn at the main menu.
pub(crate) async fn handle_main_menu(
    engine: &UssdEngine,
    session_id: &str,
    input: &str,
) -> Result<TurnReply, EngineError> {
    match input {
        "1" => {
            engine.sessions.clear(session_id).await;
            Ok(TurnReply::end("Balance: K0.00\nThank you for using Bwenzi!"))
        }
        "0" => {
            engine.sessions.clear(session_id).await;
            Ok(TurnReply::end("Thank you!\nGoodbye."))
        }
        _ => {
            engine.sessions.clear(session_id).await;
            Ok(TurnReply::end("Coming soon!\nThank you."))
        }
    }
}
