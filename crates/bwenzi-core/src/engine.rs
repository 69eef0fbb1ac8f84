// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The turn dispatcher: one handset keypress in, one reply out.
//!
//! Every aggregator callback becomes a [`TurnRequest`]. The engine resolves
//! the session, routes the input to the flow that owns the current state,
//! and enforces the reply contract: never an HTTP error, never a reply over
//! the character limit, and turns on the same session are serialized while
//! different sessions proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};

use crate::clients::{MemberDirectory, MemberRecord, Notifier, PaymentGateway};
use crate::error::EngineError;
use crate::flows;
use crate::persistence::SessionStore;
use crate::session::{
    RegStep, ScratchPatch, Session, SessionManager, SessionPatch, SessionState,
};
use crate::validate::{self, MAX_REPLY_LEN};

/// One aggregator callback, decoded.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Aggregator-assigned session identifier.
    pub session_id: String,
    /// Subscriber number.
    pub msisdn: String,
    /// Raw accumulated input text; only the last `*`-separated segment is
    /// this turn's input.
    pub text: String,
    /// Whether the aggregator flagged this as a fresh dial-in.
    pub new_session: bool,
}

/// The reply for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    /// Message shown on the handset.
    pub text: String,
    /// Whether the aggregator should keep the session open for more input.
    pub continue_session: bool,
}

impl TurnReply {
    /// A reply that keeps the conversation open.
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            continue_session: true,
        }
    }

    /// A terminal reply; the aggregator tears the session down after it.
    pub fn end(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            continue_session: false,
        }
    }
}

/// The USSD engine: session manager plus upstream collaborators.
pub struct UssdEngine {
    pub(crate) sessions: SessionManager,
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) directory: Arc<dyn MemberDirectory>,
    pub(crate) gateway: Arc<dyn PaymentGateway>,
    pub(crate) notifier: Arc<dyn Notifier>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UssdEngine {
    /// Assemble an engine over a durable store and collaborator clients.
    pub fn new(
        store: Arc<dyn SessionStore>,
        directory: Arc<dyn MemberDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        session_timeout_secs: u64,
    ) -> Self {
        Self {
            sessions: SessionManager::new(store.clone(), session_timeout_secs),
            store,
            directory,
            gateway,
            notifier,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Check that the durable store is reachable.
    pub async fn health_check(&self) -> Result<(), EngineError> {
        self.store.health_check().await
    }

    /// Process one turn. Infallible by contract: any internal error becomes
    /// a generic terminal reply, and the outbound text is truncated to the
    /// aggregator limit.
    #[instrument(skip(self, request), fields(session_id = %request.session_id, msisdn = %request.msisdn))]
    pub async fn process_turn(&self, request: &TurnRequest) -> TurnReply {
        let _guard = self.acquire_turn(&request.session_id).await;

        let reply = match self.dispatch(request).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, code = e.error_code(), "turn processing failed");
                TurnReply::end("Service error. Please try again.")
            }
        };

        if !reply.continue_session {
            self.drop_turn_lock(&request.session_id).await;
        }

        TurnReply {
            text: validate::truncate_reply(&reply.text, MAX_REPLY_LEN),
            continue_session: reply.continue_session,
        }
    }

    async fn dispatch(&self, request: &TurnRequest) -> Result<TurnReply, EngineError> {
        let input = last_input_segment(&request.text);

        if request.new_session {
            self.sessions
                .create(&request.session_id, &request.msisdn)
                .await;

            if let Some(member) = self.lookup_member(&request.msisdn).await {
                return Ok(self.begin_login(&request.session_id, &member).await);
            }
            return Ok(self.start_registration(&request.session_id).await);
        }

        let Some(session) = self.sessions.get(&request.session_id).await else {
            // Expired or unknown mid-conversation session: restart cleanly
            // rather than erroring at the handset.
            info!(session_id = %request.session_id, "no live session, restarting registration");
            self.sessions
                .create(&request.session_id, &request.msisdn)
                .await;
            return Ok(self.start_registration(&request.session_id).await);
        };

        self.route(&session, input).await
    }

    async fn route(&self, session: &Session, input: &str) -> Result<TurnReply, EngineError> {
        match session.state {
            SessionState::Registration(step) => {
                flows::registration::handle(self, session, step, input).await
            }
            SessionState::Business(step) => {
                flows::business::handle(self, session, step, input).await
            }
            SessionState::Subscription(step) => {
                flows::subscription::handle(self, session, step, input).await
            }
            SessionState::Payment(step) => {
                flows::payment::handle(self, session, step, input).await
            }
            SessionState::LoginPin => flows::menu::handle_login_pin(self, session, input).await,
            SessionState::MainMenu => {
                flows::menu::handle_main_menu(self, &session.session_id, input).await
            }
            SessionState::Start => Ok(self.start_registration(&session.session_id).await),
        }
    }

    /// Open the registration flow at the terms step.
    pub(crate) async fn start_registration(&self, session_id: &str) -> TurnReply {
        self.sessions
            .update(
                session_id,
                SessionPatch::state(SessionState::Registration(RegStep::Terms)),
            )
            .await;

        TurnReply::prompt(flows::registration::terms_prompt())
    }

    async fn begin_login(&self, session_id: &str, member: &MemberRecord) -> TurnReply {
        info!(session_id, member_id = %member.id, "existing member, requesting PIN");
        self.sessions
            .update(
                session_id,
                SessionPatch::state(SessionState::LoginPin).with_scratch(ScratchPatch {
                    member_id: Some(member.id.clone()),
                    member_name: Some(member.first_name.clone()),
                    ..ScratchPatch::default()
                }),
            )
            .await;

        TurnReply::prompt(format!(
            "Welcome back {}!\nEnter your PIN:",
            member.first_name
        ))
    }

    /// Look up a member by subscriber number, trying the international,
    /// bare, and local number forms in that order. Directory outages fall
    /// through to registration.
    async fn lookup_member(&self, msisdn: &str) -> Option<MemberRecord> {
        let international = validate::format_phone_international(msisdn);
        let mut candidates = vec![international.clone()];
        if let Some(bare) = international.strip_prefix('+') {
            candidates.push(bare.to_string());
        }
        if let Some(subscriber) = international.strip_prefix("+260") {
            candidates.push(format!("0{}", subscriber));
        }

        for phone in candidates {
            match self.directory.find_by_phone(&phone).await {
                Ok(Some(member)) => return Some(member),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "member lookup failed, continuing to registration");
                    return None;
                }
            }
        }
        None
    }

    /// Take the per-session turn lock.
    ///
    /// A terminal turn drops its registry entry while still holding the
    /// lock, so a waiter parked on that entry may wake up holding a lock
    /// that is no longer the one new turns contend on. Re-check the
    /// registry after acquiring and retry on the fresh entry.
    async fn acquire_turn(&self, session_id: &str) -> OwnedMutexGuard<()> {
        loop {
            let lock = self.turn_lock(session_id).await;
            let guard = lock.clone().lock_owned().await;
            let locks = self.locks.lock().await;
            if locks
                .get(session_id)
                .is_some_and(|current| Arc::ptr_eq(current, &lock))
            {
                return guard;
            }
        }
    }

    async fn turn_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(session_id.to_string()).or_default().clone()
    }

    async fn drop_turn_lock(&self, session_id: &str) {
        let mut locks = self.locks.lock().await;
        locks.remove(session_id);
    }
}

/// The aggregator accumulates input as `1*John*Banda*...`; only the segment
/// after the last `*` belongs to this turn.
fn last_input_segment(text: &str) -> &str {
    text.rsplit('*').next().unwrap_or_default().trim()
}
