// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared test harness: an engine wired to the in-memory store and
//! scriptable collaborator fakes.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use bwenzi_core::clients::{MemberDirectory, MemberRecord, NewMember, Notifier, PaymentGateway};
use bwenzi_core::engine::{TurnReply, TurnRequest, UssdEngine};
use bwenzi_core::error::EngineError;
use bwenzi_core::persistence::MemoryStore;
use bwenzi_core::validate::MAX_REPLY_LEN;

/// Scripted gateway outcome for the next collection attempts.
#[derive(Debug, Clone, Copy)]
pub enum GatewayScript {
    /// Collection accepted for processing.
    Accept,
    /// Gateway answered but declined.
    Reject,
    /// Transport or service failure.
    Fail,
}

pub struct MockGateway {
    script: Mutex<GatewayScript>,
    pub calls: Mutex<Vec<(String, f64, String)>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(GatewayScript::Accept),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, script: GatewayScript) {
        *self.script.lock().unwrap() = script;
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MockGateway {
    async fn collect(
        &self,
        phone: &str,
        amount: f64,
        reference: &str,
    ) -> Result<bool, EngineError> {
        self.calls
            .lock()
            .unwrap()
            .push((phone.to_string(), amount, reference.to_string()));
        match *self.script.lock().unwrap() {
            GatewayScript::Accept => Ok(true),
            GatewayScript::Reject => Ok(false),
            GatewayScript::Fail => Err(EngineError::GatewayError {
                reason: "connection timed out".to_string(),
            }),
        }
    }
}

pub struct MockDirectory {
    member: Option<MemberRecord>,
    pin: String,
    pub created: Mutex<Vec<NewMember>>,
    fail_lookup: AtomicBool,
    fail_create: AtomicBool,
}

impl MockDirectory {
    /// Directory with no existing members.
    pub fn empty() -> Self {
        Self {
            member: None,
            pin: String::new(),
            created: Mutex::new(Vec::new()),
            fail_lookup: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
        }
    }

    /// Directory holding one member with the given login PIN.
    pub fn with_member(member: MemberRecord, pin: &str) -> Self {
        Self {
            member: Some(member),
            pin: pin.to_string(),
            ..Self::empty()
        }
    }

    pub fn fail_lookup(&self) {
        self.fail_lookup.store(true, Ordering::SeqCst);
    }

    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl MemberDirectory for MockDirectory {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<MemberRecord>, EngineError> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(EngineError::DirectoryError {
                details: "directory unreachable".to_string(),
            });
        }
        Ok(self
            .member
            .as_ref()
            .filter(|m| m.phone_number == phone)
            .cloned())
    }

    async fn verify_pin(&self, member_id: &str, pin: &str) -> Result<bool, EngineError> {
        let Some(member) = self.member.as_ref() else {
            return Ok(false);
        };
        Ok(member.id == member_id && self.pin == pin)
    }

    async fn create_member(&self, member: &NewMember) -> Result<MemberRecord, EngineError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(EngineError::DirectoryError {
                details: "directory unreachable".to_string(),
            });
        }
        self.created.lock().unwrap().push(member.clone());
        Ok(MemberRecord {
            id: format!("m-{}", self.created.lock().unwrap().len()),
            first_name: member.first_name.clone(),
            last_name: member.last_name.clone(),
            phone_number: member.phone_number.clone(),
        })
    }
}

pub struct MockNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Wait for at least `count` notifications; delivery is spawned off the
    /// turn, so tests poll briefly instead of asserting immediately.
    pub async fn wait_for_sent(&self, count: usize) -> bool {
        for _ in 0..50 {
            if self.sent_count() >= count {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        self.sent_count() >= count
    }
}

#[async_trait::async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, phone: &str, message: &str) -> Result<(), EngineError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::NotifyError {
                details: "sms service down".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((phone.to_string(), message.to_string()));
        Ok(())
    }
}

/// A full engine over fakes, plus handles to script and inspect them.
pub struct TestContext {
    pub engine: Arc<UssdEngine>,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MockGateway>,
    pub directory: Arc<MockDirectory>,
    pub notifier: Arc<MockNotifier>,
}

impl TestContext {
    /// Engine with an empty directory and the default 180s timeout.
    pub fn new() -> Self {
        Self::with_directory(MockDirectory::empty())
    }

    pub fn with_directory(directory: MockDirectory) -> Self {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let directory = Arc::new(directory);
        let notifier = Arc::new(MockNotifier::new());

        let engine = Arc::new(UssdEngine::new(
            store.clone(),
            directory.clone(),
            gateway.clone(),
            notifier.clone(),
            180,
        ));

        Self {
            engine,
            store,
            gateway,
            directory,
            notifier,
        }
    }

    /// Run one turn, asserting the universal reply invariants.
    pub async fn turn(
        &self,
        session_id: &str,
        msisdn: &str,
        text: &str,
        new_session: bool,
    ) -> TurnReply {
        let reply = self
            .engine
            .process_turn(&TurnRequest {
                session_id: session_id.to_string(),
                msisdn: msisdn.to_string(),
                text: text.to_string(),
                new_session,
            })
            .await;

        assert!(
            reply.text.chars().count() <= MAX_REPLY_LEN,
            "reply exceeds {} chars: {:?}",
            MAX_REPLY_LEN,
            reply.text
        );
        assert!(!reply.text.is_empty(), "reply text must not be empty");
        reply
    }

    /// Open a fresh session.
    pub async fn start(&self, session_id: &str, msisdn: &str) -> TurnReply {
        self.turn(session_id, msisdn, "", true).await
    }

    /// Continue an open session with one input.
    pub async fn input(&self, session_id: &str, msisdn: &str, text: &str) -> TurnReply {
        self.turn(session_id, msisdn, text, false).await
    }

    /// Open a session and feed a sequence of inputs, returning the last
    /// reply. Every intermediate reply must keep the session open.
    pub async fn drive(&self, session_id: &str, msisdn: &str, inputs: &[&str]) -> TurnReply {
        let mut reply = self.start(session_id, msisdn).await;
        for (i, input) in inputs.iter().enumerate() {
            assert!(
                reply.continue_session,
                "session ended early at step {}: {:?}",
                i, reply.text
            );
            reply = self.input(session_id, msisdn, input).await;
        }
        reply
    }

    /// Fetch the stored session state string, if a fresh row exists.
    pub async fn stored_state(&self, session_id: &str) -> Option<String> {
        use bwenzi_core::persistence::SessionStore;
        let cutoff = chrono::Utc::now() - chrono::Duration::seconds(180);
        self.store
            .load_session(session_id, cutoff)
            .await
            .ok()
            .flatten()
            .map(|r| r.state)
    }

    /// Fetch the stored registration bag as JSON, if a fresh row exists.
    pub async fn stored_registration(&self, session_id: &str) -> Option<serde_json::Value> {
        use bwenzi_core::persistence::SessionStore;
        let cutoff = chrono::Utc::now() - chrono::Duration::seconds(180);
        self.store
            .load_session(session_id, cutoff)
            .await
            .ok()
            .flatten()
            .and_then(|r| serde_json::from_str(&r.registration).ok())
    }
}

/// Inputs that take a brand-new caller from terms acceptance to the
/// business question: accept, names, gender, Lusaka/Lusaka, address,
/// retail, skip NRC, PIN twice.
pub const REGISTRATION_INPUTS: &[&str] = &[
    "1", "John", "Doe", "1", "5", "1", "Kabwata Central", "3", "0", "1234", "1234",
];

/// Continue from the business question to the payment confirmation:
/// no business, basic plan, no cooperative, mobile money, use own number.
pub const TO_CONFIRM_INPUTS: &[&str] = &["3", "1", "2", "1", "1"];
