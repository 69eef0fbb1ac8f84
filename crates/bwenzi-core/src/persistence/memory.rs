// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory session store for tests and development.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use crate::error::EngineError;

use super::{PendingRegistrationRecord, SessionRecord, SessionStore};

/// In-memory durable store stand-in.
///
/// Applies the same freshness predicate as the SQLite backend. Can be
/// switched into an unavailable mode where every operation fails, to
/// exercise the engine's cache-only degraded path.
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, SessionRecord>>,
    pending: Mutex<HashMap<String, PendingRegistrationRecord>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated outage. While unavailable, every store operation
    /// returns a storage error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of session rows currently held, ignoring freshness.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Number of parked registrations.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Insert a raw session row, bypassing the availability toggle. Lets
    /// tests seed stale rows with arbitrary timestamps.
    pub fn seed_session(&self, record: SessionRecord) {
        self.sessions
            .lock()
            .unwrap()
            .insert(record.session_id.clone(), record);
    }

    fn check_available(&self, operation: &str) -> Result<(), EngineError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EngineError::StorageError {
                operation: operation.to_string(),
                details: "store unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for MemoryStore {
    async fn upsert_session(&self, record: &SessionRecord) -> Result<(), EngineError> {
        self.check_available("upsert_session")?;
        self.sessions
            .lock()
            .unwrap()
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn load_session(
        &self,
        session_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, EngineError> {
        self.check_available("load_session")?;
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .get(session_id)
            .filter(|r| r.last_activity > cutoff)
            .cloned())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), EngineError> {
        self.check_available("delete_session")?;
        self.sessions.lock().unwrap().remove(session_id);
        Ok(())
    }

    async fn save_pending_registration(
        &self,
        record: &PendingRegistrationRecord,
    ) -> Result<(), EngineError> {
        self.check_available("save_pending_registration")?;
        self.pending
            .lock()
            .unwrap()
            .insert(record.payment_reference.clone(), record.clone());
        Ok(())
    }

    async fn load_pending_registration(
        &self,
        payment_reference: &str,
    ) -> Result<Option<PendingRegistrationRecord>, EngineError> {
        self.check_available("load_pending_registration")?;
        Ok(self
            .pending
            .lock()
            .unwrap()
            .get(payment_reference)
            .cloned())
    }

    async fn health_check(&self) -> Result<(), EngineError> {
        self.check_available("health_check")
    }
}
