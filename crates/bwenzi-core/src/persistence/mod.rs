// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for the durable session tier.
//!
//! This module defines the storage abstraction and backend implementations.
//! The engine treats the durable tier as best-effort: a failed write is
//! logged and the in-memory cache carries the session for the rest of its
//! short life.

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryStore;
pub use self::sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::EngineError;

/// Session row from the durable store.
///
/// The `scratch`, `registration`, and `attempts` columns hold JSON-encoded
/// bags; the typed view lives in [`crate::session::Session`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRecord {
    /// Aggregator-assigned session identifier.
    pub session_id: String,
    /// Subscriber number the aggregator reported for this session.
    pub msisdn: String,
    /// Current state machine position (wire form, e.g. `reg_terms`).
    pub state: String,
    /// JSON-encoded per-session scratch values.
    pub scratch: String,
    /// JSON-encoded registration data collected so far.
    pub registration: String,
    /// JSON-encoded retry counters.
    pub attempts: String,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Last turn activity; drives the idle-expiry predicate.
    pub last_activity: DateTime<Utc>,
}

/// Registration parked while an external mobile-money collection completes.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingRegistrationRecord {
    /// Payment reference handed to the gateway; primary key.
    pub payment_reference: String,
    /// Subscriber number the registration belongs to.
    pub msisdn: String,
    /// Amount the gateway was asked to collect.
    pub amount: f64,
    /// JSON-encoded registration data.
    pub registration: String,
    /// When the payment was initiated.
    pub created_at: DateTime<Utc>,
}

/// Abstraction over the durable session store.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or fully replace a session row.
    async fn upsert_session(&self, record: &SessionRecord) -> Result<(), EngineError>;

    /// Load a session by ID, excluding rows whose `last_activity` is at or
    /// before `cutoff`.
    async fn load_session(
        &self,
        session_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, EngineError>;

    /// Delete a session row. Deleting a missing row is not an error.
    async fn delete_session(&self, session_id: &str) -> Result<(), EngineError>;

    /// Park a registration awaiting payment confirmation.
    async fn save_pending_registration(
        &self,
        record: &PendingRegistrationRecord,
    ) -> Result<(), EngineError>;

    /// Look up a parked registration by payment reference.
    async fn load_pending_registration(
        &self,
        payment_reference: &str,
    ) -> Result<Option<PendingRegistrationRecord>, EngineError>;

    /// Verify the backing store is reachable.
    async fn health_check(&self) -> Result<(), EngineError>;
}
