// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed session store implementation.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::EngineError;

use super::{PendingRegistrationRecord, SessionRecord, SessionStore};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed durable session store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store from an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a new SQLite store from a file path.
    ///
    /// This convenience constructor handles all setup:
    /// - Creates parent directories if they don't exist
    /// - Creates the database file if it doesn't exist
    /// - Connects to the database with sensible defaults
    /// - Runs all migrations
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file (e.g., ".data/sessions.db")
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = SqliteStore::from_path(".data/sessions.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::StorageError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let path_str = path.to_string_lossy();
        let url = format!("sqlite:{}?mode=rwc", path_str);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| EngineError::StorageError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {:?}: {}", path, e),
            })?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| EngineError::StorageError {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl SessionStore for SqliteStore {
    async fn upsert_session(&self, record: &SessionRecord) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT INTO ussd_sessions
                (session_id, msisdn, state, scratch, registration, attempts, created_at, last_activity)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (session_id) DO UPDATE SET
                msisdn = excluded.msisdn,
                state = excluded.state,
                scratch = excluded.scratch,
                registration = excluded.registration,
                attempts = excluded.attempts,
                last_activity = excluded.last_activity
            "#,
        )
        .bind(&record.session_id)
        .bind(&record.msisdn)
        .bind(&record.state)
        .bind(&record.scratch)
        .bind(&record.registration)
        .bind(&record.attempts)
        .bind(record.created_at)
        .bind(record.last_activity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_session(
        &self,
        session_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, EngineError> {
        let record = sqlx::query_as::<_, SessionRecord>(
            r#"
            SELECT session_id, msisdn, state, scratch, registration, attempts,
                   created_at, last_activity
            FROM ussd_sessions
            WHERE session_id = ?
              AND last_activity > ?
            "#,
        )
        .bind(session_id)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), EngineError> {
        sqlx::query("DELETE FROM ussd_sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn save_pending_registration(
        &self,
        record: &PendingRegistrationRecord,
    ) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT INTO pending_registrations
                (payment_reference, msisdn, amount, registration, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (payment_reference) DO UPDATE SET
                msisdn = excluded.msisdn,
                amount = excluded.amount,
                registration = excluded.registration
            "#,
        )
        .bind(&record.payment_reference)
        .bind(&record.msisdn)
        .bind(record.amount)
        .bind(&record.registration)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_pending_registration(
        &self,
        payment_reference: &str,
    ) -> Result<Option<PendingRegistrationRecord>, EngineError> {
        let record = sqlx::query_as::<_, PendingRegistrationRecord>(
            r#"
            SELECT payment_reference, msisdn, amount, registration, created_at
            FROM pending_registrations
            WHERE payment_reference = ?
            "#,
        )
        .bind(payment_reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn health_check(&self) -> Result<(), EngineError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
