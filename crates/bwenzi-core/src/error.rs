// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for bwenzi-core.
//!
//! Provides a unified error type for session storage, validation, and
//! upstream collaborator failures. Errors never leak to the subscriber's
//! handset; the dispatcher maps them to a generic terminal reply.

use std::fmt;

/// Result type using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine errors that can occur while processing a USSD turn.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum EngineError {
    /// Session was not found (or had expired) in either store tier.
    SessionNotFound {
        /// The aggregator session ID that was not found.
        session_id: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Durable store operation failed.
    StorageError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// Payment gateway call failed.
    GatewayError {
        /// The reason for failure.
        reason: String,
    },

    /// Member directory call failed.
    DirectoryError {
        /// Error details.
        details: String,
    },

    /// Notification dispatch failed.
    NotifyError {
        /// Error details.
        details: String,
    },
}

impl EngineError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::StorageError { .. } => "STORAGE_ERROR",
            Self::GatewayError { .. } => "GATEWAY_ERROR",
            Self::DirectoryError { .. } => "DIRECTORY_ERROR",
            Self::NotifyError { .. } => "NOTIFY_ERROR",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound { session_id } => {
                write!(f, "Session '{}' not found", session_id)
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::StorageError { operation, details } => {
                write!(f, "Storage error during '{}': {}", operation, details)
            }
            Self::GatewayError { reason } => {
                write!(f, "Payment gateway error: {}", reason)
            }
            Self::DirectoryError { details } => {
                write!(f, "Member directory error: {}", details)
            }
            Self::NotifyError { details } => {
                write!(f, "Notification error: {}", details)
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::StorageError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::StorageError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}
