// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;

/// Bwenzi Core configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file backing the durable session tier
    pub database_path: String,
    /// HTTP listen address for the aggregator callback endpoint
    pub http_addr: SocketAddr,
    /// Idle session lifetime in seconds
    pub session_timeout_secs: u64,
    /// Base URL of the member directory service
    pub directory_url: String,
    /// Base URL of the mobile-money payment gateway
    pub gateway_url: String,
    /// Payment gateway request timeout in seconds
    pub gateway_timeout_secs: u64,
    /// Base URL of the SMS notification service
    pub notify_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `BWENZI_DATABASE_PATH`: SQLite database file path
    ///
    /// Optional (with defaults):
    /// - `BWENZI_HTTP_PORT`: HTTP callback server port (default: 8080)
    /// - `BWENZI_SESSION_TIMEOUT_SECS`: idle session lifetime (default: 180)
    /// - `BWENZI_DIRECTORY_URL`: member directory base URL (default: http://localhost:8001)
    /// - `BWENZI_GATEWAY_URL`: payment gateway base URL (default: http://localhost:8002)
    /// - `BWENZI_GATEWAY_TIMEOUT_SECS`: gateway request timeout (default: 10)
    /// - `BWENZI_NOTIFY_URL`: notification service base URL (default: http://localhost:8003)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_path = std::env::var("BWENZI_DATABASE_PATH")
            .map_err(|_| ConfigError::Missing("BWENZI_DATABASE_PATH"))?;

        let http_port: u16 = std::env::var("BWENZI_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("BWENZI_HTTP_PORT", "must be a valid port number")
            })?;

        let session_timeout_secs: u64 = std::env::var("BWENZI_SESSION_TIMEOUT_SECS")
            .unwrap_or_else(|_| "180".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("BWENZI_SESSION_TIMEOUT_SECS", "must be a positive integer")
            })?;

        let directory_url = std::env::var("BWENZI_DIRECTORY_URL")
            .unwrap_or_else(|_| "http://localhost:8001".to_string());

        let gateway_url = std::env::var("BWENZI_GATEWAY_URL")
            .unwrap_or_else(|_| "http://localhost:8002".to_string());

        let gateway_timeout_secs: u64 = std::env::var("BWENZI_GATEWAY_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("BWENZI_GATEWAY_TIMEOUT_SECS", "must be a positive integer")
            })?;

        let notify_url = std::env::var("BWENZI_NOTIFY_URL")
            .unwrap_or_else(|_| "http://localhost:8003".to_string());

        Ok(Self {
            database_path,
            http_addr: SocketAddr::from(([0, 0, 0, 0], http_port)),
            session_timeout_secs,
            directory_url,
            gateway_url,
            gateway_timeout_secs,
            notify_url,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
