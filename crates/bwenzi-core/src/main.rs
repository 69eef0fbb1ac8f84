// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bwenzi Core - USSD Session Engine
//!
//! Binds the callback server over the SQLite-backed session store and the
//! HTTP collaborator clients (member directory, payment gateway, SMS).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};

use bwenzi_core::clients::{HttpMemberDirectory, HttpNotifier, HttpPaymentGateway};
use bwenzi_core::config::Config;
use bwenzi_core::engine::UssdEngine;
use bwenzi_core::persistence::{SessionStore, SqliteStore};
use bwenzi_core::server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bwenzi_core=info".parse()?),
        )
        .init();

    info!("Starting Bwenzi Core");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        http_addr = %config.http_addr,
        session_timeout_secs = config.session_timeout_secs,
        "Configuration loaded"
    );

    // Open the durable session store (creates file and runs migrations)
    let store = Arc::new(SqliteStore::from_path(&config.database_path).await?);
    store.health_check().await?;
    info!(path = %config.database_path, "Session store ready");

    // Shared HTTP client for all collaborators
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let directory = Arc::new(HttpMemberDirectory::new(http.clone(), &config.directory_url));
    let gateway = Arc::new(HttpPaymentGateway::new(
        http.clone(),
        &config.gateway_url,
        Duration::from_secs(config.gateway_timeout_secs),
    ));
    let notifier = Arc::new(HttpNotifier::new(http, &config.notify_url));

    let engine = Arc::new(UssdEngine::new(
        store,
        directory,
        gateway,
        notifier,
        config.session_timeout_secs,
    ));

    info!("Bwenzi Core initialized successfully");

    server::serve(config.http_addr, engine).await?;

    info!("Shutdown complete");
    Ok(())
}
