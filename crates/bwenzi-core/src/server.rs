// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP callback server for the aggregator.
//!
//! One POST endpoint receives every keypress callback and always answers
//! HTTP 200 with a reply envelope; USSD aggregators treat transport errors
//! as dead air on the handset, so failures are expressed inside the
//! envelope instead. A health endpoint reports durable store reachability.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::engine::{TurnRequest, UssdEngine};

/// Aggregator callback payload.
#[derive(Debug, Clone, Deserialize)]
pub struct UssdRequest {
    /// Aggregator-assigned session identifier.
    pub session_id: String,
    /// Subscriber number.
    pub msisdn: String,
    /// Accumulated input text; absent on the first dial-in.
    #[serde(default)]
    pub text: String,
    /// Whether this callback opens a fresh session.
    #[serde(default)]
    pub new_session: bool,
}

/// Reply envelope the aggregator renders on the handset.
#[derive(Debug, Clone, Serialize)]
pub struct UssdResponse {
    /// Message text, at most 160 characters.
    pub response_string: String,
    /// Whether the session stays open for more input.
    pub continue_session: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
}

/// Build the callback router over a shared engine.
pub fn router(engine: Arc<UssdEngine>) -> Router {
    Router::new()
        .route("/ussd", post(handle_ussd))
        .route("/health", get(handle_health))
        .with_state(engine)
}

#[instrument(skip(engine, request), fields(session_id = %request.session_id))]
async fn handle_ussd(
    State(engine): State<Arc<UssdEngine>>,
    Json(request): Json<UssdRequest>,
) -> Json<UssdResponse> {
    let turn = TurnRequest {
        session_id: request.session_id,
        msisdn: request.msisdn,
        text: request.text,
        new_session: request.new_session,
    };

    let reply = engine.process_turn(&turn).await;

    Json(UssdResponse {
        response_string: reply.text,
        continue_session: reply.continue_session,
    })
}

async fn handle_health(State(engine): State<Arc<UssdEngine>>) -> Json<HealthResponse> {
    match engine.health_check().await {
        Ok(()) => Json(HealthResponse {
            status: "ok",
            database: "reachable",
        }),
        Err(_) => Json(HealthResponse {
            status: "degraded",
            database: "unreachable",
        }),
    }
}

/// Serve the callback endpoint until ctrl-c.
pub async fn serve(addr: SocketAddr, engine: Arc<UssdEngine>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "USSD callback server listening");

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
