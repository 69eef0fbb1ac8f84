// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bwenzi Core - USSD Session Engine
//!
//! This crate turns stateless per-keypress callbacks from a USSD aggregator
//! into multi-step conversations: member registration, business profiling,
//! subscription selection, and payment handoff. Session state lives in a
//! dual-tier store (in-memory cache plus SQLite write-through) so a process
//! restart resumes conversations mid-flow.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Mobile Network Aggregator                 │
//! │            (one POST per keypress, dead air on 5xx)          │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼ POST /ussd
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        bwenzi-core                           │
//! │   server ──► engine (dispatcher) ──► flows (state machine)   │
//! │                     │                                        │
//! │                     ▼                                        │
//! │          session manager (cache + durable)                   │
//! └───────┬──────────────────┬──────────────────┬───────────────┘
//!         │                  │                  │
//!         ▼                  ▼                  ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   SQLite     │   │   Member     │   │   Payment    │
//! │  (sessions)  │   │  Directory   │   │   Gateway    │
//! └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! # Conversation State Machine
//!
//! States are grouped into namespaces; each namespace is owned by one flow
//! module:
//!
//! | Namespace | States | Flow |
//! |-----------|--------|------|
//! | `reg_*` | terms → first_name → last_name → gender → province → district → address → business_sector → nrc → pin → pin_confirm | registration |
//! | `biz_*` | has_business → sector → name → revenue (skippable) | business profiling |
//! | `sub_*` | plan_select → cooperative → payment_method → mobile_choice/mobile_number → confirm | subscription |
//! | `pay_*` | processing → success / failed | payment retry |
//! | — | login_pin → main_menu | existing members |
//!
//! Invalid input never advances a state; the current step's prompt is shown
//! again. Every outbound reply is truncated to 160 characters.
//!
//! ## Payment Handoff
//!
//! The mobile-money gateway runs its own USSD dialogue on the handset, and
//! a handset holds at most one dialogue at a time. Confirming a mobile-money
//! payment therefore parks the registration keyed by a payment reference,
//! clears the session in both tiers, and ends the conversation - in every
//! outcome, success or failure.
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `BWENZI_DATABASE_PATH` | Yes | - | SQLite database file path |
//! | `BWENZI_HTTP_PORT` | No | `8080` | Callback server port |
//! | `BWENZI_SESSION_TIMEOUT_SECS` | No | `180` | Idle session lifetime |
//! | `BWENZI_DIRECTORY_URL` | No | `http://localhost:8001` | Member directory base URL |
//! | `BWENZI_GATEWAY_URL` | No | `http://localhost:8002` | Payment gateway base URL |
//! | `BWENZI_GATEWAY_TIMEOUT_SECS` | No | `10` | Gateway request timeout |
//! | `BWENZI_NOTIFY_URL` | No | `http://localhost:8003` | SMS service base URL |
//!
//! # Modules
//!
//! - [`config`]: Server configuration from environment variables
//! - [`engine`]: Turn dispatcher and per-session serialization
//! - [`flows`]: Conversation flows, one module per state namespace
//! - [`session`]: Session model and dual-tier session manager
//! - [`persistence`]: Durable store abstraction and backends
//! - [`clients`]: Member directory, payment gateway, and SMS clients
//! - [`validate`]: Input validation and reply truncation
//! - [`geography`]: Static province/district and profiling data
//! - [`server`]: HTTP callback server
//! - [`error`]: Error types with error code mapping

#![deny(missing_docs)]

/// Upstream collaborator traits and HTTP clients.
pub mod clients;

/// Server configuration loaded from environment variables.
pub mod config;

/// Turn dispatcher: routes keypresses through the state machine.
pub mod engine;

/// Error types for engine operations with error code mapping.
pub mod error;

/// Conversation flows, one module per state namespace.
pub mod flows;

/// Static Zambian geography and profiling data.
pub mod geography;

/// Durable session store abstraction and backends.
pub mod persistence;

/// HTTP callback server for the aggregator.
pub mod server;

/// Session model and the dual-tier session manager.
pub mod session;

/// Input validation and reply formatting.
pub mod validate;
