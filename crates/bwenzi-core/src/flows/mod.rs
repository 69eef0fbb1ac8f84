// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Conversation flows, one module per state namespace.
//!
//! Each handler receives the engine, a snapshot of the session, and this
//! turn's input, applies at most one state transition through the session
//! manager, and returns the reply. Invalid input never advances the state;
//! it re-prompts the current step.

pub mod business;
pub mod menu;
pub mod payment;
pub mod registration;
pub mod subscription;

/// Title-case a name the way it will appear on the member record:
/// first letter of each word upper, rest lower.
pub(crate) fn title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
