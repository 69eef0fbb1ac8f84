// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Input validation and reply formatting for USSD turns.
//!
//! All handset input passes through these checks before it is allowed to
//! advance the session state machine. Reply truncation keeps every outbound
//! message within the aggregator's character limit while preferring to cut
//! at a natural break.

/// Maximum length of an outbound USSD reply, imposed by the aggregator.
pub const MAX_REPLY_LEN: usize = 160;

/// Mobile network operator, classified from the subscriber number prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Airtel Zambia (097, 096)
    Airtel,
    /// MTN Zambia (076, 077)
    Mtn,
    /// Zamtel (095, 075, 098)
    Zamtel,
}

impl Operator {
    /// Lowercase operator name as used in member records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Airtel => "airtel",
            Operator::Mtn => "mtn",
            Operator::Zamtel => "zamtel",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "097" | "096" => Some(Operator::Airtel),
            "076" | "077" => Some(Operator::Mtn),
            "095" | "075" | "098" => Some(Operator::Zamtel),
            _ => None,
        }
    }
}

/// Validate a person name: non-empty, and alphabetic once spaces, hyphens,
/// apostrophes, and dots are removed.
pub fn validate_name(input: &str) -> bool {
    let stripped: String = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '\'' | '.'))
        .collect();
    !stripped.is_empty() && stripped.chars().all(|c| c.is_alphabetic())
}

/// Validate a PIN: exactly four ASCII digits.
pub fn validate_pin(input: &str) -> bool {
    input.len() == 4 && input.bytes().all(|b| b.is_ascii_digit())
}

/// Validate an NRC number in `123456/12/1` format.
pub fn validate_nrc(input: &str) -> bool {
    let b = input.as_bytes();
    b.len() == 11
        && b[..6].iter().all(u8::is_ascii_digit)
        && b[6] == b'/'
        && b[7..9].iter().all(u8::is_ascii_digit)
        && b[9] == b'/'
        && b[10].is_ascii_digit()
}

/// Validate a Zambian subscriber number and normalize it.
///
/// Accepts international (`260XXXXXXXXX`), local (`0XXXXXXXXX`), and bare
/// nine-digit forms; non-digit characters are stripped first. Returns the
/// international form together with the classified operator, or `None` for
/// an unknown prefix or wrong length.
pub fn normalize_phone(input: &str) -> Option<(String, Operator)> {
    let cleaned: String = input.chars().filter(|c| c.is_ascii_digit()).collect();

    let (prefix, full_number) = if let Some(rest) = cleaned.strip_prefix("260") {
        if cleaned.len() != 12 {
            return None;
        }
        (format!("0{}", &rest[..2]), cleaned.clone())
    } else if cleaned.starts_with('0') {
        if cleaned.len() != 10 {
            return None;
        }
        (cleaned[..3].to_string(), format!("260{}", &cleaned[1..]))
    } else if cleaned.len() == 9 {
        (format!("0{}", &cleaned[..2]), format!("260{}", cleaned))
    } else {
        return None;
    };

    Operator::from_prefix(&prefix).map(|op| (full_number, op))
}

/// Format a subscriber number for member records: `+260XXXXXXXXX`.
///
/// Handles international, local, and bare nine-digit input; anything else
/// gets a `+260` prefix as a best effort.
pub fn format_phone_international(input: &str) -> String {
    let cleaned: String = input.chars().filter(|c| c.is_ascii_digit()).collect();

    if cleaned.starts_with("260") && cleaned.len() == 12 {
        format!("+{}", cleaned)
    } else if cleaned.starts_with('0') && cleaned.len() == 10 {
        format!("+260{}", &cleaned[1..])
    } else if cleaned.len() == 9 {
        format!("+260{}", cleaned)
    } else if cleaned.starts_with("260") {
        format!("+{}", cleaned)
    } else {
        format!("+260{}", cleaned)
    }
}

/// Format an international number (`260XXXXXXXXX`) for handset display
/// (`0XXXXXXXXX`).
pub fn local_display(number: &str) -> String {
    let trimmed = number.strip_prefix("260").unwrap_or(number);
    if trimmed.starts_with('0') {
        trimmed.to_string()
    } else {
        format!("0{}", trimmed)
    }
}

/// Truncate a reply to fit within `limit` characters.
///
/// Prefers to cut at a paragraph, line, or sentence break, but only when
/// that keeps more than 70% of the limit; otherwise hard-cuts. Truncated
/// replies always end in `...`.
pub fn truncate_reply(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let budget: String = text.chars().take(limit.saturating_sub(3)).collect();
    let floor = (limit as f64 * 0.7) as usize;

    for pattern in ["\n\n", "\n", ". ", ", ", " "] {
        if let Some(pos) = budget.rfind(pattern)
            && budget[..pos].chars().count() > floor
        {
            return format!("{}...", &budget[..pos]);
        }
    }

    format!("{}...", budget)
}
