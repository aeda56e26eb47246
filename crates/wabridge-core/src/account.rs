// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account identity and selector matching.

use serde::Serialize;

use crate::types::SessionId;

/// How well a selector matched an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SelectorMatch {
    None,
    /// Case-insensitive substring of the label.
    Fuzzy,
    /// Session id, paired number, or full label.
    Exact,
}

/// The externally addressable identity of one account.
#[derive(Debug, Clone, Serialize)]
pub struct AccountIdentity {
    pub session_id: SessionId,
    pub label: String,
    /// Paired phone number, known once the device is linked.
    pub number: Option<String>,
}

fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

fn looks_like_number(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_digit() || c == '+' || c.is_whitespace())
}

impl AccountIdentity {
    pub fn matches(&self, selector: &str) -> SelectorMatch {
        let selector = selector.trim();
        if selector.is_empty() {
            return SelectorMatch::None;
        }

        if self.session_id.0 == selector || self.label.eq_ignore_ascii_case(selector) {
            return SelectorMatch::Exact;
        }

        if let Some(number) = &self.number {
            let wanted = digits(selector.split('@').next().unwrap_or_default());
            if looks_like_number(selector.split('@').next().unwrap_or_default())
                && !wanted.is_empty()
                && digits(number) == wanted
            {
                return SelectorMatch::Exact;
            }
        }

        if self
            .label
            .to_lowercase()
            .contains(&selector.to_lowercase())
        {
            return SelectorMatch::Fuzzy;
        }

        SelectorMatch::None
    }
}
