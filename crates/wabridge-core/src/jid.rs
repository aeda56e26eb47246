// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JID normalization.
//!
//! Callers address peers loosely (`+49 151 1234`, `49151@s.whatsapp.net`,
//! `12345-6789`). Everything is normalized to a full JID before it reaches
//! the transport or the whitelist.

/// Domain of individual user JIDs.
pub const USER_DOMAIN: &str = "s.whatsapp.net";

/// Domain of group JIDs.
pub const GROUP_DOMAIN: &str = "g.us";

/// Normalizes a phone number, group id, or JID into a full JID.
///
/// Returns an empty string for blank input.
pub fn ensure_jid(target: &str) -> String {
    let target = target.trim();
    if target.is_empty() {
        return String::new();
    }
    if target.contains('@') {
        return target.to_string();
    }
    if target.contains('-') {
        return format!("{target}@{GROUP_DOMAIN}");
    }
    let digits: String = target
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '+')
        .collect();
    format!("{digits}@{USER_DOMAIN}")
}

/// Canonical number of a JID: the user part without `+` or device suffix.
pub fn canonical_number(jid: &str) -> String {
    let user = jid.split('@').next().unwrap_or_default();
    let user = user.split(':').next().unwrap_or_default();
    user.trim().trim_start_matches('+').to_string()
}

/// Whether the JID denotes a group chat.
pub fn is_group(jid: &str) -> bool {
    jid.ends_with(&format!("@{GROUP_DOMAIN}"))
}
