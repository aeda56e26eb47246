// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sender/group allow-list.

use std::collections::BTreeSet;

use wabridge_core::jid::{canonical_number, ensure_jid};

/// Allowed sender numbers and group ids for one account.
///
/// Entries are normalized the same way as inbound JIDs, so `+49 111`,
/// `49111` and `49111@s.whatsapp.net` are the same rule. An empty rule
/// allows everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhitelistRule {
    entries: BTreeSet<String>,
}

impl WhitelistRule {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .map(|e| canonical_number(&ensure_jid(e.as_ref())))
            .filter(|e| !e.is_empty())
            .collect();
        Self { entries }
    }

    /// Parses a comma-separated rule string.
    pub fn parse(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a single peer (number, group id or JID) is allowed.
    pub fn allows(&self, peer: &str) -> bool {
        self.is_empty() || self.entries.contains(&canonical_number(&ensure_jid(peer)))
    }

    /// Inbound rule: dropped only when both the sender and the chat are absent.
    pub fn allows_event(&self, sender_jid: &str, chat_jid: &str) -> bool {
        self.allows(sender_jid) || self.allows(chat_jid)
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}
