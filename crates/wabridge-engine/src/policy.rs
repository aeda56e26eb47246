// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime-adjustable per-account policy.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::info;
use wabridge_config::AccountConfig;

use crate::whitelist::WhitelistRule;

/// Inbound/outbound policy of one account, evaluated at ingestion and
/// submission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountPolicy {
    pub whitelist: WhitelistRule,
    pub ignore_self_messages: bool,
    pub mark_as_read: bool,
}

impl Default for AccountPolicy {
    fn default() -> Self {
        Self {
            whitelist: WhitelistRule::default(),
            ignore_self_messages: true,
            mark_as_read: true,
        }
    }
}

impl From<&AccountConfig> for AccountPolicy {
    fn from(config: &AccountConfig) -> Self {
        Self {
            whitelist: WhitelistRule::new(&config.whitelist),
            ignore_self_messages: config.ignore_self_messages,
            mark_as_read: config.mark_as_read,
        }
    }
}

/// Partial policy change submitted through the settings endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyUpdate {
    pub whitelist: Option<Vec<String>>,
    pub ignore_self_messages: Option<bool>,
    pub mark_as_read: Option<bool>,
}

/// Serializable view of the current policy.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyView {
    pub whitelist: Vec<String>,
    pub ignore_self_messages: bool,
    pub mark_as_read: bool,
}

/// Lock-free holder of the current policy. Readers take a snapshot per event.
pub struct PolicyHandle {
    current: ArcSwap<AccountPolicy>,
}

impl PolicyHandle {
    pub fn new(policy: AccountPolicy) -> Self {
        Self {
            current: ArcSwap::from_pointee(policy),
        }
    }

    pub fn load(&self) -> Arc<AccountPolicy> {
        self.current.load_full()
    }

    /// Applies a partial update and returns the new policy.
    pub fn update(&self, update: PolicyUpdate) -> Arc<AccountPolicy> {
        let mut next = (*self.load()).clone();
        if let Some(list) = update.whitelist {
            next.whitelist = WhitelistRule::new(&list);
        }
        if let Some(flag) = update.ignore_self_messages {
            next.ignore_self_messages = flag;
        }
        if let Some(flag) = update.mark_as_read {
            next.mark_as_read = flag;
        }
        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));
        info!(
            whitelist_entries = next.whitelist.entries().count(),
            ignore_self_messages = next.ignore_self_messages,
            mark_as_read = next.mark_as_read,
            "account policy updated"
        );
        next
    }

    pub fn view(&self) -> PolicyView {
        let policy = self.load();
        PolicyView {
            whitelist: policy.whitelist.entries().map(String::from).collect(),
            ignore_self_messages: policy.ignore_self_messages,
            mark_as_read: policy.mark_as_read,
        }
    }
}
