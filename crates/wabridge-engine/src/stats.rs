// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-account message counters and last-activity summaries.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One remembered message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivitySummary {
    pub message: String,
    /// Target number for sends, sender number for receives.
    pub peer: String,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Serializable view of [`AccountStats`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub sent: u64,
    pub received: u64,
    pub failed: u64,
    pub last_sent: Option<ActivitySummary>,
    pub last_received: Option<ActivitySummary>,
    pub last_failed: Option<ActivitySummary>,
}

#[derive(Default)]
struct LastActivity {
    sent: Option<ActivitySummary>,
    received: Option<ActivitySummary>,
    failed: Option<ActivitySummary>,
}

/// Counters owned by one account.
#[derive(Default)]
pub struct AccountStats {
    sent: AtomicU64,
    received: AtomicU64,
    failed: AtomicU64,
    last: Mutex<LastActivity>,
}

/// Longest message text kept in a summary.
const SUMMARY_LEN: usize = 120;

fn summary(peer: &str, message: &str, error: Option<String>) -> ActivitySummary {
    ActivitySummary {
        message: message.chars().take(SUMMARY_LEN).collect(),
        peer: peer.to_string(),
        at: Utc::now(),
        error,
    }
}

impl AccountStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_last(&self, f: impl FnOnce(&mut LastActivity)) {
        let mut last = self
            .last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut last);
    }

    pub fn record_sent(&self, peer: &str, message: &str) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.with_last(|last| last.sent = Some(summary(peer, message, None)));
    }

    pub fn record_received(&self, peer: &str, message: &str) {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.with_last(|last| last.received = Some(summary(peer, message, None)));
    }

    pub fn record_failed(&self, peer: &str, message: &str, error: &str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.with_last(|last| {
            last.failed = Some(summary(peer, message, Some(error.to_string())));
        });
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let last = self
            .last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        StatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            last_sent: last.sent.clone(),
            last_received: last.received.clone(),
            last_failed: last.failed.clone(),
        }
    }
}
