// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the wabridge bridge.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across the bridge's traits and core operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Transport errors reported while talking to the protocol layer.
    ///
    /// `transient` distinguishes network hiccups and upstream rate limits
    /// (worth retrying) from rejections that will never succeed.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        transient: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The transport could not be initialized or reached at all.
    #[error("protocol unavailable: {0}")]
    ProtocolUnavailable(String),

    /// The peer is not on the account's allow-list.
    #[error("target {target} is not whitelisted")]
    NotWhitelisted { target: String },

    /// The session was reset while the operation was in flight.
    #[error("session was reset")]
    SessionReset,

    /// Upstream revoked the linked device; an explicit reset is required.
    #[error("session is logged out")]
    SessionLoggedOut,

    /// The session has no live connection to send through.
    #[error("session is not connected")]
    SessionNotConnected,

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// More than one account exists and no selector was given.
    #[error("{count} accounts are configured; specify which account to use")]
    AmbiguousAccount { count: usize },

    /// The selector did not match any account, or matched several equally well.
    #[error("no unique account matches '{selector}'")]
    AccountNotFound { selector: String },

    /// A polling cursor points before the oldest retained event.
    #[error("cursor {requested} is behind the retention window (oldest retained: {oldest})")]
    CursorTooOld { requested: u64, oldest: u64 },

    /// The caller supplied a malformed request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A looked-up record does not exist (or was already evicted).
    #[error("not found: {0}")]
    NotFound(String),

    /// Media download or save failed.
    #[error("media error: {0}")]
    Media(String),

    /// Webhook delivery failed.
    #[error("webhook error: {0}")]
    Webhook(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Shorthand for a transport error that should be retried.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            transient: true,
            source: None,
        }
    }

    /// Shorthand for a transport error that must not be retried.
    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            transient: false,
            source: None,
        }
    }

    /// Whether a bounded local retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                transient: true,
                ..
            } | Self::Timeout { .. }
                | Self::ProtocolUnavailable(_)
        )
    }

    /// Stable machine-readable code used in REST error bodies and send records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Storage { .. } => "storage",
            Self::Transport { .. } => "transport",
            Self::ProtocolUnavailable(_) => "protocol_unavailable",
            Self::NotWhitelisted { .. } => "not_whitelisted",
            Self::SessionReset => "session_reset",
            Self::SessionLoggedOut => "session_logged_out",
            Self::SessionNotConnected => "session_not_connected",
            Self::Timeout { .. } => "timeout",
            Self::AmbiguousAccount { .. } => "ambiguous_account",
            Self::AccountNotFound { .. } => "account_not_found",
            Self::CursorTooOld { .. } => "cursor_too_old",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::Media(_) => "media",
            Self::Webhook(_) => "webhook",
            Self::Internal(_) => "internal",
        }
    }
}
