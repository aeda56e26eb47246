// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook sink definitions and the single-attempt delivery primitive.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use wabridge_config::{WebhookConfig, WebhookSinkConfig};
use wabridge_core::SessionId;
use wabridge_resilience::Backoff;

use crate::signing::{SIGNATURE_HEADER, TOKEN_HEADER, sign};

/// A sink as the forwarder sees it: the configured selector plus the
/// session it resolved to.
#[derive(Clone, PartialEq)]
pub struct SinkSpec {
    pub id: String,
    pub url: String,
    pub token: Option<String>,
    pub enabled: bool,
    /// Selector as configured, kept for listing.
    pub account: Option<String>,
    /// Resolved session. `None` receives events from every session.
    pub session: Option<SessionId>,
}

impl SinkSpec {
    pub fn from_config(config: &WebhookSinkConfig, session: Option<SessionId>) -> Self {
        Self {
            id: config.id.clone(),
            url: config.url.clone(),
            token: config.token.clone(),
            enabled: config.enabled,
            account: config.account.clone(),
            session,
        }
    }

    pub fn accepts(&self, session: &SessionId) -> bool {
        self.enabled && self.session.as_ref().is_none_or(|s| s == session)
    }

    pub fn view(&self) -> SinkView {
        SinkView {
            id: self.id.clone(),
            url: self.url.clone(),
            enabled: self.enabled,
            account: self.account.clone(),
            session_id: self.session.clone(),
            has_token: self.token.is_some(),
        }
    }
}

impl std::fmt::Debug for SinkSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkSpec")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .field("enabled", &self.enabled)
            .field("session", &self.session)
            .finish()
    }
}

/// Listing view. Never includes the token.
#[derive(Debug, Clone, Serialize)]
pub struct SinkView {
    pub id: String,
    pub url: String,
    pub enabled: bool,
    pub account: Option<String>,
    pub session_id: Option<SessionId>,
    pub has_token: bool,
}

/// Retry and queueing limits shared by all sinks.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryPolicy {
    /// Total attempts per event and sink.
    pub max_attempts: u32,
    pub timeout: Duration,
    pub backoff: Backoff,
    pub queue_capacity: usize,
}

impl DeliveryPolicy {
    pub fn from_config(config: &WebhookConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
            backoff: Backoff::from_millis(config.backoff_base_ms, config.backoff_max_ms),
            queue_capacity: config.queue_capacity.max(1),
        }
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::from_config(&WebhookConfig::default())
    }
}

/// Result of one POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Delivered,
    /// Worth another attempt.
    Transient(String),
    /// Will never succeed; drop the event for this sink.
    Permanent(String),
}

/// Maps a receiver status to a delivery decision. Auth failures are retried
/// since receivers often come up before their secret is configured.
pub fn classify(status: StatusCode) -> Attempt {
    if status.is_success() {
        return Attempt::Delivered;
    }
    match status {
        StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => Attempt::Transient(format!("receiver returned {status}")),
        s if s.is_server_error() => Attempt::Transient(format!("receiver returned {status}")),
        _ => Attempt::Permanent(format!("receiver returned {status}")),
    }
}

const AGENT: &str = concat!("wabridge/", env!("CARGO_PKG_VERSION"));

/// Posts `body` once.
pub async fn post(
    client: &reqwest::Client,
    spec: &SinkSpec,
    body: &[u8],
    timeout: Duration,
) -> Attempt {
    let mut request = client
        .post(&spec.url)
        .timeout(timeout)
        .header(CONTENT_TYPE, "application/json")
        .header(USER_AGENT, AGENT);
    if let Some(token) = &spec.token {
        let signature = match sign(token, body) {
            Ok(signature) => signature,
            Err(e) => return Attempt::Permanent(e.to_string()),
        };
        request = request
            .header(TOKEN_HEADER, token)
            .header(SIGNATURE_HEADER, signature);
    }

    match request.body(body.to_vec()).send().await {
        Ok(response) => classify(response.status()),
        Err(e) if e.is_timeout() => Attempt::Transient(format!("timed out after {timeout:?}")),
        Err(e) => Attempt::Transient(format!("request failed: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(classify(StatusCode::OK), Attempt::Delivered);
        assert_eq!(classify(StatusCode::NO_CONTENT), Attempt::Delivered);
        for retried in [401, 403, 408, 429, 500, 502, 503] {
            let status = StatusCode::from_u16(retried).unwrap();
            assert!(
                matches!(classify(status), Attempt::Transient(_)),
                "{retried} should be retried"
            );
        }
        for dropped in [400, 404, 410, 422] {
            let status = StatusCode::from_u16(dropped).unwrap();
            assert!(
                matches!(classify(status), Attempt::Permanent(_)),
                "{dropped} should be dropped"
            );
        }
    }

    #[test]
    fn accepts_respects_session_and_enabled() {
        let mut spec = SinkSpec {
            id: "ha".into(),
            url: "http://ha.local/hook".into(),
            token: Some("s3cret".into()),
            enabled: true,
            account: Some("home".into()),
            session: Some(SessionId::from("home")),
        };
        assert!(spec.accepts(&SessionId::from("home")));
        assert!(!spec.accepts(&SessionId::from("office")));

        spec.session = None;
        assert!(spec.accepts(&SessionId::from("office")));

        spec.enabled = false;
        assert!(!spec.accepts(&SessionId::from("home")));
    }

    #[test]
    fn view_and_debug_hide_token() {
        let spec = SinkSpec {
            id: "ha".into(),
            url: "http://ha.local/hook".into(),
            token: Some("s3cret".into()),
            enabled: true,
            account: None,
            session: None,
        };
        let json = serde_json::to_string(&spec.view()).unwrap();
        assert!(!json.contains("s3cret"));
        assert!(json.contains("\"has_token\":true"));
        assert!(!format!("{spec:?}").contains("s3cret"));
    }
}
