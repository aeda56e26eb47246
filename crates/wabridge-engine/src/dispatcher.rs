// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound dispatcher.
//!
//! `submit` validates synchronously and returns at once; a single worker per
//! session then performs the sends one at a time, in submission order, with
//! a per-attempt timeout and bounded exponential retry for transient
//! failures. Terminal records stay queryable for a retention window.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wabridge_config::BridgeConfig;
use wabridge_config::validation::MAX_RETRY_ATTEMPTS;
use wabridge_core::jid::{canonical_number, ensure_jid};
use wabridge_core::{
    BridgeError, MessageId, RequestId, SendPayload, SendRequest, SendState, SessionId,
    SessionObserver,
};
use wabridge_resilience::{Backoff, sleep_or_cancel};

use crate::policy::PolicyHandle;
use crate::session::SessionManager;
use crate::stats::AccountStats;

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Retries after the first attempt.
    pub retry_attempts: u32,
    pub send_timeout: Duration,
    pub backoff: Backoff,
    /// How long terminal records stay queryable.
    pub retention: Duration,
}

impl DispatchSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        let dispatch = &config.dispatch;
        Self {
            retry_attempts: dispatch.retry_attempts,
            send_timeout: Duration::from_secs(dispatch.send_timeout_secs),
            backoff: Backoff::from_millis(dispatch.backoff_base_ms, dispatch.backoff_max_ms),
            retention: Duration::from_secs(dispatch.result_retention_secs),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

/// Queryable state of one send request.
#[derive(Debug, Clone, Serialize)]
pub struct SendRecord {
    pub request_id: RequestId,
    pub session_id: SessionId,
    /// Normalized JID.
    pub target: String,
    pub kind: &'static str,
    pub state: SendState,
    /// Attempts started so far.
    pub attempts: u32,
    pub max_attempts: u32,
    pub message_id: Option<MessageId>,
    pub error: Option<String>,
    pub error_code: Option<&'static str>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    finished_at: Option<Instant>,
}

impl SendRecord {
    fn expired(&self, now: Instant, retention: Duration) -> bool {
        self.finished_at
            .is_some_and(|finished| now.duration_since(finished) >= retention)
    }
}

/// Synchronous answer to a submission.
#[derive(Debug, Clone, Serialize)]
pub struct SendAccepted {
    pub accepted: bool,
    pub request_id: RequestId,
    pub state: SendState,
}

impl From<&SendRecord> for SendAccepted {
    fn from(record: &SendRecord) -> Self {
        Self {
            accepted: true,
            request_id: record.request_id.clone(),
            state: record.state,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CancelReason {
    Reset,
    LoggedOut,
    Shutdown,
}

impl CancelReason {
    fn error(self) -> BridgeError {
        match self {
            Self::Reset => BridgeError::SessionReset,
            Self::LoggedOut => BridgeError::SessionLoggedOut,
            Self::Shutdown => BridgeError::Internal("bridge is shutting down".into()),
        }
    }
}

/// Jobs submitted between two cancellations share one generation.
struct Generation {
    token: CancellationToken,
    reason: OnceLock<CancelReason>,
}

impl Generation {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: OnceLock::new(),
        }
    }

    fn error(&self) -> BridgeError {
        self.reason
            .get()
            .copied()
            .unwrap_or(CancelReason::Reset)
            .error()
    }
}

struct Job {
    request_id: RequestId,
    jid: String,
    payload: SendPayload,
    max_attempts: u32,
    timeout: Duration,
    generation: Arc<Generation>,
}

pub struct OutboundDispatcher {
    session: Arc<SessionManager>,
    policy: Arc<PolicyHandle>,
    stats: Arc<AccountStats>,
    settings: DispatchSettings,
    records: DashMap<RequestId, SendRecord>,
    jobs: mpsc::UnboundedSender<Job>,
    generation: ArcSwap<Generation>,
    changed: Notify,
}

impl OutboundDispatcher {
    /// Creates the dispatcher and spawns its worker. The worker exits when
    /// `shutdown` fires, failing whatever is still queued.
    pub fn start(
        session: Arc<SessionManager>,
        policy: Arc<PolicyHandle>,
        stats: Arc<AccountStats>,
        settings: DispatchSettings,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (jobs, rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(Self {
            session,
            policy,
            stats,
            settings,
            records: DashMap::new(),
            jobs,
            generation: ArcSwap::from_pointee(Generation::new()),
            changed: Notify::new(),
        });
        tokio::spawn(Arc::clone(&dispatcher).run(rx, shutdown));
        dispatcher
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Validates and enqueues a send.
    ///
    /// Resubmitting a known `request_id` returns the existing record without
    /// dispatching again.
    pub fn submit(&self, request: SendRequest) -> Result<SendAccepted, BridgeError> {
        self.evict_expired();

        if let Some(id) = &request.request_id {
            if let Some(existing) = self.records.get(id) {
                debug!(request_id = %id, "duplicate submission, returning existing record");
                return Ok(SendAccepted::from(existing.value()));
            }
        }

        request.payload.validate()?;
        let jid = ensure_jid(&request.target);
        if jid.is_empty() {
            return Err(BridgeError::InvalidRequest("number is required".into()));
        }

        let summary = request.payload.summary();
        let peer = canonical_number(&jid);
        if !self.policy.load().whitelist.allows(&jid) {
            info!(session_id = %self.session.id(), target = %peer, "outbound target not whitelisted");
            self.stats.record_failed(&peer, &summary, "not whitelisted");
            return Err(BridgeError::NotWhitelisted { target: peer });
        }

        let request_id = request
            .request_id
            .unwrap_or_else(|| RequestId(uuid::Uuid::new_v4().to_string()));
        let retries = request
            .retry_attempts
            .unwrap_or(self.settings.retry_attempts)
            .min(MAX_RETRY_ATTEMPTS);
        let now = Utc::now();
        let record = SendRecord {
            request_id: request_id.clone(),
            session_id: self.session.id().clone(),
            target: jid.clone(),
            kind: request.payload.kind_name(),
            state: SendState::Pending,
            attempts: 0,
            max_attempts: retries + 1,
            message_id: None,
            error: None,
            error_code: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        };

        match self.records.entry(request_id.clone()) {
            Entry::Occupied(existing) => return Ok(SendAccepted::from(existing.get())),
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }

        let job = Job {
            request_id: request_id.clone(),
            jid,
            payload: request.payload,
            max_attempts: retries + 1,
            timeout: request.timeout.unwrap_or(self.settings.send_timeout),
            generation: self.generation.load_full(),
        };
        if self.jobs.send(job).is_err() {
            let err = BridgeError::Internal("dispatcher is not running".into());
            self.finish_failed(&request_id, &err);
            return Err(err);
        }

        debug!(session_id = %self.session.id(), request_id = %request_id, "send accepted");
        Ok(SendAccepted {
            accepted: true,
            request_id,
            state: SendState::Pending,
        })
    }

    /// Current record, `None` when unknown or past retention.
    pub fn get(&self, id: &RequestId) -> Option<SendRecord> {
        let now = Instant::now();
        let record = self.records.get(id)?.value().clone();
        if record.expired(now, self.settings.retention) {
            self.records.remove(id);
            return None;
        }
        Some(record)
    }

    /// Waits until the request is terminal or `timeout` elapses, then
    /// returns its latest record.
    pub async fn wait(&self, id: &RequestId, timeout: Duration) -> Option<SendRecord> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let record = self.get(id)?;
            if record.state.is_terminal() {
                return Some(record);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.get(id);
            }
        }
    }

    /// Requests not yet terminal.
    pub fn pending(&self) -> usize {
        self.records
            .iter()
            .filter(|r| !r.state.is_terminal())
            .count()
    }

    fn evict_expired(&self) {
        let now = Instant::now();
        let retention = self.settings.retention;
        self.records.retain(|_, record| !record.expired(now, retention));
    }

    /// Applies `f` to a non-terminal record. Returns `false` when the record
    /// is gone or already terminal.
    fn update(&self, id: &RequestId, f: impl FnOnce(&mut SendRecord)) -> bool {
        let Some(mut record) = self.records.get_mut(id) else {
            return false;
        };
        if record.state.is_terminal() {
            return false;
        }
        f(&mut record);
        record.updated_at = Utc::now();
        true
    }

    fn finish_acked(&self, job: &Job, message_id: MessageId) {
        let acked = self.update(&job.request_id, |r| {
            r.state = SendState::Acked;
            r.message_id = Some(message_id.clone());
            r.error = None;
            r.error_code = None;
            r.finished_at = Some(Instant::now());
        });
        if acked {
            info!(
                session_id = %self.session.id(),
                request_id = %job.request_id,
                message_id = %message_id,
                "send acknowledged"
            );
            self.stats
                .record_sent(&canonical_number(&job.jid), &job.payload.summary());
        }
        self.changed.notify_waiters();
    }

    fn finish_failed(&self, id: &RequestId, err: &BridgeError) {
        let mut failed = None;
        if let Some(mut record) = self.records.get_mut(id) {
            if !record.state.is_terminal() {
                mark_failed(&mut record, err);
                failed = Some(record.clone());
            }
        }
        if let Some(record) = failed {
            warn!(
                session_id = %record.session_id,
                request_id = %id,
                attempts = record.attempts,
                error = %err,
                "send failed"
            );
            self.stats.record_failed(
                &canonical_number(&record.target),
                record.kind,
                &err.to_string(),
            );
        }
        self.changed.notify_waiters();
    }

    /// Fails every non-terminal request and aborts the one in flight.
    fn cancel_all(&self, reason: CancelReason) {
        let previous = self.generation.swap(Arc::new(Generation::new()));
        let _ = previous.reason.set(reason);
        previous.token.cancel();

        let err = reason.error();
        let mut cancelled = 0usize;
        for mut record in self.records.iter_mut() {
            if !record.state.is_terminal() {
                mark_failed(&mut record, &err);
                self.stats.record_failed(
                    &canonical_number(&record.target),
                    record.kind,
                    &err.to_string(),
                );
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!(session_id = %self.session.id(), cancelled, reason = ?reason, "cancelled pending sends");
        }
        self.changed.notify_waiters();
    }

    async fn run(self: Arc<Self>, mut jobs: mpsc::UnboundedReceiver<Job>, shutdown: CancellationToken) {
        loop {
            let job = tokio::select! {
                () = shutdown.cancelled() => break,
                job = jobs.recv() => job,
            };
            let Some(job) = job else { break };
            // An abandoned attempt stays in flight until cancel_all below.
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = self.process(job) => {}
            }
        }
        self.cancel_all(CancelReason::Shutdown);
        debug!(session_id = %self.session.id(), "dispatcher stopped");
    }

    async fn process(&self, job: Job) {
        let token = job.generation.token.clone();
        if token.is_cancelled() {
            return;
        }

        for attempt in 0..job.max_attempts {
            let started = self.update(&job.request_id, |r| {
                r.state = SendState::InFlight;
                r.attempts = attempt + 1;
            });
            if !started {
                return;
            }

            let send = tokio::time::timeout(job.timeout, self.session.send(&job.jid, &job.payload));
            let outcome = tokio::select! {
                () = token.cancelled() => Err(job.generation.error()),
                result = send => result.unwrap_or_else(|_| Err(BridgeError::Timeout { duration: job.timeout })),
            };

            let err = match outcome {
                Ok(message_id) => {
                    self.finish_acked(&job, message_id);
                    return;
                }
                Err(err) => err,
            };

            let attempts_left = attempt + 1 < job.max_attempts;
            if !err.is_transient() || !attempts_left || token.is_cancelled() {
                self.finish_failed(&job.request_id, &err);
                return;
            }

            let delay = self.settings.backoff.delay(attempt);
            warn!(
                session_id = %self.session.id(),
                request_id = %job.request_id,
                attempt = attempt + 1,
                max_attempts = job.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "send attempt failed, retrying"
            );
            self.update(&job.request_id, |r| {
                r.error = Some(err.to_string());
                r.error_code = Some(err.code());
            });
            if !sleep_or_cancel(delay, &token).await {
                self.finish_failed(&job.request_id, &job.generation.error());
                return;
            }
        }
    }
}

fn mark_failed(record: &mut SendRecord, err: &BridgeError) {
    record.state = SendState::Failed;
    record.error = Some(err.to_string());
    record.error_code = Some(err.code());
    record.updated_at = Utc::now();
    record.finished_at = Some(Instant::now());
}

#[async_trait]
impl SessionObserver for OutboundDispatcher {
    async fn session_reset(&self, _session: &SessionId) {
        self.cancel_all(CancelReason::Reset);
    }

    async fn session_logged_out(&self, _session: &SessionId) {
        self.cancel_all(CancelReason::LoggedOut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(finished_at: Option<Instant>) -> SendRecord {
        SendRecord {
            request_id: RequestId("r1".into()),
            session_id: SessionId::from("default"),
            target: "491234@s.whatsapp.net".into(),
            kind: "text",
            state: SendState::Pending,
            attempts: 0,
            max_attempts: 3,
            message_id: None,
            error: None,
            error_code: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            finished_at,
        }
    }

    #[test]
    fn only_finished_records_expire() {
        let now = Instant::now();
        let retention = Duration::from_secs(300);
        assert!(!record(None).expired(now + Duration::from_secs(3_600), retention));

        let finished = record(Some(now));
        assert!(!finished.expired(now + Duration::from_secs(299), retention));
        assert!(finished.expired(now + Duration::from_secs(300), retention));
    }

    #[test]
    fn mark_failed_sets_code() {
        let mut r = record(None);
        mark_failed(&mut r, &BridgeError::SessionReset);
        assert_eq!(r.state, SendState::Failed);
        assert_eq!(r.error_code, Some("session_reset"));
        assert!(r.finished_at.is_some());
    }

    #[test]
    fn record_serializes_without_internal_fields() {
        let json = serde_json::to_value(record(Some(Instant::now()))).unwrap();
        assert_eq!(json["state"], "pending");
        assert_eq!(json["kind"], "text");
        assert!(json.get("finished_at").is_none());
    }

    #[test]
    fn settings_follow_config() {
        let settings = DispatchSettings::default();
        assert_eq!(settings.retry_attempts, 2);
        assert_eq!(settings.send_timeout, Duration::from_secs(60));
        assert_eq!(settings.backoff.delay(0), Duration::from_millis(500));
        assert_eq!(settings.retention, Duration::from_secs(300));
    }
}
