// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-sink ordered webhook delivery.
//!
//! Every sink owns a bounded queue drained by one worker, so delivery to a
//! sink is ordered and a slow sink never holds up another. `deliver` only
//! enqueues; a full queue drops the event for that sink.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wabridge_config::WebhookConfig;
use wabridge_core::{BridgeError, EventSink, InboundEvent, SessionId};
use wabridge_resilience::sleep_or_cancel;

use crate::payload::WebhookPayload;
use crate::sink::{Attempt, DeliveryPolicy, SinkSpec, SinkView, post};

/// Queued-or-in-flight deliveries per session.
#[derive(Default)]
struct PendingTracker {
    counts: Mutex<HashMap<SessionId, usize>>,
    changed: Notify,
}

impl PendingTracker {
    fn add(&self, session: &SessionId) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        *counts.entry(session.clone()).or_default() += 1;
    }

    fn done(&self, session: &SessionId) {
        {
            let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(count) = counts.get_mut(session) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    counts.remove(session);
                }
            }
        }
        self.changed.notify_waiters();
    }

    fn count(&self, session: Option<&SessionId>) -> usize {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        match session {
            Some(session) => counts.get(session).copied().unwrap_or(0),
            None => counts.values().sum(),
        }
    }

    async fn wait_idle(&self, session: Option<&SessionId>, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count(session) == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.count(session) == 0;
            }
        }
    }
}

struct SinkHandle {
    spec: Arc<ArcSwap<SinkSpec>>,
    tx: mpsc::Sender<Arc<InboundEvent>>,
    cancel: CancellationToken,
}

pub struct WebhookForwarder {
    client: reqwest::Client,
    policy: DeliveryPolicy,
    sinks: RwLock<BTreeMap<String, SinkHandle>>,
    pending: Arc<PendingTracker>,
}

impl WebhookForwarder {
    pub fn new(policy: DeliveryPolicy) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BridgeError::Webhook(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            policy,
            sinks: RwLock::new(BTreeMap::new()),
            pending: Arc::new(PendingTracker::default()),
        })
    }

    pub fn from_config(config: &WebhookConfig) -> Result<Self, BridgeError> {
        Self::new(DeliveryPolicy::from_config(config))
    }

    /// Adds a sink or replaces an existing sink's settings. A replaced sink
    /// keeps its queue, so ordering survives reconfiguration.
    pub fn upsert(&self, spec: SinkSpec) {
        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = sinks.get(&spec.id) {
            info!(sink = %spec.id, enabled = spec.enabled, "webhook sink updated");
            handle.spec.store(Arc::new(spec));
            return;
        }

        let (tx, rx) = mpsc::channel(self.policy.queue_capacity);
        let cancel = CancellationToken::new();
        let shared = Arc::new(ArcSwap::from_pointee(spec.clone()));
        let worker = SinkWorker {
            id: spec.id.clone(),
            spec: Arc::clone(&shared),
            rx,
            client: self.client.clone(),
            policy: self.policy,
            pending: Arc::clone(&self.pending),
            cancel: cancel.clone(),
        };
        tokio::spawn(worker.run());
        info!(sink = %spec.id, enabled = spec.enabled, "webhook sink added");
        sinks.insert(
            spec.id.clone(),
            SinkHandle {
                spec: shared,
                tx,
                cancel,
            },
        );
    }

    /// Removes a sink. Its queued and in-flight deliveries are dropped.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self
            .sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        match removed {
            Some(handle) => {
                handle.cancel.cancel();
                info!(sink = %id, "webhook sink removed");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<SinkSpec> {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|handle| (*handle.spec.load_full()).clone())
    }

    /// All sinks ordered by id.
    pub fn list(&self) -> Vec<SinkView> {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|handle| handle.spec.load().view())
            .collect()
    }

    /// Deliveries queued or in flight, optionally for one session.
    pub fn pending(&self, session: Option<&SessionId>) -> usize {
        self.pending.count(session)
    }

    /// Waits (bounded) for every queue to drain, then stops all workers.
    pub async fn shutdown(&self, timeout: Duration) {
        if !self.pending.wait_idle(None, timeout).await {
            warn!(
                remaining = self.pending.count(None),
                "webhook deliveries still pending at shutdown"
            );
        }
        let sinks = std::mem::take(&mut *self.sinks.write().unwrap_or_else(PoisonError::into_inner));
        for handle in sinks.into_values() {
            handle.cancel.cancel();
        }
    }
}

#[async_trait]
impl EventSink for WebhookForwarder {
    fn deliver(&self, event: Arc<InboundEvent>) {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        for (id, handle) in sinks.iter() {
            if !handle.spec.load().accepts(&event.session_id) {
                continue;
            }
            self.pending.add(&event.session_id);
            match handle.tx.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.pending.done(&event.session_id);
                    warn!(sink = %id, seq = event.seq, "webhook queue full, dropping event for this sink");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.pending.done(&event.session_id);
                    debug!(sink = %id, "webhook sink worker gone");
                }
            }
        }
    }

    async fn flush(&self, session: &SessionId, timeout: Duration) -> bool {
        self.pending.wait_idle(Some(session), timeout).await
    }
}

struct SinkWorker {
    id: String,
    spec: Arc<ArcSwap<SinkSpec>>,
    rx: mpsc::Receiver<Arc<InboundEvent>>,
    client: reqwest::Client,
    policy: DeliveryPolicy,
    pending: Arc<PendingTracker>,
    cancel: CancellationToken,
}

impl SinkWorker {
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                () = self.cancel.cancelled() => break,
                event = self.rx.recv() => event,
            };
            let Some(event) = event else { break };
            self.deliver(&event).await;
            self.pending.done(&event.session_id);
        }

        self.rx.close();
        while let Ok(event) = self.rx.try_recv() {
            self.pending.done(&event.session_id);
        }
        debug!(sink = %self.id, "webhook sink worker stopped");
    }

    /// Delivers one event with bounded retry. Returns whether it arrived.
    async fn deliver(&self, event: &InboundEvent) -> bool {
        let body = match serde_json::to_vec(&WebhookPayload::from(event)) {
            Ok(body) => body,
            Err(e) => {
                error!(sink = %self.id, seq = event.seq, error = %e, "failed to serialize webhook payload");
                return false;
            }
        };

        for attempt in 0..self.policy.max_attempts {
            // Reloaded per attempt so a sink disabled mid-flight stops here.
            let spec = self.spec.load_full();
            if !spec.enabled {
                debug!(sink = %self.id, seq = event.seq, "sink disabled, dropping event");
                return false;
            }

            let outcome = tokio::select! {
                () = self.cancel.cancelled() => return false,
                outcome = post(&self.client, &spec, &body, self.policy.timeout) => outcome,
            };

            match outcome {
                Attempt::Delivered => {
                    debug!(sink = %self.id, seq = event.seq, attempt = attempt + 1, "webhook delivered");
                    return true;
                }
                Attempt::Permanent(reason) => {
                    warn!(sink = %self.id, seq = event.seq, reason = %reason, "webhook rejected, dropping event");
                    return false;
                }
                Attempt::Transient(reason) => {
                    if attempt + 1 >= self.policy.max_attempts {
                        warn!(
                            sink = %self.id,
                            seq = event.seq,
                            attempts = attempt + 1,
                            reason = %reason,
                            "webhook delivery failed, giving up"
                        );
                        return false;
                    }
                    let delay = self.policy.backoff.delay(attempt);
                    warn!(
                        sink = %self.id,
                        seq = event.seq,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "webhook delivery failed, retrying"
                    );
                    if !sleep_or_cancel(delay, &self.cancel).await {
                        return false;
                    }
                }
            }
        }
        false
    }
}
