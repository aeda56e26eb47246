// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound event pipeline.
//!
//! Raw transport messages enter through an unbounded ingress channel so the
//! transport's delivery path never blocks. A single worker per session
//! deduplicates, filters, and appends them to the [`EventBuffer`], then
//! fans out to the registered sinks and live subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wabridge_config::BridgeConfig;
use wabridge_core::jid::{canonical_number, is_group};
use wabridge_core::{
    BridgeError, EventSink, InboundEvent, MediaState, RawInbound, RawMedia, SessionId,
    SessionObserver,
};

use crate::buffer::{BufferPage, DedupWindow, EventBuffer};
use crate::media::MediaStore;
use crate::policy::PolicyHandle;
use crate::session::SessionManager;
use crate::stats::AccountStats;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);
const NOTICE_CAPACITY: usize = 256;

struct Ingress {
    epoch: u64,
    raw: RawInbound,
}

/// Producer half handed to the session manager.
#[derive(Clone)]
pub struct IngressSender {
    tx: mpsc::UnboundedSender<Ingress>,
    epoch: Arc<AtomicU64>,
}

impl IngressSender {
    /// Enqueues a raw message stamped with the current reset epoch. Returns
    /// `false` once the pipeline worker is gone.
    pub fn send(&self, raw: RawInbound) -> bool {
        let epoch = self.epoch.load(Ordering::Acquire);
        self.tx.send(Ingress { epoch, raw }).is_ok()
    }
}

pub struct IngressReceiver {
    rx: mpsc::UnboundedReceiver<Ingress>,
    epoch: Arc<AtomicU64>,
}

pub fn ingress_channel() -> (IngressSender, IngressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let epoch = Arc::new(AtomicU64::new(0));
    (
        IngressSender {
            tx,
            epoch: Arc::clone(&epoch),
        },
        IngressReceiver { rx, epoch },
    )
}

/// What happened to one raw message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Appended(u64),
    Duplicate,
    DroppedSelf,
    DroppedWhitelist,
    /// Enqueued before the last reset.
    Stale,
}

/// Change notification for live subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "event", rename_all = "snake_case")]
pub enum PipelineNotice {
    Appended(Arc<InboundEvent>),
    /// The event's media reference resolved (or failed) in place.
    MediaResolved(Arc<InboundEvent>),
}

impl PipelineNotice {
    pub fn event(&self) -> &Arc<InboundEvent> {
        match self {
            Self::Appended(event) | Self::MediaResolved(event) => event,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub buffer_capacity: usize,
    pub buffer_max_age: Duration,
    pub dedup_window: usize,
    pub debug_payloads: bool,
    pub media_timeout: Duration,
    pub flush_timeout: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        let pipeline = &config.pipeline;
        Self {
            buffer_capacity: pipeline.buffer_capacity,
            buffer_max_age: Duration::from_secs(pipeline.buffer_max_age_secs),
            // A window smaller than the buffer would readmit retained ids.
            dedup_window: pipeline.dedup_window.max(pipeline.buffer_capacity),
            debug_payloads: config.bridge.debug_payloads,
            media_timeout: Duration::from_secs(config.media.download_timeout_secs),
            flush_timeout: Duration::from_secs(config.webhook.flush_timeout_secs),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

struct PipelineState {
    buffer: EventBuffer,
    dedup: DedupWindow,
}

pub struct EventPipeline {
    session_id: SessionId,
    label: String,
    session: Arc<SessionManager>,
    policy: Arc<PolicyHandle>,
    stats: Arc<AccountStats>,
    media: Option<Arc<MediaStore>>,
    sinks: Vec<Arc<dyn EventSink>>,
    state: RwLock<PipelineState>,
    notices: broadcast::Sender<PipelineNotice>,
    epoch: Arc<AtomicU64>,
    settings: PipelineSettings,
}

impl EventPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        label: String,
        session: Arc<SessionManager>,
        policy: Arc<PolicyHandle>,
        stats: Arc<AccountStats>,
        media: Option<Arc<MediaStore>>,
        sinks: Vec<Arc<dyn EventSink>>,
        ingress: &IngressReceiver,
        settings: PipelineSettings,
    ) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            session_id: session.id().clone(),
            label,
            session,
            policy,
            stats,
            media,
            sinks,
            state: RwLock::new(PipelineState {
                buffer: EventBuffer::new(settings.buffer_capacity, settings.buffer_max_age),
                dedup: DedupWindow::new(settings.dedup_window),
            }),
            notices,
            epoch: Arc::clone(&ingress.epoch),
            settings,
        }
    }

    /// Starts the ingestion worker. It also prunes aged-out events.
    pub fn spawn(self: &Arc<Self>, mut ingress: IngressReceiver, cancel: CancellationToken) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let mut prune = tokio::time::interval(PRUNE_INTERVAL);
            prune.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = prune.tick() => pipeline.prune(),
                    item = ingress.rx.recv() => {
                        let Some(item) = item else { break };
                        pipeline.ingest_stamped(Some(item.epoch), item.raw);
                    }
                }
            }
            debug!(session_id = %pipeline.session_id, "event pipeline stopped");
        })
    }

    /// Runs one raw message through dedup, filtering and buffering.
    pub fn ingest(self: &Arc<Self>, raw: RawInbound) -> IngestOutcome {
        self.ingest_stamped(None, raw)
    }

    fn ingest_stamped(self: &Arc<Self>, epoch: Option<u64>, raw: RawInbound) -> IngestOutcome {
        if self.settings.debug_payloads {
            debug!(session_id = %self.session_id, payload = %raw.raw.0, "raw inbound payload");
        }
        let policy = self.policy.load();
        let account_number = self.session.status().paired_number;

        let (event, raw_media) = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

            if epoch.is_some_and(|e| e != self.epoch.load(Ordering::Acquire)) {
                debug!(session_id = %self.session_id, message_id = %raw.message_id, "discarding event from before reset");
                return IngestOutcome::Stale;
            }
            if state.dedup.contains(&raw.message_id) {
                debug!(session_id = %self.session_id, message_id = %raw.message_id, "duplicate event discarded");
                return IngestOutcome::Duplicate;
            }

            let chat_jid = if raw.chat_jid.is_empty() {
                raw.sender_jid.clone()
            } else {
                raw.chat_jid.clone()
            };

            if raw.from_me && policy.ignore_self_messages {
                info!(session_id = %self.session_id, message_id = %raw.message_id, "dropping self-sent event");
                return IngestOutcome::DroppedSelf;
            }
            if !policy.whitelist.allows_event(&raw.sender_jid, &chat_jid) {
                info!(
                    session_id = %self.session_id,
                    sender = %raw.sender_jid,
                    chat = %chat_jid,
                    "sender not whitelisted, dropping event"
                );
                return IngestOutcome::DroppedWhitelist;
            }

            state.dedup.insert(raw.message_id.clone());
            let media = match (&raw.media, &self.media) {
                (None, _) => None,
                (Some(_), Some(_)) => Some(MediaState::Pending),
                (Some(_), None) => Some(MediaState::Failed {
                    media_error: "media storage is disabled".into(),
                }),
            };
            let RawInbound {
                message_id,
                sender_jid,
                sender_name,
                from_me,
                timestamp,
                kind,
                body,
                media: raw_media,
                raw: payload,
                ..
            } = raw;
            let label = self.label.clone();
            let session_id = self.session_id.clone();
            let event = state.buffer.push(move |seq| InboundEvent {
                seq,
                session_id,
                account: label,
                account_number,
                message_id,
                sender_number: canonical_number(&sender_jid),
                sender_jid,
                sender_name,
                is_group: is_group(&chat_jid),
                chat_jid,
                from_me,
                timestamp,
                received_at: Utc::now(),
                kind,
                body,
                media,
                raw: payload,
            });
            (event, raw_media)
        };

        debug!(session_id = %self.session_id, seq = event.seq, kind = %event.kind, "event buffered");
        self.stats
            .record_received(&event.sender_number, &event.body.summary());
        for sink in &self.sinks {
            sink.deliver(Arc::clone(&event));
        }
        let _ = self.notices.send(PipelineNotice::Appended(Arc::clone(&event)));

        if policy.mark_as_read && !event.from_me {
            self.spawn_mark_read(&event);
        }
        if let (Some(media), Some(MediaState::Pending)) = (raw_media, &event.media) {
            let pipeline = Arc::clone(self);
            let seq = event.seq;
            tokio::spawn(async move { pipeline.resolve_media(seq, media).await });
        }

        IngestOutcome::Appended(event.seq)
    }

    fn spawn_mark_read(&self, event: &InboundEvent) {
        let session = Arc::clone(&self.session);
        let chat = event.chat_jid.clone();
        let sender = event.sender_jid.clone();
        let message_id = event.message_id.clone();
        tokio::spawn(async move {
            if let Err(e) = session.mark_read(&chat, &sender, &message_id).await {
                debug!(session_id = %session.id(), message_id = %message_id, error = %e, "mark as read failed");
            }
        });
    }

    async fn resolve_media(&self, seq: u64, media: RawMedia) {
        let Some(store) = &self.media else {
            return;
        };
        let timeout = self.settings.media_timeout;
        let result = match tokio::time::timeout(timeout, self.session.download_media(&media)).await {
            Err(_) => Err(BridgeError::Timeout { duration: timeout }),
            Ok(Err(e)) => Err(e),
            Ok(Ok(bytes)) => store.save(&bytes, &media).await,
        };
        let resolved = match result {
            Ok(media_ref) => MediaState::Ready(media_ref),
            Err(e) => {
                warn!(session_id = %self.session_id, seq, error = %e, "media download failed");
                MediaState::Failed {
                    media_error: e.to_string(),
                }
            }
        };

        // Sequence numbers are never reused, so a reset in between simply
        // makes this a miss.
        let updated = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .buffer
            .update(seq, |event| event.media = Some(resolved));
        if let Some(updated) = updated {
            let _ = self.notices.send(PipelineNotice::MediaResolved(updated));
        }
    }

    fn prune(&self) {
        let evicted = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .buffer
            .prune_expired(Utc::now());
        if evicted > 0 {
            debug!(session_id = %self.session_id, evicted, "pruned aged-out events");
        }
    }

    /// Cursor read over the buffer. See [`EventBuffer::read`].
    pub fn read(&self, after: Option<u64>, limit: usize) -> Result<BufferPage, BridgeError> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .buffer
            .read(after, limit)
    }

    pub fn get(&self, seq: u64) -> Option<Arc<InboundEvent>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .buffer
            .get(seq)
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .buffer
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineNotice> {
        self.notices.subscribe()
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

#[async_trait]
impl SessionObserver for EventPipeline {
    async fn session_reset(&self, session: &SessionId) {
        {
            // Bumped under the lock so nothing from the old epoch lands
            // after the clear below.
            let _state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }

        for sink in &self.sinks {
            if !sink.flush(session, self.settings.flush_timeout).await {
                warn!(session_id = %session, "pending webhook deliveries not drained before reset");
            }
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let dropped = state.buffer.len();
        state.buffer.clear();
        state.dedup.clear();
        info!(session_id = %session, dropped, "event buffer cleared");
    }

    async fn session_logged_out(&self, session: &SessionId) {
        // Buffered events stay readable until the explicit reset.
        debug!(session_id = %session, "session logged out");
    }
}
