// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport for deterministic testing.
//!
//! `MockTransport` implements `Transport` with scripted connect and send
//! outcomes. Tests drive the connection from outside: complete pairing,
//! inject inbound messages, drop the socket or revoke the device.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use wabridge_core::jid::ensure_jid;
use wabridge_core::{
    BridgeError, ContentKind, Credentials, EventBody, HealthStatus, MessageId, PluginAdapter,
    RawInbound, RawMedia, RawPayload, SendPayload, Transport, TransportEvent, TransportEvents,
};

/// Outcome of one scripted `send()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendScript {
    Ack,
    /// Fails with a retryable transport error.
    Transient,
    /// Fails with a non-retryable transport error.
    Terminal,
    /// Never completes; the dispatcher's timeout has to fire.
    Hang,
}

/// A message the transport acknowledged.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub jid: String,
    pub payload: SendPayload,
    pub message_id: MessageId,
}

/// A scriptable transport for one session.
pub struct MockTransport {
    phone: String,
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    connect_failures: Mutex<VecDeque<BridgeError>>,
    send_script: Mutex<VecDeque<SendScript>>,
    sent: Mutex<Vec<SentMessage>>,
    read_receipts: Mutex<Vec<MessageId>>,
    media: Mutex<Result<Vec<u8>, String>>,
    media_delay: Mutex<Duration>,
    hanging_connects: AtomicUsize,
    connects: AtomicUsize,
    send_attempts: AtomicUsize,
    logouts: AtomicUsize,
    next_id: AtomicU64,
    activity: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    /// Create a transport whose device reports `phone` once paired.
    pub fn new(phone: &str) -> Self {
        Self {
            phone: phone.to_string(),
            events: Mutex::new(None),
            connect_failures: Mutex::new(VecDeque::new()),
            send_script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            read_receipts: Mutex::new(Vec::new()),
            media: Mutex::new(Ok(b"mock-media-bytes".to_vec())),
            media_delay: Mutex::new(Duration::ZERO),
            hanging_connects: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            send_attempts: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            activity: Notify::new(),
        }
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    // --- scripting ---

    /// Queue outcomes for the next `send()` calls. Unscripted sends succeed.
    pub fn script_sends(&self, outcomes: impl IntoIterator<Item = SendScript>) {
        lock(&self.send_script).extend(outcomes);
    }

    /// Make the next `count` connect attempts fail with a transient error.
    pub fn fail_connects(&self, count: usize) {
        let mut failures = lock(&self.connect_failures);
        for _ in 0..count {
            failures.push_back(BridgeError::ProtocolUnavailable("mock sidecar is down".into()));
        }
    }

    /// Make the next `count` connect attempts never complete, like a sidecar
    /// that accepts TCP but stalls the upgrade.
    pub fn hang_connects(&self, count: usize) {
        self.hanging_connects.store(count, Ordering::SeqCst);
    }

    pub fn set_media(&self, bytes: Vec<u8>) {
        *lock(&self.media) = Ok(bytes);
    }

    pub fn fail_media(&self, reason: &str) {
        *lock(&self.media) = Err(reason.to_string());
    }

    pub fn set_media_delay(&self, delay: Duration) {
        *lock(&self.media_delay) = delay;
    }

    // --- driving the live connection ---

    /// Push an event into the current connection. Returns `false` when no
    /// connection is open.
    pub fn emit(&self, event: TransportEvent) -> bool {
        lock(&self.events)
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Simulate the user scanning the QR code.
    pub fn complete_pairing(&self) -> bool {
        self.emit(TransportEvent::Paired {
            credentials: Credentials::new(b"mock-credentials".to_vec()),
            phone: Some(self.phone.clone()),
        })
    }

    pub fn inject(&self, raw: RawInbound) -> bool {
        self.emit(TransportEvent::Message(Box::new(raw)))
    }

    /// Drop the socket; the stream reports `Disconnected` and closes.
    pub fn drop_connection(&self, reason: &str) -> bool {
        let Some(tx) = lock(&self.events).take() else {
            return false;
        };
        tx.send(TransportEvent::Disconnected {
            reason: reason.to_string(),
        })
        .is_ok()
    }

    /// Simulate upstream revoking the linked device.
    pub fn remote_logout(&self) -> bool {
        self.emit(TransportEvent::LoggedOut)
    }

    // --- assertions ---

    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    pub fn read_receipts(&self) -> Vec<MessageId> {
        lock(&self.read_receipts).clone()
    }

    /// Waits until `check` holds, re-evaluating after every transport call.
    pub async fn wait_until(&self, timeout: Duration, check: impl Fn(&Self) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.activity.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if check(self) {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return check(self);
            }
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new("491700000000")
    }
}

#[async_trait]
impl PluginAdapter for MockTransport {
    fn name(&self) -> &str {
        "mock-transport"
    }

    async fn health_check(&self) -> Result<HealthStatus, BridgeError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<TransportEvents, BridgeError> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        self.activity.notify_waiters();
        let hang = self
            .hanging_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hang {
            std::future::pending::<()>().await;
        }
        if let Some(err) = lock(&self.connect_failures).pop_front() {
            return Err(err);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let first = if credentials.is_some() {
            TransportEvent::Connected {
                phone: Some(self.phone.clone()),
            }
        } else {
            TransportEvent::Qr(format!("mock-qr-{attempt}"))
        };
        let _ = tx.send(first);
        *lock(&self.events) = Some(tx);
        Ok(rx)
    }

    async fn send(&self, jid: &str, payload: &SendPayload) -> Result<MessageId, BridgeError> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        self.activity.notify_waiters();
        let script = lock(&self.send_script)
            .pop_front()
            .unwrap_or(SendScript::Ack);

        match script {
            SendScript::Ack => {
                let id = MessageId(format!(
                    "MOCK{}",
                    self.next_id.fetch_add(1, Ordering::SeqCst)
                ));
                lock(&self.sent).push(SentMessage {
                    jid: jid.to_string(),
                    payload: payload.clone(),
                    message_id: id.clone(),
                });
                self.activity.notify_waiters();
                Ok(id)
            }
            SendScript::Transient => Err(BridgeError::transient("mock transient failure")),
            SendScript::Terminal => Err(BridgeError::terminal("mock rejected the message")),
            SendScript::Hang => std::future::pending().await,
        }
    }

    async fn download_media(&self, _media: &RawMedia) -> Result<Vec<u8>, BridgeError> {
        let delay = *lock(&self.media_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = lock(&self.media).clone();
        result.map_err(BridgeError::Media)
    }

    async fn mark_read(
        &self,
        _chat_jid: &str,
        _sender_jid: &str,
        message_id: &MessageId,
    ) -> Result<(), BridgeError> {
        lock(&self.read_receipts).push(message_id.clone());
        self.activity.notify_waiters();
        Ok(())
    }

    async fn logout(&self) -> Result<(), BridgeError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        lock(&self.events).take();
        self.activity.notify_waiters();
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BridgeError> {
        lock(&self.events).take();
        Ok(())
    }
}

/// A plain text message from `sender` in a direct chat.
pub fn raw_text(id: &str, sender: &str, text: &str) -> RawInbound {
    let jid = ensure_jid(sender);
    RawInbound {
        message_id: MessageId(id.to_string()),
        sender_jid: jid.clone(),
        chat_jid: jid.clone(),
        sender_name: None,
        from_me: false,
        timestamp: None,
        kind: ContentKind::Text,
        body: EventBody::Text {
            text: text.to_string(),
        },
        media: None,
        raw: RawPayload::new(serde_json::json!({
            "key": {"id": id, "remoteJid": jid},
            "message": {"conversation": text},
        })),
    }
}

/// A media message of `mime_type` from `sender` in a direct chat.
pub fn raw_media(id: &str, sender: &str, mime_type: &str) -> RawInbound {
    let jid = ensure_jid(sender);
    let kind = match mime_type.split('/').next() {
        Some("image") => ContentKind::Image,
        Some("video") => ContentKind::Video,
        Some("audio") => ContentKind::Audio,
        _ => ContentKind::Document,
    };
    let handle = serde_json::json!({"key": {"id": id, "remoteJid": jid}});
    RawInbound {
        message_id: MessageId(id.to_string()),
        sender_jid: jid.clone(),
        chat_jid: jid,
        sender_name: None,
        from_me: false,
        timestamp: None,
        kind,
        body: EventBody::Media {
            caption: None,
            mime_type: mime_type.to_string(),
            file_name: None,
        },
        media: Some(RawMedia {
            handle: handle.clone(),
            mime_type: mime_type.to_string(),
            file_name: None,
        }),
        raw: RawPayload::new(handle),
    }
}
