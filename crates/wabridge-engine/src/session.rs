// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Linked-device session state machine.
//!
//! States: Unpaired -> Pairing (QR issued) -> Connected -> Disconnected
//! (reconnecting) and LoggedOut (terminal until reset).
//!
//! The manager owns the only live transport connection of a session and
//! the credential material behind it. Lifecycle calls (`start`, `reset`)
//! are serialized by an async lock; everything else reads a `watch`
//! snapshot and never waits on the transport.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wabridge_core::{
    BridgeError, ConnectionState, CredentialStore, Credentials, MessageId, RawMedia, SendPayload,
    SessionId, SessionObserver, SessionStatus, Transport, TransportEvent, TransportEvents,
};
use wabridge_resilience::{Backoff, sleep_or_cancel};

use crate::pipeline::IngressSender;

/// Minimum spacing between persisted `last_seen` updates.
const TOUCH_INTERVAL: Duration = Duration::from_secs(30);

/// Automatic reconnect budget after a transport drop.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub attempts: u32,
    pub backoff: Backoff,
    /// Bound on a single `Transport::connect` call.
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            backoff: Backoff::from_millis(1_000, 60_000),
            connect_timeout: Duration::from_secs(20),
        }
    }
}

struct ConnectionTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Why the event pump stopped.
enum StreamEnd {
    Cancelled,
    LoggedOut,
    Dropped(String),
}

pub struct SessionManager {
    id: SessionId,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    reconnect: ReconnectPolicy,
    status: watch::Sender<SessionStatus>,
    qr: ArcSwapOption<String>,
    /// Serializes `start` and `reset`.
    lifecycle: tokio::sync::Mutex<()>,
    connection: Mutex<Option<ConnectionTask>>,
    ingress: IngressSender,
    observers: RwLock<Vec<Arc<dyn SessionObserver>>>,
    last_touch: Mutex<Option<tokio::time::Instant>>,
    shutdown: CancellationToken,
}

impl SessionManager {
    pub fn new(
        id: SessionId,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        reconnect: ReconnectPolicy,
        ingress: IngressSender,
        shutdown: CancellationToken,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::new(id.clone()));
        Self {
            id,
            transport,
            store,
            reconnect,
            status,
            qr: ArcSwapOption::empty(),
            lifecycle: tokio::sync::Mutex::new(()),
            connection: Mutex::new(None),
            ingress,
            observers: RwLock::new(Vec::new()),
            last_touch: Mutex::new(None),
            shutdown,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn add_observer(&self, observer: Arc<dyn SessionObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    fn observers(&self) -> Vec<Arc<dyn SessionObserver>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Last known state. Never blocks, even while reconnecting.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// The pending pairing challenge, present only while pairing.
    pub fn current_qr(&self) -> Option<Arc<String>> {
        if self.state() != ConnectionState::Pairing {
            return None;
        }
        self.qr.load_full()
    }

    fn update(&self, f: impl FnOnce(&mut SessionStatus)) {
        self.status.send_modify(f);
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state();
        if previous != state {
            info!(session_id = %self.id, from = %previous, to = %state, "session state changed");
        }
        self.update(|s| s.state = state);
    }

    /// Loads persisted metadata so status is meaningful before `start()`.
    /// Returns whether credentials exist.
    pub async fn restore(&self) -> Result<bool, BridgeError> {
        let Some(stored) = self.store.load(&self.id).await? else {
            return Ok(false);
        };
        self.update(|s| {
            if s.state == ConnectionState::Unpaired {
                s.state = ConnectionState::Disconnected;
            }
            s.paired_number = stored.phone.clone();
            s.last_seen = stored.last_seen;
        });
        Ok(true)
    }

    /// Connects the session, pairing first when no credentials are stored.
    ///
    /// A no-op while pairing, connected, or already reconnecting. Fails with
    /// [`BridgeError::SessionLoggedOut`] until the session is reset, and with
    /// [`BridgeError::ProtocolUnavailable`] when the transport cannot start
    /// pairing.
    pub async fn start(self: &Arc<Self>) -> Result<ConnectionState, BridgeError> {
        let _guard = self.lifecycle.lock().await;

        let state = self.state();
        match state {
            ConnectionState::LoggedOut => return Err(BridgeError::SessionLoggedOut),
            ConnectionState::Pairing | ConnectionState::Connected => return Ok(state),
            ConnectionState::Disconnected if self.connection_alive() => return Ok(state),
            _ => {}
        }

        let stored = self.store.load(&self.id).await?;
        let has_credentials = stored.is_some();
        let credentials = stored.map(|stored| {
            self.update(|s| {
                s.paired_number = stored.phone.clone().or(s.paired_number.take());
                s.last_seen = stored.last_seen.or(s.last_seen);
            });
            stored.credentials
        });

        match self.connect(credentials).await {
            Ok(events) => {
                let next = if has_credentials {
                    ConnectionState::Disconnected
                } else {
                    ConnectionState::Pairing
                };
                self.update(|s| {
                    s.last_error = None;
                    s.reconnect_attempts = 0;
                    s.persistent_failure = false;
                });
                self.set_state(next);
                self.spawn_connection(Some(events));
                Ok(next)
            }
            Err(e) if has_credentials => {
                warn!(session_id = %self.id, error = %e, "initial connect failed, reconnecting in background");
                self.update(|s| {
                    s.last_error = Some(e.to_string());
                    s.reconnect_attempts = 0;
                    s.persistent_failure = false;
                });
                self.set_state(ConnectionState::Disconnected);
                self.spawn_connection(None);
                Ok(ConnectionState::Disconnected)
            }
            Err(e) => {
                error!(session_id = %self.id, error = %e, "transport could not start pairing");
                self.update(|s| s.last_error = Some(e.to_string()));
                Err(match e {
                    BridgeError::ProtocolUnavailable(msg) => BridgeError::ProtocolUnavailable(msg),
                    other => BridgeError::ProtocolUnavailable(other.to_string()),
                })
            }
        }
    }

    /// Unlinks the device and returns the session to `Unpaired`.
    ///
    /// Order: stop the connection, log out upstream (best effort), wipe
    /// credentials, notify observers, publish the new state.
    pub async fn reset(&self) -> Result<(), BridgeError> {
        let _guard = self.lifecycle.lock().await;
        info!(session_id = %self.id, "resetting session");

        let was = self.state();
        self.stop_connection().await;

        if was != ConnectionState::Unpaired {
            if let Err(e) = self.transport.logout().await {
                warn!(session_id = %self.id, error = %e, "upstream logout failed, continuing reset");
            }
        }

        if let Err(e) = self.store.clear(&self.id).await {
            error!(session_id = %self.id, error = %e, "failed to wipe credentials");
            self.update(|s| s.last_error = Some(e.to_string()));
            self.set_state(ConnectionState::Disconnected);
            return Err(e);
        }

        for observer in self.observers() {
            observer.session_reset(&self.id).await;
        }

        self.qr.store(None);
        self.status.send_replace(SessionStatus::new(self.id.clone()));
        info!(session_id = %self.id, "session reset to unpaired");
        Ok(())
    }

    /// Closes the live connection without unlinking. Used on process exit.
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;
        self.stop_connection().await;
        if let Err(e) = self.transport.disconnect().await {
            debug!(session_id = %self.id, error = %e, "transport disconnect failed");
        }
    }

    /// Sends through the live connection.
    pub async fn send(&self, jid: &str, payload: &SendPayload) -> Result<MessageId, BridgeError> {
        match self.state() {
            ConnectionState::Connected => {}
            ConnectionState::LoggedOut => return Err(BridgeError::SessionLoggedOut),
            _ => return Err(BridgeError::SessionNotConnected),
        }
        self.transport.send(jid, payload).await
    }

    pub async fn download_media(&self, media: &RawMedia) -> Result<Vec<u8>, BridgeError> {
        self.transport.download_media(media).await
    }

    pub async fn mark_read(
        &self,
        chat_jid: &str,
        sender_jid: &str,
        message_id: &MessageId,
    ) -> Result<(), BridgeError> {
        if self.state() != ConnectionState::Connected {
            return Err(BridgeError::SessionNotConnected);
        }
        self.transport.mark_read(chat_jid, sender_jid, message_id).await
    }

    // --- connection task ---

    fn connection_alive(&self) -> bool {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    fn spawn_connection(self: &Arc<Self>, events: Option<TransportEvents>) {
        let cancel = self.shutdown.child_token();
        let manager = Arc::clone(self);
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move { manager.run_connection(events, task_cancel).await });
        let previous = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(ConnectionTask { cancel, handle });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
    }

    async fn stop_connection(&self) {
        let task = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                warn!(session_id = %self.id, error = %e, "connection task ended abnormally");
            }
        }
    }

    async fn run_connection(self: Arc<Self>, events: Option<TransportEvents>, cancel: CancellationToken) {
        let mut events = match events {
            Some(events) => events,
            None => match self.reconnect_loop(&cancel).await {
                Some(events) => events,
                None => return,
            },
        };

        loop {
            match self.pump(&mut events, &cancel).await {
                StreamEnd::Cancelled | StreamEnd::LoggedOut => return,
                StreamEnd::Dropped(reason) => {
                    warn!(session_id = %self.id, reason = %reason, "transport dropped");
                    self.update(|s| s.last_error = Some(reason));
                    self.set_state(ConnectionState::Disconnected);
                    events = match self.reconnect_loop(&cancel).await {
                        Some(events) => events,
                        None => return,
                    };
                }
            }
        }
    }

    async fn pump(&self, events: &mut TransportEvents, cancel: &CancellationToken) -> StreamEnd {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => return StreamEnd::Cancelled,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                return StreamEnd::Dropped("transport event stream closed".into());
            };
            self.touch().await;

            match event {
                TransportEvent::Qr(code) => {
                    debug!(session_id = %self.id, "pairing challenge issued");
                    self.qr.store(Some(Arc::new(code)));
                    self.set_state(ConnectionState::Pairing);
                }
                TransportEvent::Paired { credentials, phone } => {
                    if let Err(e) = self
                        .store
                        .save(&self.id, &credentials, phone.as_deref())
                        .await
                    {
                        error!(session_id = %self.id, error = %e, "failed to persist credentials");
                        self.update(|s| s.last_error = Some(e.to_string()));
                    }
                    info!(session_id = %self.id, phone = ?phone, "device paired");
                    self.mark_connected(phone);
                }
                TransportEvent::CredentialsUpdated { credentials } => {
                    if let Err(e) = self.store.save(&self.id, &credentials, None).await {
                        warn!(session_id = %self.id, error = %e, "failed to persist rotated credentials");
                    }
                }
                TransportEvent::Connected { phone } => self.mark_connected(phone),
                TransportEvent::Disconnected { reason } => return StreamEnd::Dropped(reason),
                TransportEvent::LoggedOut => {
                    self.handle_remote_logout().await;
                    return StreamEnd::LoggedOut;
                }
                TransportEvent::Message(raw) => {
                    if !self.ingress.send(*raw) {
                        warn!(session_id = %self.id, "event pipeline is gone, dropping inbound event");
                    }
                }
            }
        }
    }

    fn mark_connected(&self, phone: Option<String>) {
        self.qr.store(None);
        self.update(|s| {
            if phone.is_some() {
                s.paired_number = phone;
            }
            s.last_error = None;
            s.reconnect_attempts = 0;
            s.persistent_failure = false;
        });
        self.set_state(ConnectionState::Connected);
    }

    async fn handle_remote_logout(&self) {
        warn!(session_id = %self.id, "linked device revoked upstream; reset required");
        self.qr.store(None);
        self.update(|s| s.last_error = Some("logged out by upstream".into()));
        self.set_state(ConnectionState::LoggedOut);
        for observer in self.observers() {
            observer.session_logged_out(&self.id).await;
        }
    }

    /// `Transport::connect`, failing with `ProtocolUnavailable` once the
    /// connect timeout passes.
    async fn connect(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<TransportEvents, BridgeError> {
        let limit = self.reconnect.connect_timeout;
        tokio::time::timeout(limit, self.transport.connect(credentials))
            .await
            .unwrap_or_else(|_| {
                Err(BridgeError::ProtocolUnavailable(format!(
                    "transport did not connect within {}s",
                    limit.as_secs_f32()
                )))
            })
    }

    /// Re-establishes the connection with stored credentials. Returns `None`
    /// when cancelled or once the attempt budget is spent.
    async fn reconnect_loop(&self, cancel: &CancellationToken) -> Option<TransportEvents> {
        for attempt in 0..self.reconnect.attempts {
            let delay = self.reconnect.backoff.delay(attempt);
            self.update(|s| s.reconnect_attempts = attempt + 1);
            info!(
                session_id = %self.id,
                attempt = attempt + 1,
                max_attempts = self.reconnect.attempts,
                delay_ms = delay.as_millis() as u64,
                "reconnecting"
            );
            if !sleep_or_cancel(delay, cancel).await {
                return None;
            }

            let credentials = match self.store.load(&self.id).await {
                Ok(stored) => stored.map(|s| s.credentials),
                Err(e) => {
                    warn!(session_id = %self.id, error = %e, "failed to load credentials");
                    self.update(|s| s.last_error = Some(e.to_string()));
                    continue;
                }
            };

            let connected = tokio::select! {
                () = cancel.cancelled() => return None,
                result = self.connect(credentials) => result,
            };
            match connected {
                Ok(events) => return Some(events),
                Err(e) => {
                    warn!(session_id = %self.id, attempt = attempt + 1, error = %e, "reconnect attempt failed");
                    self.update(|s| s.last_error = Some(e.to_string()));
                }
            }
        }

        error!(
            session_id = %self.id,
            attempts = self.reconnect.attempts,
            "reconnect attempts exhausted"
        );
        self.update(|s| {
            s.persistent_failure = true;
            s.last_error = Some(format!(
                "reconnect failed after {} attempts",
                self.reconnect.attempts
            ));
        });
        None
    }

    /// Refreshes `last_seen`, persisting it at most every [`TOUCH_INTERVAL`].
    async fn touch(&self) {
        let now = Utc::now();
        self.update(|s| s.last_seen = Some(now));

        let due = {
            let mut last = self
                .last_touch
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let instant = tokio::time::Instant::now();
            let due = last.is_none_or(|t| instant.duration_since(t) >= TOUCH_INTERVAL);
            if due {
                *last = Some(instant);
            }
            due
        };
        if due {
            if let Err(e) = self.store.touch(&self.id, now).await {
                debug!(session_id = %self.id, error = %e, "failed to persist last_seen");
            }
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
