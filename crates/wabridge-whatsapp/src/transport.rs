// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`Transport`] implementation over the sidecar.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wabridge_config::TransportConfig;
use wabridge_core::{
    BridgeError, Credentials, HealthStatus, MessageId, PluginAdapter, RawMedia, SendPayload,
    Transport, TransportEvent, TransportEvents,
};

use crate::client::SidecarClient;
use crate::frames::parse_frame;

type EventSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport for one session, backed by a sidecar instance.
#[derive(Debug)]
pub struct SidecarTransport {
    client: SidecarClient,
    connect_timeout: Duration,
    /// Cancels the reader of the current event socket.
    reader: Mutex<Option<CancellationToken>>,
}

impl SidecarTransport {
    pub fn new(config: &TransportConfig, instance: &str) -> Result<Self, BridgeError> {
        Ok(Self {
            client: SidecarClient::new(config, instance)?,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            reader: Mutex::new(None),
        })
    }

    fn stop_reader(&self) {
        let previous = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cancel) = previous {
            cancel.cancel();
        }
    }
}

#[async_trait]
impl PluginAdapter for SidecarTransport {
    fn name(&self) -> &str {
        "whatsapp-sidecar"
    }

    async fn health_check(&self) -> Result<HealthStatus, BridgeError> {
        Ok(match self.client.health().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }
}

#[async_trait]
impl Transport for SidecarTransport {
    async fn connect(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<TransportEvents, BridgeError> {
        self.stop_reader();

        let creds = credentials
            .as_ref()
            .map(|c| serde_json::from_slice::<serde_json::Value>(c.as_bytes()))
            .transpose()
            .map_err(|e| {
                BridgeError::terminal(format!("stored credentials are not valid JSON: {e}"))
            })?;

        // Subscribe before asking for the connection so no frame is missed.
        let request = self.client.events_request()?;
        let handshake = tokio::time::timeout(self.connect_timeout, connect_async(request));
        let (socket, _response) = handshake
            .await
            .map_err(|_| {
                BridgeError::ProtocolUnavailable(format!(
                    "sidecar event socket not open after {}s",
                    self.connect_timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                BridgeError::ProtocolUnavailable(format!("failed to open sidecar event socket: {e}"))
            })?;
        self.client.connect(creds.as_ref()).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancel.clone());
        tokio::spawn(read_events(
            socket,
            tx,
            credentials.is_some(),
            cancel,
            self.client.instance().to_string(),
        ));
        info!(instance = %self.client.instance(), paired = creds.is_some(), "sidecar connection requested");
        Ok(rx)
    }

    async fn send(&self, jid: &str, payload: &SendPayload) -> Result<MessageId, BridgeError> {
        self.client.send(jid, payload).await
    }

    async fn download_media(&self, media: &RawMedia) -> Result<Vec<u8>, BridgeError> {
        self.client.download(&media.handle).await
    }

    async fn mark_read(
        &self,
        chat_jid: &str,
        sender_jid: &str,
        message_id: &MessageId,
    ) -> Result<(), BridgeError> {
        self.client.mark_read(chat_jid, sender_jid, message_id).await
    }

    async fn logout(&self) -> Result<(), BridgeError> {
        self.stop_reader();
        self.client.logout().await
    }

    async fn disconnect(&self) -> Result<(), BridgeError> {
        self.stop_reader();
        self.client.disconnect().await
    }
}

/// Pumps socket frames into the session's event channel until the socket
/// closes, the device is logged out, or the reader is cancelled.
async fn read_events(
    socket: EventSocket,
    tx: mpsc::UnboundedSender<TransportEvent>,
    mut paired: bool,
    cancel: CancellationToken,
    instance: String,
) {
    let (mut sink, mut source) = socket.split();
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                debug!(instance = %instance, "sidecar event reader stopped");
                return;
            }
            next = source.next() => next,
        };

        let text = match next {
            None => {
                let _ = tx.send(TransportEvent::Disconnected {
                    reason: "sidecar event socket closed".into(),
                });
                return;
            }
            Some(Err(e)) => {
                let _ = tx.send(TransportEvent::Disconnected {
                    reason: format!("sidecar event socket failed: {e}"),
                });
                return;
            }
            Some(Ok(WsMessage::Text(text))) => text.as_str().to_string(),
            Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(e) => {
                    warn!(instance = %instance, error = %e, "non UTF-8 sidecar frame");
                    continue;
                }
            },
            Some(Ok(WsMessage::Close(frame))) => {
                let reason = frame
                    .map(|f| format!("sidecar closed the event socket: {}", f.reason.as_str()))
                    .unwrap_or_else(|| "sidecar closed the event socket".into());
                let _ = tx.send(TransportEvent::Disconnected { reason });
                return;
            }
            Some(Ok(_)) => continue,
        };

        let events = match parse_frame(&text) {
            Ok(events) => events,
            Err(e) => {
                warn!(instance = %instance, error = %e, "dropping sidecar frame");
                continue;
            }
        };

        for event in events {
            let event = match event {
                TransportEvent::Paired { credentials, .. } if paired => {
                    TransportEvent::CredentialsUpdated { credentials }
                }
                TransportEvent::Paired { credentials, phone } => {
                    paired = true;
                    TransportEvent::Paired { credentials, phone }
                }
                other => other,
            };
            let logged_out = matches!(event, TransportEvent::LoggedOut);
            if tx.send(event).is_err() {
                debug!(instance = %instance, "session stopped listening");
                return;
            }
            if logged_out {
                return;
            }
        }
    }
}
