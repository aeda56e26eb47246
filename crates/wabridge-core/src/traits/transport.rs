// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport adapter trait wrapping the WhatsApp-Web protocol capability.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BridgeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Credentials, MessageId, RawInbound, RawMedia, SendPayload};

/// Events emitted by a live transport connection.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A new pairing challenge to render as a QR code.
    Qr(String),
    /// The QR was scanned; credentials must be persisted.
    Paired {
        credentials: Credentials,
        phone: Option<String>,
    },
    /// Rotated key material for an already paired device. Persisted
    /// without a state change.
    CredentialsUpdated { credentials: Credentials },
    Connected {
        phone: Option<String>,
    },
    /// The socket dropped. The session manager decides whether to reconnect.
    Disconnected { reason: String },
    /// Upstream revoked this linked device.
    LoggedOut,
    Message(Box<RawInbound>),
}

/// Receiving half of a connection's event stream. Closing it means the
/// connection is gone.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// Adapter around the opaque protocol library.
///
/// One transport instance serves exactly one session. Implementations must
/// never block inside their event delivery path; events are pushed into an
/// unbounded channel and consumed by the session manager.
#[async_trait]
pub trait Transport: PluginAdapter {
    /// Opens a connection. Without credentials the transport starts pairing
    /// and emits [`TransportEvent::Qr`].
    async fn connect(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<TransportEvents, BridgeError>;

    /// Sends a payload to a fully normalized JID and returns the protocol
    /// message id once the upstream acknowledged it.
    async fn send(&self, jid: &str, payload: &SendPayload) -> Result<MessageId, BridgeError>;

    /// Downloads the bytes of an inbound media attachment.
    async fn download_media(&self, media: &RawMedia) -> Result<Vec<u8>, BridgeError>;

    /// Marks an inbound message as read.
    async fn mark_read(
        &self,
        chat_jid: &str,
        sender_jid: &str,
        message_id: &MessageId,
    ) -> Result<(), BridgeError>;

    /// Unlinks the device upstream.
    async fn logout(&self) -> Result<(), BridgeError>;

    /// Closes the live connection without unlinking.
    async fn disconnect(&self) -> Result<(), BridgeError>;
}
