// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common domain types shared by the session, pipeline, and dispatch layers.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use strum::{Display, EnumString};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::BridgeError;

/// Stable identifier of one linked-device session (one WhatsApp account).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Protocol-level message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an outbound send request, caller-supplied or generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

// --- Session ---

/// Connection state of a linked-device session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    /// No credentials; `start()` begins pairing.
    Unpaired,
    /// A QR challenge has been issued and awaits scanning.
    Pairing,
    Connected,
    /// Transport dropped; reconnecting with stored credentials.
    Disconnected,
    /// Upstream revoked the device. Terminal until reset.
    LoggedOut,
}

/// Snapshot of a session's observable state.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub state: ConnectionState,
    pub paired_number: Option<String>,
    pub last_error: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub reconnect_attempts: u32,
    /// Set once automatic reconnection has exhausted its attempt budget.
    pub persistent_failure: bool,
}

impl SessionStatus {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            state: ConnectionState::Unpaired,
            paired_number: None,
            last_error: None,
            last_seen: None,
            reconnect_attempts: 0,
            persistent_failure: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Opaque credential material for a paired device.
///
/// Owned by the session manager and the credential store only. The bytes are
/// wiped on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials(Vec<u8>);

impl Credentials {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials([redacted; {} bytes])", self.0.len())
    }
}

// --- Inbound ---

/// Content kind of an inbound event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContentKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    PollUpdate,
    ButtonReply,
    Reaction,
}

impl ContentKind {
    pub fn carries_media(self) -> bool {
        matches!(
            self,
            Self::Image | Self::Video | Self::Audio | Self::Document | Self::Sticker
        )
    }
}

/// Parsed body of an inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventBody {
    Text {
        text: String,
    },
    Media {
        caption: Option<String>,
        mime_type: String,
        file_name: Option<String>,
    },
    PollUpdate {
        poll_id: String,
        selected: Vec<String>,
    },
    ButtonReply {
        button_id: String,
        display_text: String,
    },
    Reaction {
        target_id: String,
        emoji: String,
    },
}

impl EventBody {
    /// Human-readable content used for webhook bodies and stats.
    pub fn summary(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Media {
                caption, mime_type, ..
            } => caption.clone().unwrap_or_else(|| format!("[{mime_type}]")),
            Self::PollUpdate { selected, .. } => selected.join(", "),
            Self::ButtonReply { display_text, .. } => display_text.clone(),
            Self::Reaction { emoji, .. } => emoji.clone(),
        }
    }
}

/// The untouched protocol payload, passed through to consumers and never parsed
/// by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPayload(pub Arc<serde_json::Value>);

impl RawPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(Arc::new(value))
    }
}

/// Locator for media the transport can download on request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMedia {
    /// Transport-specific handle (opaque to the core).
    pub handle: serde_json::Value,
    pub mime_type: String,
    pub file_name: Option<String>,
}

/// A raw inbound message as handed over by the transport.
#[derive(Debug, Clone)]
pub struct RawInbound {
    pub message_id: MessageId,
    pub sender_jid: String,
    pub chat_jid: String,
    pub sender_name: Option<String>,
    pub from_me: bool,
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: ContentKind,
    pub body: EventBody,
    pub media: Option<RawMedia>,
    pub raw: RawPayload,
}

/// Stored media reference produced by the media store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// File name inside the media directory.
    pub file: String,
    pub url: String,
    pub local_path: PathBuf,
    pub mime_type: String,
    pub size: u64,
}

/// Resolution state of an event's media attachment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MediaState {
    Pending,
    Ready(MediaRef),
    Failed { media_error: String },
}

/// Canonical inbound event as stored in the event buffer.
///
/// Serialized form carries `media_url` and `media_error` next to `media`;
/// both are `null` while the attachment is pending.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Arrival sequence number, strictly increasing per session.
    pub seq: u64,
    pub session_id: SessionId,
    /// Label of the receiving account.
    pub account: String,
    /// Paired number of the receiving account, if known.
    pub account_number: Option<String>,
    pub message_id: MessageId,
    pub sender_jid: String,
    pub sender_number: String,
    pub sender_name: Option<String>,
    pub chat_jid: String,
    pub is_group: bool,
    pub from_me: bool,
    /// Protocol timestamp, informational only.
    pub timestamp: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub kind: ContentKind,
    pub body: EventBody,
    pub media: Option<MediaState>,
    pub raw: RawPayload,
}

impl InboundEvent {
    /// Public URL of the resolved media, `None` while pending or on failure.
    pub fn media_url(&self) -> Option<&str> {
        match &self.media {
            Some(MediaState::Ready(media)) => Some(media.url.as_str()),
            _ => None,
        }
    }

    pub fn media_error(&self) -> Option<&str> {
        match &self.media {
            Some(MediaState::Failed { media_error }) => Some(media_error.as_str()),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct InboundEventWire<'a> {
    seq: u64,
    session_id: &'a SessionId,
    account: &'a str,
    account_number: Option<&'a str>,
    message_id: &'a MessageId,
    sender_jid: &'a str,
    sender_number: &'a str,
    sender_name: Option<&'a str>,
    chat_jid: &'a str,
    is_group: bool,
    from_me: bool,
    timestamp: Option<DateTime<Utc>>,
    received_at: DateTime<Utc>,
    kind: ContentKind,
    body: &'a EventBody,
    media: Option<&'a MediaState>,
    media_url: Option<&'a str>,
    media_error: Option<&'a str>,
    raw: &'a RawPayload,
}

impl Serialize for InboundEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        InboundEventWire {
            seq: self.seq,
            session_id: &self.session_id,
            account: &self.account,
            account_number: self.account_number.as_deref(),
            message_id: &self.message_id,
            sender_jid: &self.sender_jid,
            sender_number: &self.sender_number,
            sender_name: self.sender_name.as_deref(),
            chat_jid: &self.chat_jid,
            is_group: self.is_group,
            from_me: self.from_me,
            timestamp: self.timestamp,
            received_at: self.received_at,
            kind: self.kind,
            body: &self.body,
            media: self.media.as_ref(),
            media_url: self.media_url(),
            media_error: self.media_error(),
            raw: &self.raw,
        }
        .serialize(serializer)
    }
}

// --- Outbound ---

/// Chat presence values accepted by `set_presence`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Presence {
    Composing,
    Recording,
    Paused,
    Available,
    Unavailable,
}

/// A quick-reply button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub id: String,
    pub display_text: String,
}

/// One selectable row of a list message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRow {
    #[serde(rename = "rowId", alias = "row_id")]
    pub row_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A titled group of rows in a list message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSection {
    #[serde(default)]
    pub title: String,
    pub rows: Vec<ListRow>,
}

/// Kind-specific outbound payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SendPayload {
    Text {
        text: String,
        quoted_message_id: Option<String>,
    },
    Image {
        url: String,
        caption: Option<String>,
        quoted_message_id: Option<String>,
    },
    Video {
        url: String,
        caption: Option<String>,
        quoted_message_id: Option<String>,
    },
    Audio {
        url: String,
        ptt: bool,
        quoted_message_id: Option<String>,
    },
    Document {
        url: String,
        file_name: Option<String>,
        caption: Option<String>,
        quoted_message_id: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
        name: Option<String>,
        address: Option<String>,
        quoted_message_id: Option<String>,
    },
    Poll {
        question: String,
        options: Vec<String>,
        selectable_count: u32,
        quoted_message_id: Option<String>,
    },
    Buttons {
        text: String,
        buttons: Vec<Button>,
        footer: Option<String>,
        quoted_message_id: Option<String>,
    },
    List {
        title: String,
        text: String,
        button_text: String,
        sections: Vec<ListSection>,
        footer: Option<String>,
        quoted_message_id: Option<String>,
    },
    Contact {
        contact_name: String,
        contact_number: String,
    },
    /// Replaces the text of a message this account sent earlier.
    Edit {
        message_id: String,
        new_content: String,
    },
    /// Deletes a message this account sent earlier, for everyone.
    Revoke {
        message_id: String,
    },
    Reaction {
        message_id: String,
        emoji: String,
    },
    Presence {
        presence: Presence,
    },
}

const MAX_POLL_OPTIONS: usize = 12;
const MAX_BUTTONS: usize = 3;
const MAX_LIST_ROWS: usize = 10;

fn require(field: &str, value: &str) -> Result<(), BridgeError> {
    if value.trim().is_empty() {
        return Err(BridgeError::InvalidRequest(format!("{field} is required")));
    }
    Ok(())
}

impl SendPayload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Video { .. } => "video",
            Self::Audio { .. } => "audio",
            Self::Document { .. } => "document",
            Self::Location { .. } => "location",
            Self::Poll { .. } => "poll",
            Self::Buttons { .. } => "buttons",
            Self::List { .. } => "list",
            Self::Contact { .. } => "contact",
            Self::Edit { .. } => "edit",
            Self::Revoke { .. } => "revoke",
            Self::Reaction { .. } => "reaction",
            Self::Presence { .. } => "presence",
        }
    }

    /// Checks the required fields for this kind.
    pub fn validate(&self) -> Result<(), BridgeError> {
        match self {
            Self::Text { text, .. } => require("message", text),
            Self::Image { url, .. }
            | Self::Video { url, .. }
            | Self::Audio { url, .. }
            | Self::Document { url, .. } => require("url", url),
            Self::Location {
                latitude,
                longitude,
                ..
            } => {
                if !(-90.0..=90.0).contains(latitude) || !(-180.0..=180.0).contains(longitude) {
                    return Err(BridgeError::InvalidRequest(format!(
                        "coordinates out of range: {latitude}, {longitude}"
                    )));
                }
                Ok(())
            }
            Self::Poll {
                question,
                options,
                selectable_count,
                ..
            } => {
                require("question", question)?;
                if options.len() < 2 || options.len() > MAX_POLL_OPTIONS {
                    return Err(BridgeError::InvalidRequest(format!(
                        "a poll needs between 2 and {MAX_POLL_OPTIONS} options, got {}",
                        options.len()
                    )));
                }
                if options.iter().any(|o| o.trim().is_empty()) {
                    return Err(BridgeError::InvalidRequest(
                        "poll options must not be empty".into(),
                    ));
                }
                if *selectable_count as usize > options.len() {
                    return Err(BridgeError::InvalidRequest(
                        "selectable_count exceeds the number of options".into(),
                    ));
                }
                Ok(())
            }
            Self::Buttons { text, buttons, .. } => {
                require("message", text)?;
                if buttons.is_empty() || buttons.len() > MAX_BUTTONS {
                    return Err(BridgeError::InvalidRequest(format!(
                        "between 1 and {MAX_BUTTONS} buttons are required"
                    )));
                }
                for button in buttons {
                    require("button id", &button.id)?;
                    require("button text", &button.display_text)?;
                }
                Ok(())
            }
            Self::List {
                text,
                button_text,
                sections,
                ..
            } => {
                require("text", text)?;
                require("button_text", button_text)?;
                let rows: usize = sections.iter().map(|s| s.rows.len()).sum();
                if sections.iter().any(|s| s.rows.is_empty()) || rows > MAX_LIST_ROWS {
                    return Err(BridgeError::InvalidRequest(format!(
                        "every section needs rows, at most {MAX_LIST_ROWS} in total"
                    )));
                }
                for row in sections.iter().flat_map(|s| &s.rows) {
                    require("row id", &row.row_id)?;
                    require("row title", &row.title)?;
                }
                Ok(())
            }
            Self::Contact {
                contact_name,
                contact_number,
            } => {
                require("contact_name", contact_name)?;
                require("contact_number", contact_number)?;
                let digits = contact_number.trim().trim_start_matches('+');
                if !digits.chars().all(|c| c.is_ascii_digit() || c == ' ') {
                    return Err(BridgeError::InvalidRequest(format!(
                        "contact_number is not a phone number: {contact_number}"
                    )));
                }
                Ok(())
            }
            Self::Edit {
                message_id,
                new_content,
            } => {
                require("message_id", message_id)?;
                require("new_content", new_content)
            }
            Self::Reaction { message_id, .. } | Self::Revoke { message_id } => {
                require("message_id", message_id)
            }
            Self::Presence { .. } => Ok(()),
        }
    }

    /// Short description kept in the account's "last sent" summary.
    pub fn summary(&self) -> String {
        match self {
            Self::Text { text, .. } => text.clone(),
            Self::Image { caption, .. } | Self::Video { caption, .. } => {
                caption.clone().unwrap_or_else(|| format!("[{}]", self.kind_name()))
            }
            Self::Document { file_name, .. } => {
                format!("[document] {}", file_name.as_deref().unwrap_or(""))
                    .trim_end()
                    .to_string()
            }
            Self::Location { name, .. } => {
                format!("[location] {}", name.as_deref().unwrap_or(""))
                    .trim_end()
                    .to_string()
            }
            Self::Poll { question, .. } => format!("[poll] {question}"),
            Self::Buttons { text, .. } | Self::List { text, .. } => text.clone(),
            Self::Contact { contact_name, .. } => format!("[contact] {contact_name}"),
            Self::Edit { new_content, .. } => format!("[edit] {new_content}"),
            Self::Revoke { message_id } => format!("[revoke] {message_id}"),
            Self::Reaction { emoji, .. } => emoji.clone(),
            Self::Presence { presence } => format!("[presence] {presence}"),
            Self::Audio { .. } => "[audio]".to_string(),
        }
    }
}

/// An outbound send request as submitted by a caller.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub request_id: Option<RequestId>,
    /// Raw target as given (phone number, group id, or JID).
    pub target: String,
    pub payload: SendPayload,
    /// Overrides the account's configured retry count.
    pub retry_attempts: Option<u32>,
    /// Overrides the configured per-attempt timeout.
    pub timeout: Option<Duration>,
}

impl SendRequest {
    pub fn new(target: impl Into<String>, payload: SendPayload) -> Self {
        Self {
            request_id: None,
            target: target.into(),
            payload,
            retry_attempts: None,
            timeout: None,
        }
    }

    pub fn text(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            target,
            SendPayload::Text {
                text: text.into(),
                quoted_message_id: None,
            },
        )
    }
}

/// Lifecycle state of a send request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SendState {
    Pending,
    InFlight,
    Acked,
    Failed,
}

impl SendState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Acked | Self::Failed)
    }
}
