// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sidecar event frames.
//!
//! The sidecar forwards the protocol library's events as
//! `{"event": "<name>", "data": {...}}`. Handled names:
//! `qrcode.updated`, `connection.update`, `creds.update` and
//! `messages.upsert`. Anything else is ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use wabridge_core::jid::canonical_number;
use wabridge_core::{
    BridgeError, ContentKind, Credentials, EventBody, MessageId, RawInbound, RawMedia, RawPayload,
    TransportEvent,
};

/// Disconnect status the protocol uses for a revoked linked device.
const LOGGED_OUT_STATUS: u64 = 401;

const STATUS_BROADCAST: &str = "status@broadcast";

/// Containers that wrap the actual message one level down.
const WRAPPERS: &[&str] = &[
    "ephemeralMessage",
    "viewOnceMessage",
    "viewOnceMessageV2",
    "documentWithCaptionMessage",
];

#[derive(Debug, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Parses one text frame into zero or more transport events.
pub fn parse_frame(text: &str) -> Result<Vec<TransportEvent>, BridgeError> {
    let frame: Frame = serde_json::from_str(text)
        .map_err(|e| BridgeError::terminal(format!("malformed sidecar frame: {e}")))?;

    let events = match frame.event.as_str() {
        "qrcode.updated" => qr_code(&frame.data).map(TransportEvent::Qr).into_iter().collect(),
        "connection.update" => connection_update(&frame.data),
        "creds.update" => creds_update(&frame.data)?.into_iter().collect(),
        "messages.upsert" => messages_upsert(&frame.data),
        other => {
            debug!(event = other, "ignoring sidecar event");
            Vec::new()
        }
    };
    Ok(events)
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn qr_code(data: &Value) -> Option<String> {
    str_field(data, "qr")
        .or_else(|| data.get("qrcode").and_then(|q| str_field(q, "code")))
        .map(String::from)
}

fn connection_update(data: &Value) -> Vec<TransportEvent> {
    let mut events = Vec::new();
    if let Some(qr) = qr_code(data) {
        events.push(TransportEvent::Qr(qr));
    }

    match str_field(data, "connection") {
        Some("open") => events.push(TransportEvent::Connected {
            phone: phone_of(data),
        }),
        Some("close") => {
            let status = data.get("statusCode").and_then(Value::as_u64);
            let logged_out = data
                .get("loggedOut")
                .and_then(Value::as_bool)
                .unwrap_or(false)
                || status == Some(LOGGED_OUT_STATUS);
            if logged_out {
                events.push(TransportEvent::LoggedOut);
            } else {
                let reason = match (str_field(data, "reason"), status) {
                    (Some(reason), _) => reason.to_string(),
                    (None, Some(status)) => format!("connection closed (status {status})"),
                    (None, None) => "connection closed".to_string(),
                };
                events.push(TransportEvent::Disconnected { reason });
            }
        }
        _ => {}
    }
    events
}

/// Phone of the linked account, from `phone` or the `me.id` JID.
fn phone_of(data: &Value) -> Option<String> {
    if let Some(phone) = str_field(data, "phone") {
        return Some(canonical_number(phone));
    }
    data.get("me")
        .or_else(|| data.get("creds").and_then(|c| c.get("me")))
        .and_then(|me| str_field(me, "id"))
        .map(canonical_number)
}

fn creds_update(data: &Value) -> Result<Option<TransportEvent>, BridgeError> {
    let Some(creds) = data.get("creds").filter(|c| !c.is_null()) else {
        return Ok(None);
    };
    let bytes = serde_json::to_vec(creds)
        .map_err(|e| BridgeError::terminal(format!("failed to encode credentials: {e}")))?;
    Ok(Some(TransportEvent::Paired {
        credentials: Credentials::new(bytes),
        phone: phone_of(data),
    }))
}

fn messages_upsert(data: &Value) -> Vec<TransportEvent> {
    let Some(messages) = data.get("messages").and_then(Value::as_array) else {
        return Vec::new();
    };
    messages
        .iter()
        .filter_map(parse_message)
        .map(|raw| TransportEvent::Message(Box::new(raw)))
        .collect()
}

fn parse_message(message: &Value) -> Option<RawInbound> {
    let key = message.get("key")?;
    let id = str_field(key, "id")?;
    let chat_jid = str_field(key, "remoteJid")?;
    if chat_jid == STATUS_BROADCAST {
        return None;
    }
    let sender_jid = str_field(key, "participant").unwrap_or(chat_jid);
    let from_me = key.get("fromMe").and_then(Value::as_bool).unwrap_or(false);

    let Some((kind, body)) = message.get("message").and_then(parse_content) else {
        debug!(message_id = id, "skipping message without supported content");
        return None;
    };

    let media = match &body {
        EventBody::Media {
            mime_type,
            file_name,
            ..
        } => Some(RawMedia {
            handle: message.clone(),
            mime_type: mime_type.clone(),
            file_name: file_name.clone(),
        }),
        _ => None,
    };

    Some(RawInbound {
        message_id: MessageId(id.to_string()),
        sender_jid: sender_jid.to_string(),
        chat_jid: chat_jid.to_string(),
        sender_name: str_field(message, "pushName").map(String::from),
        from_me,
        timestamp: message.get("messageTimestamp").and_then(parse_timestamp),
        kind,
        body,
        media,
        raw: RawPayload::new(message.clone()),
    })
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let secs = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp(secs, 0)
}

fn media_body(content: &Value, default_mime: &str) -> EventBody {
    EventBody::Media {
        caption: str_field(content, "caption").map(String::from),
        mime_type: str_field(content, "mimetype")
            .unwrap_or(default_mime)
            .to_string(),
        file_name: str_field(content, "fileName").map(String::from),
    }
}

fn parse_content(content: &Value) -> Option<(ContentKind, EventBody)> {
    for wrapper in WRAPPERS {
        if let Some(inner) = content.get(*wrapper).and_then(|w| w.get("message")) {
            return parse_content(inner);
        }
    }

    if let Some(text) = str_field(content, "conversation") {
        return Some((ContentKind::Text, EventBody::Text {
            text: text.to_string(),
        }));
    }
    if let Some(text) = content
        .get("extendedTextMessage")
        .and_then(|m| str_field(m, "text"))
    {
        return Some((ContentKind::Text, EventBody::Text {
            text: text.to_string(),
        }));
    }

    let media_kinds = [
        ("imageMessage", ContentKind::Image, "image/jpeg"),
        ("videoMessage", ContentKind::Video, "video/mp4"),
        ("audioMessage", ContentKind::Audio, "audio/ogg"),
        ("documentMessage", ContentKind::Document, "application/octet-stream"),
        ("stickerMessage", ContentKind::Sticker, "image/webp"),
    ];
    for (field, kind, default_mime) in media_kinds {
        if let Some(media) = content.get(field) {
            return Some((kind, media_body(media, default_mime)));
        }
    }

    if let Some(poll) = content.get("pollUpdateMessage") {
        let poll_id = poll
            .get("pollCreationMessageKey")
            .and_then(|k| str_field(k, "id"))
            .unwrap_or_default()
            .to_string();
        let selected = poll
            .get("vote")
            .and_then(|v| v.get("selectedOptions"))
            .and_then(Value::as_array)
            .map(|options| {
                options
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        return Some((ContentKind::PollUpdate, EventBody::PollUpdate {
            poll_id,
            selected,
        }));
    }

    if let Some(reply) = content.get("buttonsResponseMessage") {
        return Some((ContentKind::ButtonReply, EventBody::ButtonReply {
            button_id: str_field(reply, "selectedButtonId")
                .unwrap_or_default()
                .to_string(),
            display_text: str_field(reply, "selectedDisplayText")
                .unwrap_or_default()
                .to_string(),
        }));
    }
    if let Some(reply) = content.get("templateButtonReplyMessage") {
        return Some((ContentKind::ButtonReply, EventBody::ButtonReply {
            button_id: str_field(reply, "selectedId").unwrap_or_default().to_string(),
            display_text: str_field(reply, "selectedDisplayText")
                .unwrap_or_default()
                .to_string(),
        }));
    }

    if let Some(reply) = content.get("listResponseMessage") {
        let row_id = reply
            .get("singleSelectReply")
            .and_then(|r| str_field(r, "selectedRowId"))
            .unwrap_or_default();
        return Some((ContentKind::ButtonReply, EventBody::ButtonReply {
            button_id: row_id.to_string(),
            display_text: str_field(reply, "title").unwrap_or(row_id).to_string(),
        }));
    }

    if let Some(reaction) = content.get("reactionMessage") {
        return Some((ContentKind::Reaction, EventBody::Reaction {
            target_id: reaction
                .get("key")
                .and_then(|k| str_field(k, "id"))
                .unwrap_or_default()
                .to_string(),
            // An empty reaction removes a previous one.
            emoji: reaction
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }));
    }

    None
}
