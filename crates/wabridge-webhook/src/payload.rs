// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON body posted to webhook sinks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use wabridge_core::{ContentKind, InboundEvent, MediaState, RawPayload, SessionId};

#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload<'a> {
    /// Canonical sender number.
    pub sender: &'a str,
    pub sender_jid: &'a str,
    pub sender_name: Option<&'a str>,
    pub content: String,
    pub is_group: bool,
    pub chat: &'a str,
    pub message_id: &'a str,
    pub kind: ContentKind,
    pub session_id: &'a SessionId,
    pub account: &'a str,
    pub account_number: Option<&'a str>,
    pub seq: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    /// `null` until the attachment is stored.
    pub media_url: Option<&'a str>,
    pub media_pending: bool,
    pub media_error: Option<&'a str>,
    pub raw: &'a RawPayload,
}

impl<'a> From<&'a InboundEvent> for WebhookPayload<'a> {
    fn from(event: &'a InboundEvent) -> Self {
        Self {
            sender: &event.sender_number,
            sender_jid: &event.sender_jid,
            sender_name: event.sender_name.as_deref(),
            content: event.body.summary(),
            is_group: event.is_group,
            chat: &event.chat_jid,
            message_id: &event.message_id.0,
            kind: event.kind,
            session_id: &event.session_id,
            account: &event.account,
            account_number: event.account_number.as_deref(),
            seq: event.seq,
            timestamp: event.timestamp,
            received_at: event.received_at,
            media_url: event.media_url(),
            media_pending: matches!(event.media, Some(MediaState::Pending)),
            media_error: event.media_error(),
            raw: &event.raw,
        }
    }
}
