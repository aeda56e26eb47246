// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound send endpoints.
//!
//! Every `POST /send_*` body (and `/edit_message`, `/revoke_message`) shares an envelope (`number` or `target`,
//! optional `account`, `request_id`, `retry_attempts`, `timeout_secs`) and
//! adds kind-specific fields. Accepted sends answer `202` at once; progress
//! is queried through `GET /send/{request_id}`.

use std::time::Duration;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use wabridge_core::types::{Button, ListSection};
use wabridge_core::{Presence, RequestId, SendPayload, SendRequest};
use wabridge_engine::{SendAccepted, SendRecord};

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::handlers::{AccountQuery, resolve};
use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
pub struct SendEnvelope {
    /// Phone number, group id or JID.
    #[serde(default, alias = "target")]
    pub number: String,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub retry_attempts: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SendBody<T> {
    #[serde(flatten)]
    pub envelope: SendEnvelope,
    #[serde(flatten)]
    pub fields: T,
}

/// Kind-specific part of a send body.
pub trait IntoPayload: DeserializeOwned + Send + 'static {
    fn into_payload(self) -> SendPayload;
}

#[derive(Debug, Deserialize)]
pub struct TextFields {
    #[serde(default, alias = "text")]
    pub message: String,
    #[serde(default)]
    pub quoted_message_id: Option<String>,
}

impl IntoPayload for TextFields {
    fn into_payload(self) -> SendPayload {
        SendPayload::Text {
            text: self.message,
            quoted_message_id: self.quoted_message_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ImageFields {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub quoted_message_id: Option<String>,
}

impl IntoPayload for ImageFields {
    fn into_payload(self) -> SendPayload {
        SendPayload::Image {
            url: self.url,
            caption: self.caption,
            quoted_message_id: self.quoted_message_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VideoFields {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub quoted_message_id: Option<String>,
}

impl IntoPayload for VideoFields {
    fn into_payload(self) -> SendPayload {
        SendPayload::Video {
            url: self.url,
            caption: self.caption,
            quoted_message_id: self.quoted_message_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AudioFields {
    #[serde(default)]
    pub url: String,
    /// Send as a voice note.
    #[serde(default)]
    pub ptt: bool,
    #[serde(default)]
    pub quoted_message_id: Option<String>,
}

impl IntoPayload for AudioFields {
    fn into_payload(self) -> SendPayload {
        SendPayload::Audio {
            url: self.url,
            ptt: self.ptt,
            quoted_message_id: self.quoted_message_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DocumentFields {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub quoted_message_id: Option<String>,
}

impl IntoPayload for DocumentFields {
    fn into_payload(self) -> SendPayload {
        SendPayload::Document {
            url: self.url,
            file_name: self.file_name,
            caption: self.caption,
            quoted_message_id: self.quoted_message_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LocationFields {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub quoted_message_id: Option<String>,
}

impl IntoPayload for LocationFields {
    fn into_payload(self) -> SendPayload {
        SendPayload::Location {
            latitude: self.latitude,
            longitude: self.longitude,
            name: self.name,
            address: self.address,
            quoted_message_id: self.quoted_message_id,
        }
    }
}

fn one() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct PollFields {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default = "one")]
    pub selectable_count: u32,
    #[serde(default)]
    pub quoted_message_id: Option<String>,
}

impl IntoPayload for PollFields {
    fn into_payload(self) -> SendPayload {
        SendPayload::Poll {
            question: self.question,
            options: self.options,
            selectable_count: self.selectable_count,
            quoted_message_id: self.quoted_message_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ButtonsFields {
    #[serde(default, alias = "text")]
    pub message: String,
    #[serde(default)]
    pub buttons: Vec<Button>,
    #[serde(default)]
    pub footer: Option<String>,
    #[serde(default)]
    pub quoted_message_id: Option<String>,
}

impl IntoPayload for ButtonsFields {
    fn into_payload(self) -> SendPayload {
        SendPayload::Buttons {
            text: self.message,
            buttons: self.buttons,
            footer: self.footer,
            quoted_message_id: self.quoted_message_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListFields {
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "message")]
    pub text: String,
    /// Label of the button that opens the list.
    #[serde(default)]
    pub button_text: String,
    #[serde(default)]
    pub sections: Vec<ListSection>,
    #[serde(default)]
    pub footer: Option<String>,
    #[serde(default)]
    pub quoted_message_id: Option<String>,
}

impl IntoPayload for ListFields {
    fn into_payload(self) -> SendPayload {
        SendPayload::List {
            title: self.title,
            text: self.text,
            button_text: self.button_text,
            sections: self.sections,
            footer: self.footer,
            quoted_message_id: self.quoted_message_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ContactFields {
    #[serde(default)]
    pub contact_name: String,
    #[serde(default)]
    pub contact_number: String,
}

impl IntoPayload for ContactFields {
    fn into_payload(self) -> SendPayload {
        SendPayload::Contact {
            contact_name: self.contact_name,
            contact_number: self.contact_number,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EditFields {
    #[serde(default)]
    pub message_id: String,
    #[serde(default, alias = "message")]
    pub new_content: String,
}

impl IntoPayload for EditFields {
    fn into_payload(self) -> SendPayload {
        SendPayload::Edit {
            message_id: self.message_id,
            new_content: self.new_content,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RevokeFields {
    #[serde(default)]
    pub message_id: String,
}

impl IntoPayload for RevokeFields {
    fn into_payload(self) -> SendPayload {
        SendPayload::Revoke {
            message_id: self.message_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReactionFields {
    #[serde(default)]
    pub message_id: String,
    /// Emoji; empty removes an earlier reaction.
    #[serde(default, alias = "emoji")]
    pub reaction: String,
}

impl IntoPayload for ReactionFields {
    fn into_payload(self) -> SendPayload {
        SendPayload::Reaction {
            message_id: self.message_id,
            emoji: self.reaction,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PresenceFields {
    pub presence: Presence,
}

impl IntoPayload for PresenceFields {
    fn into_payload(self) -> SendPayload {
        SendPayload::Presence {
            presence: self.presence,
        }
    }
}

/// POST /send_message, /send_image, ... /revoke_message, /set_presence
pub async fn submit<T: IntoPayload>(
    State(state): State<GatewayState>,
    ApiJson(body): ApiJson<SendBody<T>>,
) -> ApiResult<(StatusCode, Json<SendAccepted>)> {
    let SendBody { envelope, fields } = body;
    let account = resolve(&state, envelope.account.as_deref())?;
    let request = SendRequest {
        request_id: envelope.request_id.map(RequestId),
        target: envelope.number,
        payload: fields.into_payload(),
        retry_attempts: envelope.retry_attempts,
        timeout: envelope.timeout_secs.map(Duration::from_secs),
    };
    let accepted = account.dispatcher().submit(request)?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// GET /send/{request_id}
///
/// Without `?account=` every account is searched.
pub async fn status(
    State(state): State<GatewayState>,
    Path(request_id): Path<String>,
    Query(query): Query<AccountQuery>,
) -> ApiResult<Json<SendRecord>> {
    let id = RequestId(request_id);
    let record = match query.account.as_deref() {
        Some(selector) => resolve(&state, Some(selector))?.dispatcher().get(&id),
        None => state
            .router
            .all()
            .iter()
            .find_map(|account| account.dispatcher().get(&id)),
    };
    record
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no send request {}", id.0)))
}
