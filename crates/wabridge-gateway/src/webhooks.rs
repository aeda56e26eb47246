// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime management of webhook sinks.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use wabridge_core::BridgeError;
use wabridge_webhook::{SinkSpec, SinkView};

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::server::GatewayState;

#[derive(Debug, Serialize)]
pub struct WebhookListResponse {
    pub webhooks: Vec<SinkView>,
}

/// GET /webhooks
pub async fn list(State(state): State<GatewayState>) -> Json<WebhookListResponse> {
    Json(WebhookListResponse {
        webhooks: state.webhooks.list(),
    })
}

fn default_id() -> String {
    "default".to_string()
}

fn enabled() -> bool {
    true
}

/// Request body for POST /webhooks. An existing id is replaced.
#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    #[serde(default = "default_id")]
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Restricts the sink to one account; all accounts when absent.
    #[serde(default)]
    pub account: Option<String>,
}

fn validate_url(url: &str) -> Result<(), BridgeError> {
    let url = url.trim();
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| BridgeError::InvalidRequest("webhook url must be http(s)".into()))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(BridgeError::InvalidRequest("webhook url has no host".into()));
    }
    Ok(())
}

/// POST /webhooks
pub async fn upsert(
    State(state): State<GatewayState>,
    ApiJson(body): ApiJson<WebhookRequest>,
) -> ApiResult<Json<SinkView>> {
    validate_url(&body.url)?;
    let id = body.id.trim().to_string();
    if id.is_empty() {
        return Err(BridgeError::InvalidRequest("webhook id must not be blank".into()).into());
    }
    let session = state.router.resolve_session(body.account.as_deref())?;
    let spec = SinkSpec {
        id,
        url: body.url.trim().to_string(),
        token: body.token.filter(|t| !t.is_empty()),
        enabled: body.enabled,
        account: body.account,
        session,
    };
    let view = spec.view();
    state.webhooks.upsert(spec);
    Ok(Json(view))
}

/// DELETE /webhooks/{id}
pub async fn remove(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.webhooks.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("no webhook {id}")))
    }
}
