// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for session control, status and settings.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use qrcode::QrCode;
use qrcode::render::svg;
use serde::{Deserialize, Serialize};
use wabridge_config::split_whitelist;
use wabridge_core::{BridgeError, ConnectionState, SessionId, SessionStatus};
use wabridge_engine::{Account, AccountView, PolicyUpdate, PolicyView, StatsSnapshot, content_type_for};

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::server::GatewayState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `?account=` selector shared by the account-scoped routes.
#[derive(Debug, Default, Deserialize)]
pub struct AccountQuery {
    #[serde(default)]
    pub account: Option<String>,
}

pub(crate) fn resolve<'a>(
    state: &'a GatewayState,
    selector: Option<&str>,
) -> ApiResult<&'a Arc<Account>> {
    Ok(state.router.resolve(selector)?)
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

/// GET /health
///
/// Unauthenticated liveness probe.
pub async fn health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: VERSION,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

#[derive(Debug, Serialize)]
pub struct SessionActionResponse {
    pub account: SessionId,
    pub status: ConnectionState,
    pub message: &'static str,
}

/// POST /session/start
pub async fn start_session(
    State(state): State<GatewayState>,
    Query(query): Query<AccountQuery>,
) -> ApiResult<Json<SessionActionResponse>> {
    let account = resolve(&state, query.account.as_deref())?;
    let status = account.session().start().await?;
    let message = match status {
        ConnectionState::Pairing => "scan the QR code to link the device",
        ConnectionState::Connected => "already connected",
        _ => "connecting with stored credentials",
    };
    Ok(Json(SessionActionResponse {
        account: account.id().clone(),
        status,
        message,
    }))
}

/// DELETE /session
///
/// Unlinks the device and wipes its credentials and buffered events.
pub async fn reset_session(
    State(state): State<GatewayState>,
    Query(query): Query<AccountQuery>,
) -> ApiResult<Json<SessionActionResponse>> {
    let account = resolve(&state, query.account.as_deref())?;
    account.session().reset().await?;
    Ok(Json(SessionActionResponse {
        account: account.id().clone(),
        status: account.session().state(),
        message: "session reset; start a new session to pair again",
    }))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    pub version: &'static str,
    pub account: String,
    #[serde(flatten)]
    pub status: SessionStatus,
}

/// GET /status
pub async fn status(
    State(state): State<GatewayState>,
    Query(query): Query<AccountQuery>,
) -> ApiResult<Json<StatusResponse>> {
    let account = resolve(&state, query.account.as_deref())?;
    let status = account.session().status();
    Ok(Json(StatusResponse {
        connected: status.is_connected(),
        version: VERSION,
        account: account.label().to_string(),
        status,
    }))
}

#[derive(Debug, Serialize)]
pub struct QrResponse {
    pub status: ConnectionState,
    /// SVG data URL, present only while pairing.
    pub qr: Option<String>,
}

/// Renders a pairing code as an SVG data URL.
pub fn qr_data_url(code: &str) -> Result<String, BridgeError> {
    let qr = QrCode::new(code.as_bytes())
        .map_err(|e| BridgeError::Internal(format!("failed to encode QR code: {e}")))?;
    let image = qr
        .render::<svg::Color<'_>>()
        .min_dimensions(256, 256)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build();
    Ok(format!(
        "data:image/svg+xml;base64,{}",
        BASE64.encode(image.as_bytes())
    ))
}

/// GET /qr
pub async fn qr(
    State(state): State<GatewayState>,
    Query(query): Query<AccountQuery>,
) -> ApiResult<Json<QrResponse>> {
    let account = resolve(&state, query.account.as_deref())?;
    let session = account.session();
    let qr = session
        .current_qr()
        .map(|code| qr_data_url(&code))
        .transpose()?;
    Ok(Json(QrResponse {
        status: session.state(),
        qr,
    }))
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<AccountView>,
}

/// GET /sessions
pub async fn sessions(State(state): State<GatewayState>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.router.all().iter().map(|a| a.view()).collect(),
    })
}

#[derive(Debug, Serialize)]
pub struct AccountStatsEntry {
    pub session_id: SessionId,
    pub label: String,
    pub state: ConnectionState,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
}

#[derive(Debug, Default, Serialize)]
pub struct Totals {
    pub sent: u64,
    pub received: u64,
    pub failed: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub version: &'static str,
    pub uptime_secs: u64,
    pub totals: Totals,
    pub accounts: Vec<AccountStatsEntry>,
}

/// GET /stats
pub async fn stats(State(state): State<GatewayState>) -> Json<StatsResponse> {
    let mut totals = Totals::default();
    let accounts = state
        .router
        .all()
        .iter()
        .map(|account| {
            let stats = account.stats();
            totals.sent += stats.sent;
            totals.received += stats.received;
            totals.failed += stats.failed;
            AccountStatsEntry {
                session_id: account.id().clone(),
                label: account.label().to_string(),
                state: account.session().state(),
                stats,
            }
        })
        .collect();
    Json(StatsResponse {
        version: VERSION,
        uptime_secs: state.started_at.elapsed().as_secs(),
        totals,
        accounts,
    })
}

/// Whitelist as a comma-separated string or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WhitelistInput {
    Csv(String),
    List(Vec<String>),
}

impl WhitelistInput {
    fn into_entries(self) -> Vec<String> {
        match self {
            Self::Csv(raw) => split_whitelist(&raw),
            Self::List(items) => items.iter().flat_map(|i| split_whitelist(i)).collect(),
        }
    }
}

/// Request body for POST /settings. Absent fields stay unchanged.
#[derive(Debug, Deserialize)]
pub struct SettingsRequest {
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub whitelist: Option<WhitelistInput>,
    #[serde(default)]
    pub ignore_self_messages: Option<bool>,
    #[serde(default)]
    pub mark_as_read: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub account: SessionId,
    #[serde(flatten)]
    pub policy: PolicyView,
}

/// POST /settings
///
/// Applies to events ingested after the update.
pub async fn update_settings(
    State(state): State<GatewayState>,
    ApiJson(body): ApiJson<SettingsRequest>,
) -> ApiResult<Json<SettingsResponse>> {
    let account = resolve(&state, body.account.as_deref())?;
    account.policy().update(PolicyUpdate {
        whitelist: body.whitelist.map(WhitelistInput::into_entries),
        ignore_self_messages: body.ignore_self_messages,
        mark_as_read: body.mark_as_read,
    });
    Ok(Json(SettingsResponse {
        account: account.id().clone(),
        policy: account.policy().view(),
    }))
}

/// GET /media/{file}
pub async fn media(
    State(state): State<GatewayState>,
    Path(file): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let path = state
        .media
        .as_ref()
        .and_then(|store| store.resolve(&file))
        .ok_or_else(|| ApiError::not_found(format!("no media file {file}")))?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found(format!("no media file {file}")));
        }
        Err(e) => return Err(BridgeError::Media(format!("failed to read {file}: {e}")).into()),
    };
    Ok(([(header::CONTENT_TYPE, content_type_for(&file))], bytes))
}
