// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use wabridge_config::GatewayConfig;
use wabridge_core::BridgeError;
use wabridge_engine::{AccountRouter, MediaStore};
use wabridge_webhook::WebhookForwarder;

use crate::auth::{AuthConfig, auth_middleware};
use crate::{events, handlers, send, sse, webhooks};

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub router: Arc<AccountRouter>,
    pub webhooks: Arc<WebhookForwarder>,
    /// `None` when media storage is disabled.
    pub media: Option<Arc<MediaStore>>,
    pub auth: AuthConfig,
    /// Process start time for uptime calculation.
    pub started_at: Instant,
}

/// Bind address of the gateway.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl From<&GatewayConfig> for ServerConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
        }
    }
}

/// Builds the full route table.
///
/// `GET /health` is public; every other route goes through
/// [`auth_middleware`].
pub fn build_router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/session/start", post(handlers::start_session))
        .route("/session", delete(handlers::reset_session))
        .route("/status", get(handlers::status))
        .route("/qr", get(handlers::qr))
        .route("/sessions", get(handlers::sessions))
        .route("/stats", get(handlers::stats))
        .route("/settings", post(handlers::update_settings))
        .route("/media/{file}", get(handlers::media))
        .route("/events", get(events::poll))
        .route("/events/stream", get(sse::stream))
        .route("/send_message", post(send::submit::<send::TextFields>))
        .route("/send_image", post(send::submit::<send::ImageFields>))
        .route("/send_video", post(send::submit::<send::VideoFields>))
        .route("/send_audio", post(send::submit::<send::AudioFields>))
        .route("/send_document", post(send::submit::<send::DocumentFields>))
        .route("/send_location", post(send::submit::<send::LocationFields>))
        .route("/send_poll", post(send::submit::<send::PollFields>))
        .route("/send_buttons", post(send::submit::<send::ButtonsFields>))
        .route("/send_list", post(send::submit::<send::ListFields>))
        .route("/send_contact", post(send::submit::<send::ContactFields>))
        .route("/send_reaction", post(send::submit::<send::ReactionFields>))
        .route("/edit_message", post(send::submit::<send::EditFields>))
        .route("/revoke_message", post(send::submit::<send::RevokeFields>))
        .route("/set_presence", post(send::submit::<send::PresenceFields>))
        .route("/send/{request_id}", get(send::status))
        .route("/webhooks", get(webhooks::list).post(webhooks::upsert))
        .route("/webhooks/{id}", delete(webhooks::remove))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serves the gateway until `shutdown` fires, then drains open requests.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), BridgeError> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BridgeError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| BridgeError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("gateway stopped");
    Ok(())
}
