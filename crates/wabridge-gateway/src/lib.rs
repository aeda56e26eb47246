// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST gateway of the wabridge bridge.
//!
//! Exposes session control, cursor polling and SSE over inbound events,
//! outbound sends, runtime settings, webhook management and stored media
//! over axum. Every route except `GET /health` requires `X-Auth-Token`.

pub mod auth;
pub mod error;
pub mod events;
pub mod extract;
pub mod handlers;
pub mod send;
pub mod server;
pub mod sse;
pub mod webhooks;

pub use auth::AuthConfig;
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use server::{GatewayState, ServerConfig, build_router, start_server};
