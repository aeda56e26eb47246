// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON error bodies and the status code each [`BridgeError`] maps to.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use wabridge_core::BridgeError;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable snake_case code, see [`BridgeError::code`].
    pub code: &'static str,
    /// Set for `cursor_too_old`: where a resync should start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_seq: Option<u64>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: message.into(),
                code,
                oldest_seq: None,
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

pub fn status_for(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::InvalidRequest(_) | BridgeError::Config(_) => StatusCode::BAD_REQUEST,
        BridgeError::NotWhitelisted { .. } => StatusCode::FORBIDDEN,
        BridgeError::AccountNotFound { .. } | BridgeError::NotFound(_) => StatusCode::NOT_FOUND,
        BridgeError::AmbiguousAccount { .. }
        | BridgeError::SessionLoggedOut
        | BridgeError::SessionNotConnected
        | BridgeError::SessionReset => StatusCode::CONFLICT,
        BridgeError::CursorTooOld { .. } => StatusCode::GONE,
        BridgeError::ProtocolUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        BridgeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        BridgeError::Transport { .. } => StatusCode::BAD_GATEWAY,
        BridgeError::Storage { .. }
        | BridgeError::Media(_)
        | BridgeError::Webhook(_)
        | BridgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            tracing::warn!(error = %err, code = err.code(), "request failed");
        }
        let oldest_seq = match &err {
            BridgeError::CursorTooOld { oldest, .. } => Some(*oldest),
            _ => None,
        };
        Self {
            status,
            body: ErrorResponse {
                error: err.to_string(),
                code: err.code(),
                oldest_seq,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_http_status() {
        assert_eq!(
            status_for(&BridgeError::AmbiguousAccount { count: 2 }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&BridgeError::NotWhitelisted {
                target: "49".into()
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&BridgeError::CursorTooOld {
                requested: 1,
                oldest: 5
            }),
            StatusCode::GONE
        );
        assert_eq!(
            status_for(&BridgeError::ProtocolUnavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn cursor_error_carries_oldest_seq() {
        let err = ApiError::from(BridgeError::CursorTooOld {
            requested: 1,
            oldest: 5,
        });
        let json = serde_json::to_value(&err.body).unwrap();
        assert_eq!(json["code"], "cursor_too_old");
        assert_eq!(json["oldest_seq"], 5);

        let plain = ApiError::not_found("nothing here");
        let json = serde_json::to_value(&plain.body).unwrap();
        assert!(json.get("oldest_seq").is_none());
    }
}
