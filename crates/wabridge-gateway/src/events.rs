// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cursor polling over the per-account event buffer.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use wabridge_core::SessionId;
use wabridge_engine::BufferPage;

use crate::error::ApiResult;
use crate::handlers::resolve;
use crate::server::GatewayState;

pub const DEFAULT_PAGE: usize = 100;
pub const MAX_PAGE: usize = 1000;

#[derive(Debug, Default, Deserialize)]
pub struct PollQuery {
    /// Last sequence number the client has seen.
    #[serde(default)]
    pub after: Option<u64>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub account: Option<String>,
}

impl PollQuery {
    pub fn page_size(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE)
    }
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub account: SessionId,
    #[serde(flatten)]
    pub page: BufferPage,
}

/// GET /events
///
/// A cursor older than the retained window answers `410` with the oldest
/// sequence number still available.
pub async fn poll(
    State(state): State<GatewayState>,
    Query(query): Query<PollQuery>,
) -> ApiResult<Json<PollResponse>> {
    let account = resolve(&state, query.account.as_deref())?;
    let page = account.pipeline().read(query.after, query.page_size())?;
    Ok(Json(PollResponse {
        account: account.id().clone(),
        page,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(PollQuery::default().page_size(), DEFAULT_PAGE);
        let huge = PollQuery {
            limit: Some(50_000),
            ..PollQuery::default()
        };
        assert_eq!(huge.page_size(), MAX_PAGE);
        let zero = PollQuery {
            limit: Some(0),
            ..PollQuery::default()
        };
        assert_eq!(zero.page_size(), 1);
    }
}
