// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events stream of inbound events.
//!
//! With a cursor (`?after=` or the `Last-Event-ID` header) the retained
//! backlog after it is replayed first, then live notices follow:
//! ```text
//! event: event
//! id: 42
//! data: {"seq":42,"message_id":"...", ...}
//!
//! event: media
//! id: 41
//! data: {"seq":41, "media":{"status":"ready", ...}, "media_url":"http://...", ...}
//! ```
//! A subscriber that falls behind receives a `lagged` event and should
//! resync through `GET /events`.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use wabridge_core::InboundEvent;
use wabridge_engine::{EventPipeline, PipelineNotice};

use crate::error::ApiResult;
use crate::events::MAX_PAGE;
use crate::handlers::resolve;
use crate::server::GatewayState;

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub after: Option<u64>,
    #[serde(default)]
    pub account: Option<String>,
}

fn frame(kind: &'static str, event: &InboundEvent) -> Result<Event, axum::Error> {
    Event::default()
        .event(kind)
        .id(event.seq.to_string())
        .json_data(event)
}

fn notice_frame(notice: &PipelineNotice) -> Result<Event, axum::Error> {
    match notice {
        PipelineNotice::Appended(event) => frame("event", event),
        PipelineNotice::MediaResolved(event) => frame("media", event),
    }
}

fn last_event_id(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn backlog(
    pipeline: &EventPipeline,
    after: u64,
) -> Result<Vec<Arc<InboundEvent>>, wabridge_core::BridgeError> {
    let mut events = Vec::new();
    let mut cursor = after;
    loop {
        let page = pipeline.read(Some(cursor), MAX_PAGE)?;
        cursor = page.next_cursor;
        events.extend(page.events);
        if !page.has_more {
            return Ok(events);
        }
    }
}

/// GET /events/stream
pub async fn stream(
    State(state): State<GatewayState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let account = resolve(&state, query.account.as_deref())?;
    let pipeline = account.pipeline();

    // Subscribe before reading so nothing falls between backlog and live.
    let notices = pipeline.subscribe();
    let cursor = query.after.or_else(|| last_event_id(&headers));
    let replay = match cursor {
        Some(after) => backlog(pipeline, after)?,
        None => Vec::new(),
    };
    let high_water = replay
        .last()
        .map_or(cursor.unwrap_or(0), |event| event.seq);

    tracing::debug!(
        session_id = %account.id(),
        replayed = replay.len(),
        "event stream opened"
    );

    let replayed = stream::iter(replay.into_iter().map(|event| frame("event", &event)));
    let live = stream::unfold((notices, high_water), |(mut rx, high)| async move {
        loop {
            match rx.recv().await {
                Ok(PipelineNotice::Appended(event)) if event.seq <= high => continue,
                Ok(notice) => return Some((notice_frame(&notice), (rx, high))),
                Err(RecvError::Lagged(skipped)) => {
                    let lagged = Event::default()
                        .event("lagged")
                        .json_data(serde_json::json!({ "skipped": skipped }));
                    return Some((lagged, (rx, high)));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(replayed.chain(live)).keep_alive(KeepAlive::default()))
}
