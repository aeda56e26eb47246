// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook forwarding for inbound WhatsApp events.
//!
//! [`WebhookForwarder`] implements [`EventSink`](wabridge_core::EventSink):
//! the event pipeline hands every buffered event over, and the forwarder
//! POSTs it to each matching sink with the sink secret in
//! `X-Webhook-Token` and an HMAC body signature in `X-Webhook-Signature`.

pub mod forwarder;
pub mod payload;
pub mod signing;
pub mod sink;

pub use forwarder::WebhookForwarder;
pub use payload::WebhookPayload;
pub use sink::{Attempt, DeliveryPolicy, SinkSpec, SinkView};
