// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp-Web transport for wabridge.
//!
//! The linked-device socket itself lives in a protocol sidecar. This crate
//! drives the sidecar's HTTP control API and translates the JSON frames it
//! pushes over a WebSocket into [`TransportEvent`](wabridge_core::TransportEvent)s.
//! One [`SidecarTransport`] serves one session, addressed on the sidecar as
//! an instance named after the session id.

pub mod client;
pub mod frames;
pub mod transport;

pub use client::SidecarClient;
pub use frames::parse_frame;
pub use transport::SidecarTransport;
