// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience primitives shared by reconnect, outbound dispatch and webhook
//! delivery.

pub mod backoff;

pub use backoff::{Backoff, sleep_or_cancel};
