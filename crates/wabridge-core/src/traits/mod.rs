// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod credentials;
pub mod observer;
pub mod sink;
pub mod transport;

pub use adapter::PluginAdapter;
pub use credentials::{CredentialStore, StoredSession};
pub use observer::SessionObserver;
pub use sink::EventSink;
pub use transport::{Transport, TransportEvent, TransportEvents};
