// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session, event-pipeline and dispatch engine of the wabridge bridge.
//!
//! Each configured WhatsApp account becomes an [`Account`]:
//! - a [`SessionManager`] owning the linked-device state machine and the
//!   transport connection
//! - an [`EventPipeline`] that deduplicates, filters and buffers inbound
//!   events and fans them out to [`EventSink`](wabridge_core::EventSink)s
//! - an [`OutboundDispatcher`] that serializes sends with timeout and
//!   bounded retry
//!
//! The [`AccountRouter`] picks the account for an external selector.

pub mod account;
pub mod buffer;
pub mod dispatcher;
pub mod media;
pub mod pipeline;
pub mod policy;
pub mod router;
pub mod session;
pub mod shutdown;
pub mod stats;
pub mod whitelist;

pub use account::{Account, AccountDeps, AccountView, EngineSettings};
pub use buffer::{BufferPage, DedupWindow, EventBuffer};
pub use dispatcher::{DispatchSettings, OutboundDispatcher, SendAccepted, SendRecord};
pub use media::{MediaStore, content_type_for};
pub use pipeline::{EventPipeline, IngestOutcome, PipelineNotice, PipelineSettings};
pub use policy::{AccountPolicy, PolicyHandle, PolicyUpdate, PolicyView};
pub use router::AccountRouter;
pub use session::{ReconnectPolicy, SessionManager};
pub use stats::{AccountStats, ActivitySummary, StatsSnapshot};
pub use whitelist::WhitelistRule;
