// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the wabridge WhatsApp bridge.
//!
//! This crate provides the trait seams, error taxonomy, and domain types
//! shared by the session engine, the transport, the webhook forwarder and
//! the REST gateway.

pub mod account;
pub mod error;
pub mod jid;
pub mod traits;
pub mod types;

pub use account::{AccountIdentity, SelectorMatch};
pub use error::BridgeError;
pub use types::{
    ConnectionState, ContentKind, Credentials, EventBody, HealthStatus, InboundEvent, MediaRef,
    MediaState, MessageId, Presence, RawInbound, RawMedia, RawPayload, RequestId, SendPayload,
    SendRequest, SendState, SessionId, SessionStatus,
};

pub use traits::{
    CredentialStore, EventSink, PluginAdapter, SessionObserver, StoredSession, Transport,
    TransportEvent, TransportEvents,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_transport<T: Transport>() {}
        fn _assert_store<T: CredentialStore>() {}
        fn _assert_sink<T: EventSink>() {}
        fn _assert_observer<T: SessionObserver>() {}
        fn _assert_object_safe(_: &dyn Transport, _: &dyn CredentialStore, _: &dyn EventSink) {}
    }

    #[test]
    fn session_ids_display_plainly() {
        let sid = SessionId::from("default");
        assert_eq!(sid.to_string(), "default");
        assert_eq!(serde_json::to_string(&sid).expect("serialize"), "\"default\"");
    }
}
