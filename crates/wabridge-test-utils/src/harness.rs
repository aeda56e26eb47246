// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end engine tests.
//!
//! `TestHarness` wires complete accounts (session, pipeline, dispatcher)
//! over [`MockTransport`]s, an in-memory credential store, a
//! [`RecordingSink`] and a media store in a temp directory. Timings are
//! shortened so retry and reconnect paths finish in milliseconds.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wabridge_config::{AccountConfig, MediaConfig};
use wabridge_core::{BridgeError, ConnectionState, EventSink, SessionId};
use wabridge_engine::{
    Account, AccountDeps, AccountRouter, DispatchSettings, EngineSettings, MediaStore,
    PipelineSettings, ReconnectPolicy,
};
use wabridge_resilience::Backoff;

use crate::memory_store::MemoryCredentialStore;
use crate::mock_transport::MockTransport;
use crate::recording_sink::RecordingSink;

/// Public URL media links are built from.
pub const MEDIA_BASE_URL: &str = "http://bridge.test";

/// Engine settings with millisecond backoffs.
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        reconnect: ReconnectPolicy {
            attempts: 3,
            backoff: Backoff::from_millis(10, 50),
            connect_timeout: Duration::from_millis(500),
        },
        pipeline: PipelineSettings {
            media_timeout: Duration::from_secs(2),
            flush_timeout: Duration::from_secs(1),
            ..PipelineSettings::default()
        },
        dispatch: DispatchSettings {
            retry_attempts: 2,
            send_timeout: Duration::from_millis(500),
            backoff: Backoff::from_millis(10, 50),
            retention: Duration::from_secs(300),
        },
    }
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    accounts: Vec<AccountConfig>,
    settings: EngineSettings,
    media: bool,
    extra_sinks: Vec<Arc<dyn EventSink>>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            accounts: Vec::new(),
            settings: fast_settings(),
            media: true,
            extra_sinks: Vec::new(),
        }
    }

    /// Add an account. Without any, a single `default` account is built.
    pub fn with_account(mut self, account: AccountConfig) -> Self {
        self.accounts.push(account);
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchSettings) -> Self {
        self.settings.dispatch = dispatch;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.settings.reconnect = reconnect;
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineSettings) -> Self {
        self.settings.pipeline = pipeline;
        self
    }

    /// Disable the media store; media events resolve to an error marker.
    pub fn without_media(mut self) -> Self {
        self.media = false;
        self
    }

    /// Deliver events to `sink` in addition to the recording sink.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.extra_sinks.push(sink);
        self
    }

    /// Build the harness. Accounts are built but not started.
    pub async fn build(self) -> Result<TestHarness, BridgeError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| BridgeError::Storage { source: e.into() })?;

        let media = if self.media {
            let config = MediaConfig {
                folder: Some(temp_dir.path().join("media").to_string_lossy().to_string()),
                ..MediaConfig::default()
            };
            Some(Arc::new(MediaStore::new(&config, MEDIA_BASE_URL).await?))
        } else {
            None
        };

        let configs = if self.accounts.is_empty() {
            vec![AccountConfig::default()]
        } else {
            self.accounts
        };

        let store = Arc::new(MemoryCredentialStore::new());
        let sink = Arc::new(RecordingSink::new());
        let shutdown = CancellationToken::new();

        let mut sinks: Vec<Arc<dyn EventSink>> = Vec::with_capacity(1 + self.extra_sinks.len());
        sinks.push(sink.clone());
        sinks.extend(self.extra_sinks);

        let mut accounts = Vec::with_capacity(configs.len());
        let mut transports = Vec::with_capacity(configs.len());
        for (index, config) in configs.iter().enumerate() {
            let transport = Arc::new(MockTransport::new(&format!("4917000000{index:02}")));
            let account = Account::build(config, AccountDeps {
                transport: transport.clone(),
                store: store.clone(),
                sinks: sinks.clone(),
                media: media.clone(),
                settings: self.settings.clone(),
                shutdown: shutdown.clone(),
            });
            accounts.push(account);
            transports.push(transport);
        }

        let router = Arc::new(AccountRouter::new(accounts.clone()));
        Ok(TestHarness {
            accounts,
            transports,
            router,
            store,
            sink,
            media,
            shutdown,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock adapters and real engine parts.
pub struct TestHarness {
    pub accounts: Vec<Arc<Account>>,
    pub transports: Vec<Arc<MockTransport>>,
    pub router: Arc<AccountRouter>,
    pub store: Arc<MemoryCredentialStore>,
    pub sink: Arc<RecordingSink>,
    pub media: Option<Arc<MediaStore>>,
    pub shutdown: CancellationToken,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// One `default` account with default test settings.
    pub async fn single() -> Result<Self, BridgeError> {
        Self::builder().build().await
    }

    fn index_of(&self, id: &str) -> usize {
        self.accounts
            .iter()
            .position(|a| a.id().0 == id)
            .unwrap_or_else(|| panic!("no account with id {id}"))
    }

    pub fn account(&self, id: &str) -> &Arc<Account> {
        &self.accounts[self.index_of(id)]
    }

    pub fn transport(&self, id: &str) -> &Arc<MockTransport> {
        &self.transports[self.index_of(id)]
    }

    /// Starts the account, scans the QR and waits until connected.
    pub async fn pair(&self, id: &str) -> Result<(), BridgeError> {
        let account = self.account(id);
        account.session().start().await?;
        self.transport(id).complete_pairing();
        if !self
            .wait_for_state(id, ConnectionState::Connected, Duration::from_secs(5))
            .await
        {
            return Err(BridgeError::Internal(format!("account {id} did not connect")));
        }
        Ok(())
    }

    pub async fn wait_for_state(&self, id: &str, state: ConnectionState, timeout: Duration) -> bool {
        let mut rx = self.account(id).session().subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| s.state == state)).await,
            Ok(Ok(_))
        )
    }

    /// Waits until the account's buffer holds at least `count` events.
    pub async fn wait_for_events(&self, id: &str, count: usize, timeout: Duration) -> bool {
        let pipeline = self.account(id).pipeline();
        let deadline = tokio::time::Instant::now() + timeout;
        while pipeline.len() < count {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }

    pub fn session_id(&self, id: &str) -> SessionId {
        self.account(id).id().clone()
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_account_pairs() {
        let harness = TestHarness::single().await.unwrap();
        assert_eq!(harness.accounts.len(), 1);
        harness.pair("default").await.unwrap();

        let status = harness.account("default").session().status();
        assert_eq!(status.state, ConnectionState::Connected);
        assert_eq!(status.paired_number.as_deref(), Some("491700000000"));
        assert!(harness.store.contains(&harness.session_id("default")));
    }

    #[tokio::test]
    async fn multiple_accounts_are_routable() {
        let harness = TestHarness::builder()
            .with_account(AccountConfig {
                id: "home".into(),
                label: Some("Home".into()),
                ..AccountConfig::default()
            })
            .with_account(AccountConfig {
                id: "office".into(),
                label: Some("Office".into()),
                ..AccountConfig::default()
            })
            .build()
            .await
            .unwrap();
        assert_eq!(harness.router.len(), 2);
        assert_eq!(harness.router.resolve(Some("office")).unwrap().id().0, "office");
    }
}
