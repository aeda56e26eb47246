// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `wabridge serve` command implementation.
//!
//! Wires the credential store, one sidecar transport per account, the
//! media store, the webhook forwarder and the REST gateway, then runs
//! until SIGINT/SIGTERM and shuts down in order: gateway, outbound sends,
//! transport connections, webhook queues, media sweeper.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wabridge_config::model::BridgeConfig;
use wabridge_core::{BridgeError, EventSink, HealthStatus, PluginAdapter};
use wabridge_engine::shutdown::{drain_accounts, install_signal_handler};
use wabridge_engine::{Account, AccountDeps, AccountRouter, EngineSettings, MediaStore};
use wabridge_gateway::{AuthConfig, GatewayState, ServerConfig, start_server};
use wabridge_storage::SqliteCredentialStore;
use wabridge_webhook::{SinkSpec, WebhookForwarder};
use wabridge_whatsapp::SidecarTransport;

/// How long queued outbound sends may take to finish at shutdown.
const SEND_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything `serve` owns while running.
pub(crate) struct Bridge {
    pub accounts: Vec<Arc<Account>>,
    pub router: Arc<AccountRouter>,
    pub webhooks: Arc<WebhookForwarder>,
    pub media: Arc<MediaStore>,
    pub store: Arc<SqliteCredentialStore>,
    sweeper: Option<JoinHandle<()>>,
}

impl Bridge {
    /// Builds every component. Nothing connects to the sidecar yet.
    pub(crate) async fn build(
        config: &BridgeConfig,
        cancel: &CancellationToken,
    ) -> Result<Self, BridgeError> {
        let store = Arc::new(SqliteCredentialStore::open(&config.storage.database_path).await?);
        info!(path = %config.storage.database_path, "credential store opened");

        let media = Arc::new(MediaStore::new(&config.media, &config.gateway.base_url()).await?);
        let sweeper = media.spawn_sweeper(
            Duration::from_secs(config.media.sweep_interval_secs),
            cancel.clone(),
        );

        let webhooks = Arc::new(WebhookForwarder::from_config(&config.webhook)?);
        let sinks: Vec<Arc<dyn EventSink>> = vec![webhooks.clone()];
        let settings = EngineSettings::from_config(config);

        let mut accounts = Vec::new();
        for account in config.effective_accounts() {
            let transport = Arc::new(SidecarTransport::new(&config.transport, &account.id)?);
            accounts.push(Account::build(&account, AccountDeps {
                transport,
                store: store.clone(),
                sinks: sinks.clone(),
                media: Some(media.clone()),
                settings: settings.clone(),
                shutdown: cancel.clone(),
            }));
        }
        let router = Arc::new(AccountRouter::new(accounts.clone()));

        // Sink selectors can only be resolved once every account exists.
        for sink in &config.webhook.sinks {
            let session = router.resolve_session(sink.account.as_deref())?;
            webhooks.upsert(SinkSpec::from_config(sink, session));
        }

        Ok(Self {
            accounts,
            router,
            webhooks,
            media,
            store,
            sweeper,
        })
    }

    /// Reconnects every account that has stored credentials.
    async fn resume(&self) {
        for account in &self.accounts {
            // Failures are logged by the account; the user can start it over REST.
            let _ = account.resume().await;
        }
    }

    fn gateway_state(&self, config: &BridgeConfig) -> GatewayState {
        GatewayState {
            router: self.router.clone(),
            webhooks: self.webhooks.clone(),
            media: Some(self.media.clone()),
            auth: AuthConfig {
                api_key: config.gateway.api_key.clone(),
            },
            started_at: Instant::now(),
        }
    }

    async fn shutdown(self, flush_timeout: Duration) {
        drain_accounts(&self.accounts, SEND_DRAIN_TIMEOUT).await;
        self.webhooks.shutdown(flush_timeout).await;
        if let Some(sweeper) = self.sweeper {
            let _ = sweeper.await;
        }
        if let Err(e) = self.store.database().checkpoint().await {
            warn!(error = %e, "final WAL checkpoint failed");
        }
    }
}

/// Runs the `wabridge serve` command.
pub async fn run_serve(config: BridgeConfig) -> Result<(), BridgeError> {
    init_tracing(&config.bridge.log_level);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        accounts = config.effective_accounts().len(),
        "starting wabridge"
    );

    if config.gateway.api_key.is_none() {
        warn!("no gateway api_key configured; every authenticated route will answer 401");
    }

    let cancel = install_signal_handler();
    let bridge = Bridge::build(&config, &cancel).await?;
    probe_sidecar(&config).await;
    bridge.resume().await;

    let server_config = ServerConfig::from(&config.gateway);
    let served = start_server(&server_config, bridge.gateway_state(&config), cancel.clone()).await;
    // A bind failure must still stop the account workers.
    cancel.cancel();

    bridge
        .shutdown(Duration::from_secs(config.webhook.flush_timeout_secs))
        .await;
    info!("wabridge shutdown complete");
    served
}

/// Logs whether the protocol sidecar answers. Never fatal: sessions retry.
async fn probe_sidecar(config: &BridgeConfig) {
    let transport = match SidecarTransport::new(&config.transport, "probe") {
        Ok(transport) => transport,
        Err(e) => {
            warn!(error = %e, "cannot build sidecar client");
            return;
        }
    };
    match transport.health_check().await {
        Ok(HealthStatus::Healthy) => info!(url = %config.transport.sidecar_url, "sidecar reachable"),
        Ok(status) => warn!(url = %config.transport.sidecar_url, ?status, "sidecar degraded"),
        Err(e) => warn!(url = %config.transport.sidecar_url, error = %e, "sidecar unreachable"),
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wabridge={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use wabridge_config::{AccountConfig, MediaConfig, WebhookSinkConfig};

    fn config_in(dir: &tempfile::TempDir) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.storage.database_path = dir.path().join("bridge.db").display().to_string();
        config.media = MediaConfig {
            private_dir: dir.path().join("media").display().to_string(),
            ..MediaConfig::default()
        };
        config
    }

    #[tokio::test]
    async fn builds_implied_default_account() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let bridge = Bridge::build(&config_in(&dir), &cancel).await.unwrap();
        assert_eq!(bridge.accounts.len(), 1);
        assert_eq!(bridge.accounts[0].id().0, "default");
        assert!(bridge.webhooks.list().is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn sink_selectors_resolve_against_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.accounts = vec![
            AccountConfig {
                id: "home".into(),
                ..AccountConfig::default()
            },
            AccountConfig {
                id: "office".into(),
                label: Some("Office".into()),
                ..AccountConfig::default()
            },
        ];
        config.webhook.sinks = vec![WebhookSinkConfig {
            id: "crm".into(),
            url: "https://crm.example.com/in".into(),
            token: Some("secret".into()),
            enabled: true,
            account: Some("office".into()),
        }];
        let cancel = CancellationToken::new();
        let bridge = Bridge::build(&config, &cancel).await.unwrap();

        let sinks = bridge.webhooks.list();
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].session_id.as_ref().map(|s| s.0.as_str()), Some("office"));
        cancel.cancel();
    }

    #[tokio::test]
    async fn unknown_sink_account_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.webhook.sinks = vec![WebhookSinkConfig {
            id: "crm".into(),
            url: "https://crm.example.com/in".into(),
            token: None,
            enabled: true,
            account: Some("garage".into()),
        }];
        let cancel = CancellationToken::new();
        let result = Bridge::build(&config, &cancel).await;
        assert!(matches!(result, Err(BridgeError::AccountNotFound { .. })));
        cancel.cancel();
    }
}
