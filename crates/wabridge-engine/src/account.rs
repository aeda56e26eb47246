// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One linked WhatsApp account: its session, pipeline, dispatcher, policy
//! and counters, wired together.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wabridge_config::{AccountConfig, BridgeConfig};
use wabridge_core::{
    AccountIdentity, BridgeError, ConnectionState, CredentialStore, EventSink, SessionId,
    SessionObserver, SessionStatus, Transport,
};
use wabridge_resilience::Backoff;

use crate::dispatcher::{DispatchSettings, OutboundDispatcher};
use crate::media::MediaStore;
use crate::pipeline::{EventPipeline, PipelineSettings, ingress_channel};
use crate::policy::{AccountPolicy, PolicyHandle, PolicyView};
use crate::session::{ReconnectPolicy, SessionManager};
use crate::stats::{AccountStats, StatsSnapshot};

/// Engine tunables shared by every account.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub reconnect: ReconnectPolicy,
    pub pipeline: PipelineSettings,
    pub dispatch: DispatchSettings,
}

impl EngineSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        let session = &config.session;
        Self {
            reconnect: ReconnectPolicy {
                attempts: session.reconnect_attempts,
                backoff: Backoff::from_millis(session.reconnect_base_ms, session.reconnect_max_ms),
                connect_timeout: Duration::from_secs(config.transport.connect_timeout_secs),
            },
            pipeline: PipelineSettings::from_config(config),
            dispatch: DispatchSettings::from_config(config),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

/// Collaborators an account is built from.
pub struct AccountDeps {
    pub transport: Arc<dyn Transport>,
    pub store: Arc<dyn CredentialStore>,
    pub sinks: Vec<Arc<dyn EventSink>>,
    pub media: Option<Arc<MediaStore>>,
    pub settings: EngineSettings,
    pub shutdown: CancellationToken,
}

/// Listing entry for `GET /sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub label: String,
    #[serde(flatten)]
    pub status: SessionStatus,
    pub buffered_events: usize,
    pub pending_sends: usize,
    pub policy: PolicyView,
}

pub struct Account {
    id: SessionId,
    label: String,
    session: Arc<SessionManager>,
    pipeline: Arc<EventPipeline>,
    dispatcher: Arc<OutboundDispatcher>,
    policy: Arc<PolicyHandle>,
    stats: Arc<AccountStats>,
}

impl Account {
    /// Builds the account and spawns its pipeline and dispatcher workers.
    /// The session stays `Unpaired` until [`Account::resume`] or `start()`.
    pub fn build(config: &AccountConfig, deps: AccountDeps) -> Arc<Self> {
        let id = SessionId(config.id.clone());
        let label = config.label.clone().unwrap_or_else(|| config.id.clone());
        let policy = Arc::new(PolicyHandle::new(AccountPolicy::from(config)));
        let stats = Arc::new(AccountStats::new());

        let (ingress_tx, ingress_rx) = ingress_channel();
        let session = Arc::new(SessionManager::new(
            id.clone(),
            deps.transport,
            deps.store,
            deps.settings.reconnect,
            ingress_tx,
            deps.shutdown.clone(),
        ));
        let pipeline = Arc::new(EventPipeline::new(
            label.clone(),
            Arc::clone(&session),
            Arc::clone(&policy),
            Arc::clone(&stats),
            deps.media,
            deps.sinks,
            &ingress_rx,
            deps.settings.pipeline,
        ));
        pipeline.spawn(ingress_rx, deps.shutdown.clone());

        let dispatcher = OutboundDispatcher::start(
            Arc::clone(&session),
            Arc::clone(&policy),
            Arc::clone(&stats),
            deps.settings.dispatch,
            deps.shutdown,
        );

        let dispatch_observer: Arc<dyn SessionObserver> = dispatcher.clone();
        let pipeline_observer: Arc<dyn SessionObserver> = pipeline.clone();
        session.add_observer(dispatch_observer);
        session.add_observer(pipeline_observer);

        info!(session_id = %id, label = %label, "account ready");
        Arc::new(Self {
            id,
            label,
            session,
            pipeline,
            dispatcher,
            policy,
            stats,
        })
    }

    /// Reconnects automatically when credentials from an earlier run exist.
    pub async fn resume(&self) -> Result<(), BridgeError> {
        if !self.session.restore().await? {
            return Ok(());
        }
        match self.session.start().await {
            Ok(state) => {
                info!(session_id = %self.id, state = %state, "resumed stored session");
                Ok(())
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "failed to resume stored session");
                Err(e)
            }
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn pipeline(&self) -> &Arc<EventPipeline> {
        &self.pipeline
    }

    pub fn dispatcher(&self) -> &Arc<OutboundDispatcher> {
        &self.dispatcher
    }

    pub fn policy(&self) -> &Arc<PolicyHandle> {
        &self.policy
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.session.state() == ConnectionState::Connected
    }

    pub fn identity(&self) -> AccountIdentity {
        AccountIdentity {
            session_id: self.id.clone(),
            label: self.label.clone(),
            number: self.session.status().paired_number,
        }
    }

    pub fn view(&self) -> AccountView {
        AccountView {
            label: self.label.clone(),
            status: self.session.status(),
            buffered_events: self.pipeline.len(),
            pending_sends: self.dispatcher.pending(),
            policy: self.policy.view(),
        }
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
