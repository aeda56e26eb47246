// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the wabridge bridge.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Deserializer, Serialize};

/// Top-level bridge configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Process-wide settings.
    #[serde(default)]
    pub bridge: BridgeSection,

    /// REST gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Credential storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Protocol sidecar connection settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Session lifecycle settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Inbound event pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Outbound dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Webhook forwarding settings and sinks.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Media store settings.
    #[serde(default)]
    pub media: MediaConfig,

    /// Linked WhatsApp accounts. Empty means a single `default` account.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

impl BridgeConfig {
    /// The configured accounts, or the implied single `default` account.
    pub fn effective_accounts(&self) -> Vec<AccountConfig> {
        if self.accounts.is_empty() {
            vec![AccountConfig::default()]
        } else {
            self.accounts.clone()
        }
    }

    /// A copy with every secret replaced, safe to print.
    pub fn redacted(&self) -> Self {
        const REDACTED: &str = "[redacted]";
        let mut copy = self.clone();
        if copy.gateway.api_key.is_some() {
            copy.gateway.api_key = Some(REDACTED.into());
        }
        if copy.transport.api_key.is_some() {
            copy.transport.api_key = Some(REDACTED.into());
        }
        for sink in &mut copy.webhook.sinks {
            if sink.token.is_some() {
                sink.token = Some(REDACTED.into());
            }
        }
        copy
    }
}

/// Process-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeSection {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log raw inbound protocol payloads at debug level.
    #[serde(default)]
    pub debug_payloads: bool,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            debug_payloads: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// REST gateway configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Address to bind the HTTP server to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret expected in the `X-Auth-Token` header.
    /// `None` rejects every authenticated request.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Externally reachable base URL, used to build media URLs.
    /// Defaults to `http://<host>:<port>`.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("public_url", &self.public_url)
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: None,
            public_url: None,
        }
    }
}

impl GatewayConfig {
    pub fn base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8066
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database holding session credentials.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("wabridge"))
        .unwrap_or_else(|| std::path::PathBuf::from(".wabridge"))
}

fn default_database_path() -> String {
    default_data_dir().join("wabridge.db").display().to_string()
}

/// Protocol sidecar configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Base URL of the sidecar that owns the WhatsApp-Web socket.
    #[serde(default = "default_sidecar_url")]
    pub sidecar_url: String,

    /// API key sent to the sidecar in the `apikey` header.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Timeout for individual sidecar HTTP calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Upper bound for opening the sidecar event socket, upgrade included.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("sidecar_url", &self.sidecar_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            sidecar_url: default_sidecar_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_sidecar_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    20
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Automatic reconnect attempts before reporting a persistent failure.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Initial reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    /// Upper bound for the reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

fn default_reconnect_attempts() -> u32 {
    10
}

fn default_reconnect_base_ms() -> u64 {
    1_000
}

fn default_reconnect_max_ms() -> u64 {
    60_000
}

/// Inbound event pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Maximum number of events retained per session.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Maximum age of retained events in seconds.
    #[serde(default = "default_buffer_max_age_secs")]
    pub buffer_max_age_secs: u64,

    /// Number of recent message ids remembered for deduplication.
    /// Never smaller than `buffer_capacity`.
    #[serde(default = "default_dedup_window")]
    pub dedup_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            buffer_max_age_secs: default_buffer_max_age_secs(),
            dedup_window: default_dedup_window(),
        }
    }
}

fn default_buffer_capacity() -> usize {
    1_000
}

fn default_buffer_max_age_secs() -> u64 {
    86_400
}

fn default_dedup_window() -> usize {
    4_096
}

/// Outbound dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Retries after the first attempt (total attempts = retry_attempts + 1).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Per-attempt timeout waiting for the protocol ack.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Initial retry delay in milliseconds.
    #[serde(default = "default_dispatch_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for the retry delay in milliseconds.
    #[serde(default = "default_dispatch_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// How long terminal send records stay queryable.
    #[serde(default = "default_result_retention_secs")]
    pub result_retention_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            send_timeout_secs: default_send_timeout_secs(),
            backoff_base_ms: default_dispatch_backoff_base_ms(),
            backoff_max_ms: default_dispatch_backoff_max_ms(),
            result_retention_secs: default_result_retention_secs(),
        }
    }
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_send_timeout_secs() -> u64 {
    60
}

fn default_dispatch_backoff_base_ms() -> u64 {
    500
}

fn default_dispatch_backoff_max_ms() -> u64 {
    30_000
}

fn default_result_retention_secs() -> u64 {
    300
}

/// Webhook forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Total delivery attempts per event and sink.
    #[serde(default = "default_webhook_max_attempts")]
    pub max_attempts: u32,

    /// HTTP timeout per delivery attempt.
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_webhook_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_webhook_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Per-sink queue size. Events beyond it are dropped for that sink.
    #[serde(default = "default_webhook_queue_capacity")]
    pub queue_capacity: usize,

    /// Upper bound on waiting for pending deliveries during reset and shutdown.
    #[serde(default = "default_flush_timeout_secs")]
    pub flush_timeout_secs: u64,

    /// Statically configured sinks.
    #[serde(default)]
    pub sinks: Vec<WebhookSinkConfig>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_webhook_max_attempts(),
            timeout_secs: default_webhook_timeout_secs(),
            backoff_base_ms: default_webhook_backoff_base_ms(),
            backoff_max_ms: default_webhook_backoff_max_ms(),
            queue_capacity: default_webhook_queue_capacity(),
            flush_timeout_secs: default_flush_timeout_secs(),
            sinks: Vec::new(),
        }
    }
}

fn default_webhook_max_attempts() -> u32 {
    5
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

fn default_webhook_backoff_base_ms() -> u64 {
    1_000
}

fn default_webhook_backoff_max_ms() -> u64 {
    30_000
}

fn default_webhook_queue_capacity() -> usize {
    1_024
}

fn default_flush_timeout_secs() -> u64 {
    5
}

/// A webhook sink.
#[derive(Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WebhookSinkConfig {
    /// Unique sink identifier.
    pub id: String,

    /// Destination URL receiving `POST` requests.
    pub url: String,

    /// Shared secret sent as `X-Webhook-Token` and used as the HMAC key.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Account selector. `None` receives events from every account.
    #[serde(default)]
    pub account: Option<String>,
}

impl std::fmt::Debug for WebhookSinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSinkConfig")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .field("enabled", &self.enabled)
            .field("account", &self.account)
            .finish()
    }
}

fn default_true() -> bool {
    true
}

/// Media store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    /// Persistent media folder. When set, files are never swept.
    #[serde(default)]
    pub folder: Option<String>,

    /// Private directory used when no persistent folder is configured.
    #[serde(default = "default_private_dir")]
    pub private_dir: String,

    /// Retention for files in the private directory.
    #[serde(default = "default_media_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Timeout for downloading one attachment from the transport.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            folder: None,
            private_dir: default_private_dir(),
            ttl_secs: default_media_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

fn default_private_dir() -> String {
    default_data_dir().join("media").display().to_string()
}

fn default_media_ttl_secs() -> u64 {
    86_400
}

fn default_sweep_interval_secs() -> u64 {
    3_600
}

fn default_download_timeout_secs() -> u64 {
    60
}

/// One linked WhatsApp account.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    /// Stable session id. Also the sidecar instance name.
    #[serde(default = "default_account_id")]
    pub id: String,

    /// Human-readable label used for routing.
    #[serde(default)]
    pub label: Option<String>,

    /// Allowed sender numbers or group ids. Accepts a list or a
    /// comma-separated string. Empty allows everyone.
    #[serde(default, deserialize_with = "deserialize_whitelist")]
    pub whitelist: Vec<String>,

    /// Drop events sent from this account's own device.
    #[serde(default = "default_true")]
    pub ignore_self_messages: bool,

    /// Mark buffered inbound messages as read.
    #[serde(default = "default_true")]
    pub mark_as_read: bool,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            id: default_account_id(),
            label: None,
            whitelist: Vec::new(),
            ignore_self_messages: true,
            mark_as_read: true,
        }
    }
}

fn default_account_id() -> String {
    "default".to_string()
}

/// Splits a comma-separated whitelist into trimmed, non-empty entries.
pub fn split_whitelist(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn deserialize_whitelist<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Csv(String),
        List(Vec<String>),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Csv(s) => split_whitelist(&s),
        Raw::List(items) => items
            .iter()
            .flat_map(|item| split_whitelist(item))
            .collect(),
    })
}
