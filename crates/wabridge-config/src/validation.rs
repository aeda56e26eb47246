// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that serde attributes cannot express:
//! bind addresses, URL schemes, bounded retry counts and unique identifiers.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::BridgeConfig;

/// Upper bound on outbound retries, matching the range offered to users.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn is_http_url(url: &str) -> bool {
    let url = url.trim();
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    matches!(rest, Some(host) if !host.is_empty() && !host.starts_with('/'))
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every error instead of failing fast.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.bridge.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "bridge.log_level `{}` must be one of {}",
            config.bridge.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::validation("gateway.host must not be empty"));
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::validation(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            )));
        }
    }

    if config.gateway.port == 0 {
        errors.push(ConfigError::validation("gateway.port must not be 0"));
    }

    if let Some(url) = &config.gateway.public_url
        && !is_http_url(url)
    {
        errors.push(ConfigError::validation(format!(
            "gateway.public_url `{url}` must be an http(s) URL"
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    if !is_http_url(&config.transport.sidecar_url) {
        errors.push(ConfigError::validation(format!(
            "transport.sidecar_url `{}` must be an http(s) URL",
            config.transport.sidecar_url
        )));
    }

    if config.transport.connect_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "transport.connect_timeout_secs must be at least 1",
        ));
    }

    if config.session.reconnect_base_ms == 0
        || config.session.reconnect_base_ms > config.session.reconnect_max_ms
    {
        errors.push(ConfigError::validation(
            "session.reconnect_base_ms must be positive and not exceed session.reconnect_max_ms",
        ));
    }

    if config.pipeline.buffer_capacity == 0 {
        errors.push(ConfigError::validation(
            "pipeline.buffer_capacity must be at least 1",
        ));
    }
    if config.pipeline.buffer_max_age_secs == 0 {
        errors.push(ConfigError::validation(
            "pipeline.buffer_max_age_secs must be at least 1",
        ));
    }

    if config.dispatch.retry_attempts > MAX_RETRY_ATTEMPTS {
        errors.push(ConfigError::validation(format!(
            "dispatch.retry_attempts must be between 0 and {MAX_RETRY_ATTEMPTS}, got {}",
            config.dispatch.retry_attempts
        )));
    }
    if config.dispatch.send_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "dispatch.send_timeout_secs must be at least 1",
        ));
    }
    if config.dispatch.backoff_base_ms > config.dispatch.backoff_max_ms {
        errors.push(ConfigError::validation(
            "dispatch.backoff_base_ms must not exceed dispatch.backoff_max_ms",
        ));
    }

    if config.webhook.max_attempts == 0 {
        errors.push(ConfigError::validation(
            "webhook.max_attempts must be at least 1",
        ));
    }
    if config.webhook.queue_capacity == 0 {
        errors.push(ConfigError::validation(
            "webhook.queue_capacity must be at least 1",
        ));
    }

    let mut sink_ids = HashSet::new();
    for (i, sink) in config.webhook.sinks.iter().enumerate() {
        if sink.id.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "webhook.sinks[{i}].id must not be empty"
            )));
        } else if !sink_ids.insert(sink.id.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate webhook sink id `{}`",
                sink.id
            )));
        }
        if !is_http_url(&sink.url) {
            errors.push(ConfigError::validation(format!(
                "webhook.sinks[{i}].url `{}` must be an http(s) URL",
                sink.url
            )));
        }
    }

    if config.media.folder.is_none() && config.media.ttl_secs == 0 {
        errors.push(ConfigError::validation(
            "media.ttl_secs must be at least 1 when no persistent folder is set",
        ));
    }
    if config.media.sweep_interval_secs == 0 {
        errors.push(ConfigError::validation(
            "media.sweep_interval_secs must be at least 1",
        ));
    }

    let mut account_ids = HashSet::new();
    for (i, account) in config.accounts.iter().enumerate() {
        let id = account.id.trim();
        if id.is_empty() {
            errors.push(ConfigError::validation(format!(
                "accounts[{i}].id must not be empty"
            )));
        } else if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            errors.push(ConfigError::validation(format!(
                "accounts[{i}].id `{id}` may only contain letters, digits, `-` and `_`"
            )));
        } else if !account_ids.insert(id) {
            errors.push(ConfigError::validation(format!(
                "duplicate account id `{id}` in [[accounts]]"
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
