// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `wabridge status` command implementation.
//!
//! Asks a running bridge for its health, per-account session state and
//! message counters. Falls back gracefully when the bridge is not running.

use std::io::IsTerminal;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wabridge_config::model::BridgeConfig;
use wabridge_core::BridgeError;

#[derive(Debug, Clone, Default)]
pub struct StatusOptions {
    pub json: bool,
    pub plain: bool,
    pub account: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
}

/// One account row as reported by `GET /stats`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountLine {
    pub session_id: String,
    pub label: String,
    pub state: String,
    pub sent: u64,
    pub received: u64,
    pub failed: u64,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    accounts: Vec<AccountLine>,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub running: bool,
    pub endpoint: String,
    pub version: Option<String>,
    pub uptime_secs: Option<u64>,
    pub uptime_human: Option<String>,
    pub accounts: Vec<AccountLine>,
    /// Set when the bridge answered but refused the detailed queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_error: Option<String>,
}

/// Format seconds into a human-readable duration string.
fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

fn endpoint(config: &BridgeConfig) -> String {
    // A wildcard bind address is reachable through loopback.
    let host = match config.gateway.host.as_str() {
        "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
        host => host,
    };
    format!("http://{host}:{}", config.gateway.port)
}

fn matches_selector(line: &AccountLine, selector: Option<&str>) -> bool {
    match selector {
        None => true,
        Some(selector) => {
            line.session_id == selector || line.label.eq_ignore_ascii_case(selector)
        }
    }
}

async fn fetch_accounts(
    client: &reqwest::Client,
    base: &str,
    api_key: Option<&str>,
) -> Result<Vec<AccountLine>, String> {
    let mut request = client.get(format!("{base}/stats"));
    if let Some(key) = api_key {
        request = request.header("x-auth-token", key);
    }
    let resp = request.send().await.map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        let reason = body["error"].as_str().unwrap_or("request failed").to_string();
        return Err(format!("{status}: {reason}"));
    }
    let stats: StatsResponse = resp.json().await.map_err(|e| e.to_string())?;
    Ok(stats.accounts)
}

/// Collects the report without printing it.
pub async fn collect(
    config: &BridgeConfig,
    options: &StatusOptions,
) -> Result<StatusReport, BridgeError> {
    let base = endpoint(config);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| BridgeError::Internal(format!("failed to create HTTP client: {e}")))?;

    let health = match client.get(format!("{base}/health")).send().await {
        Ok(resp) if resp.status().is_success() => resp.json::<HealthResponse>().await.ok(),
        _ => None,
    };
    let Some(health) = health else {
        return Ok(StatusReport {
            running: false,
            endpoint: base,
            version: None,
            uptime_secs: None,
            uptime_human: None,
            accounts: Vec::new(),
            detail_error: None,
        });
    };

    let (accounts, detail_error) =
        match fetch_accounts(&client, &base, config.gateway.api_key.as_deref()).await {
            Ok(accounts) => (
                accounts
                    .into_iter()
                    .filter(|line| matches_selector(line, options.account.as_deref()))
                    .collect(),
                None,
            ),
            Err(e) => (Vec::new(), Some(e)),
        };

    Ok(StatusReport {
        running: health.status == "ok",
        endpoint: base,
        version: Some(health.version),
        uptime_secs: Some(health.uptime_secs),
        uptime_human: Some(format_uptime(health.uptime_secs)),
        accounts,
        detail_error,
    })
}

/// Runs the `wabridge status` command.
///
/// `--json` prints the report for scripting; `--plain` or a non-TTY stdout
/// disables colors.
pub async fn run_status(config: &BridgeConfig, options: &StatusOptions) -> Result<(), BridgeError> {
    let report = collect(config, options).await?;
    if options.json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| BridgeError::Internal(format!("failed to render status: {e}")))?;
        println!("{rendered}");
    } else {
        let use_color = !options.plain && std::io::stdout().is_terminal();
        print_report(&report, use_color);
    }
    Ok(())
}

fn print_report(report: &StatusReport, use_color: bool) {
    use colored::Colorize;

    println!();
    println!("  wabridge status");
    println!("  {}", "-".repeat(35));

    if !report.running {
        if use_color {
            println!("    State:    {} {}", "✗".red(), "not running".red());
        } else {
            println!("    State:    [FAIL] not running");
        }
        println!("    Endpoint: {}/health", report.endpoint);
        println!();
        println!("  Start with: wabridge serve");
        println!();
        return;
    }

    let uptime = report.uptime_human.as_deref().unwrap_or("?");
    let version = report.version.as_deref().unwrap_or("?");
    if use_color {
        println!("    State:    {} {} (v{version}, uptime: {uptime})", "✓".green(), "running".green());
    } else {
        println!("    State:    [OK] running (v{version}, uptime: {uptime})");
    }

    if let Some(error) = &report.detail_error {
        println!("    Accounts: unavailable ({error})");
        println!();
        return;
    }

    for line in &report.accounts {
        let state = if use_color {
            match line.state.as_str() {
                "connected" => line.state.green().to_string(),
                "pairing" | "disconnected" => line.state.yellow().to_string(),
                _ => line.state.red().to_string(),
            }
        } else {
            line.state.clone()
        };
        println!(
            "    {:<12} {:<14} sent {:>5}  received {:>5}  failed {:>4}  ({})",
            line.session_id, state, line.sent, line.received, line.failed, line.label
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, label: &str) -> AccountLine {
        AccountLine {
            session_id: id.into(),
            label: label.into(),
            state: "connected".into(),
            sent: 1,
            received: 2,
            failed: 0,
        }
    }

    #[test]
    fn format_uptime_minutes() {
        assert_eq!(format_uptime(120), "2m");
    }

    #[test]
    fn format_uptime_hours() {
        assert_eq!(format_uptime(3720), "1h 2m");
    }

    #[test]
    fn format_uptime_days() {
        assert_eq!(format_uptime(90060), "1d 1h 1m");
    }

    #[test]
    fn wildcard_bind_is_queried_on_loopback() {
        let mut config = BridgeConfig::default();
        config.gateway.host = "0.0.0.0".into();
        config.gateway.port = 8066;
        assert_eq!(endpoint(&config), "http://127.0.0.1:8066");
        config.gateway.host = "10.1.2.3".into();
        assert_eq!(endpoint(&config), "http://10.1.2.3:8066");
    }

    #[test]
    fn account_filter_matches_id_or_label() {
        let office = line("office", "Office");
        assert!(matches_selector(&office, None));
        assert!(matches_selector(&office, Some("office")));
        assert!(matches_selector(&office, Some("OFFICE")));
        assert!(!matches_selector(&office, Some("home")));
    }

    #[test]
    fn offline_report_serializes() {
        let report = StatusReport {
            running: false,
            endpoint: "http://127.0.0.1:8066".into(),
            version: None,
            uptime_secs: None,
            uptime_human: None,
            accounts: Vec::new(),
            detail_error: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"running\":false"));
        assert!(!json.contains("detail_error"));
    }

    fn config_for(server: &wiremock::MockServer) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.gateway.host = "127.0.0.1".into();
        config.gateway.port = server.address().port();
        config.gateway.api_key = Some("key".into());
        config
    }

    #[tokio::test]
    async fn collects_accounts_from_running_bridge() {
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok", "version": "0.1.0", "uptime_secs": 3720
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/stats"))
            .and(header("x-auth-token", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "version": "0.1.0",
                "uptime_secs": 3720,
                "totals": {"sent": 1, "received": 2, "failed": 0},
                "accounts": [
                    {"session_id": "home", "label": "Home", "state": "connected",
                     "sent": 1, "received": 2, "failed": 0, "last_sent": null},
                    {"session_id": "office", "label": "Office", "state": "pairing",
                     "sent": 0, "received": 0, "failed": 0}
                ]
            })))
            .mount(&server)
            .await;

        let options = StatusOptions {
            account: Some("office".into()),
            ..StatusOptions::default()
        };
        let report = collect(&config_for(&server), &options).await.unwrap();
        assert!(report.running);
        assert_eq!(report.uptime_human.as_deref(), Some("1h 2m"));
        assert_eq!(report.accounts.len(), 1);
        assert_eq!(report.accounts[0].state, "pairing");
    }

    #[tokio::test]
    async fn rejected_token_is_reported_not_fatal() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok", "version": "0.1.0", "uptime_secs": 5
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/stats"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "missing or invalid X-Auth-Token", "code": "unauthorized"
            })))
            .mount(&server)
            .await;

        let report = collect(&config_for(&server), &StatusOptions::default())
            .await
            .unwrap();
        assert!(report.running);
        assert!(report.detail_error.unwrap().contains("missing or invalid"));
    }
}
