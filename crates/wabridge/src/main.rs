// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! wabridge - WhatsApp-Web linked-device bridge.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use wabridge_config::model::BridgeConfig;
use wabridge_core::BridgeError;

/// wabridge - WhatsApp-Web linked-device bridge.
#[derive(Parser, Debug)]
#[command(name = "wabridge", version, about, long_about = None)]
struct Cli {
    /// Configuration file. Without it the XDG lookup hierarchy is used.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bridge: sessions, event pipeline, webhooks and REST gateway.
    Serve,
    /// Show the state of a running bridge.
    Status {
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
        /// Only show this account.
        #[arg(long)]
        account: Option<String>,
    },
    /// Print the effective configuration with secrets redacted.
    Config,
}

fn print_config(config: &BridgeConfig) -> Result<(), BridgeError> {
    let rendered = wabridge_config::to_redacted_toml(config)
        .map_err(|e| BridgeError::Config(format!("failed to render configuration: {e}")))?;
    println!("{rendered}");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => wabridge_config::load_and_validate_path(path),
        None => wabridge_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            wabridge_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Status {
            json,
            plain,
            account,
        }) => {
            let options = status::StatusOptions {
                json,
                plain,
                account,
            };
            status::run_status(&config, &options).await
        }
        Some(Commands::Config) => print_config(&config),
        None => {
            println!("wabridge: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("wabridge: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc supports advancing the epoch.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn status_flags_parse() {
        let cli = Cli::parse_from([
            "wabridge",
            "--config",
            "/tmp/wabridge.toml",
            "status",
            "--json",
            "--account",
            "office",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/wabridge.toml")));
        match cli.command {
            Some(Commands::Status { json, account, .. }) => {
                assert!(json);
                assert_eq!(account.as_deref(), Some("office"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_renders_without_secrets() {
        let mut config = BridgeConfig::default();
        config.gateway.api_key = Some("super-secret".into());
        let rendered = wabridge_config::to_redacted_toml(&config).unwrap();
        assert!(!rendered.contains("super-secret"));
        assert!(print_config(&config).is_ok());
    }
}
