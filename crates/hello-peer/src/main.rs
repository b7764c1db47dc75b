//! Reference client peer.
//!
//! Dials the peer named in the config, completes the capabilities
//! exchange and stays connected, logging every watchdog report, until
//! Ctrl-C (which sends a DPR) or the connection goes away.
//!
//! Usage:
//!   diam-hello-peer                       # dial using ./config.toml
//!   diam-hello-peer --address 10.0.0.7:3868
//!   diam-hello-peer config validate
//!   diam-hello-peer config show
//!
//! Env vars:
//!   DIAM_CONFIG   config path (default: "config.toml")
//!   RUST_LOG      log filter (default: "info")

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use diam_domain::config::{Config, ConfigSeverity};
use diam_peer_sdk::{ClientBuilder, DisconnectCause, Settings, StateMachine, TlsCredentials};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "diam-hello-peer", version, about)]
struct Cli {
    /// Config file; missing means built-in defaults.
    #[arg(long)]
    config: Option<String>,

    /// Dial this `host:port` instead of `peer.address`.
    #[arg(long)]
    address: Option<String>,

    /// Log as JSON lines.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Dial and stay connected (default).
    Dial,
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print every issue; exit 1 on errors.
    Validate,
    /// Print the resolved config as TOML.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(|| std::env::var("DIAM_CONFIG").ok())
        .unwrap_or_else(|| "config.toml".into());
    let config = load_config(&config_path)?;

    match cli.command {
        None | Some(Command::Dial) => {
            init_tracing(cli.json);
            run(config, cli.address).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            if !validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        Config::load(path).with_context(|| format!("loading {path}"))
    } else {
        Ok(Config::default())
    }
}

fn validate(config: &Config, path: &str) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("Config OK ({path})");
        return true;
    }
    for issue in &issues {
        println!("{issue}");
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    println!(
        "\n{errors} error(s), {} warning(s) in {path}",
        issues.len() - errors
    );
    errors == 0
}

async fn run(config: Config, address: Option<String>) -> anyhow::Result<()> {
    for issue in config.validate() {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("{issue}"),
            ConfigSeverity::Error => anyhow::bail!("invalid config: {issue}"),
        }
    }

    let settings = Settings::from_config(&config.identity);
    let machine = Arc::new(StateMachine::new(settings));
    let client = ClientBuilder::from_config(&config.client)
        .handler(machine.clone())
        .build()?;

    let address = address.unwrap_or_else(|| config.peer.address.clone());
    let conn = match &config.peer.tls {
        Some(tls) => {
            let creds = TlsCredentials::from_config(tls)?;
            client.dial_tls(&address, &creds).await?
        }
        None => client.dial(&address).await?,
    };

    if let Some(peer) = conn.peer() {
        tracing::info!(
            origin_host = %peer.origin_host,
            origin_realm = %peer.origin_realm,
            product = peer.product_name.as_deref().unwrap_or("-"),
            "connected"
        );
    }

    let mut reports = conn.watchdog_reports();
    let closed = conn.on_close();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, disconnecting");
                if let Err(e) = conn.disconnect(DisconnectCause::Rebooting).await {
                    tracing::warn!(error = %e, "disconnect was not acknowledged");
                }
                return Ok(());
            }
            reason = closed.wait() => {
                tracing::info!(reason = %reason, "connection closed");
                return Ok(());
            }
            changed = reports.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                if let Some(report) = reports.borrow_and_update().clone() {
                    tracing::info!(
                        origin_host = %report.origin_host,
                        at = %report.received_at,
                        "watchdog ok"
                    );
                }
            }
        }
    }
}
