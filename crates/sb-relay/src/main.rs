//! serverbot relay client
//!
//! Console front end: reads `!<prefix> <command>` lines from stdin,
//! forwards them to the controller agents and prints what comes back.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sb_core::config::{self, RelayBackend, RelayConfig, SECRET_ENV};
use sb_relay::{CommandRouter, ConsoleSink, RelayClient, RouteOutcome};

#[derive(Parser)]
#[command(name = "sb-relay")]
#[command(about = "serverbot relay - forwards chat commands to controller agents")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Shared secret (overrides the config file)
    #[arg(long, env = SECRET_ENV, hide_env_values = true)]
    secret: Option<String>,

    /// Controller to dial as NAME:PREFIX:HOST:PORT (replaces configured backends)
    #[arg(short, long)]
    backend: Vec<String>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn parse_backend(value: &str) -> Result<RelayBackend> {
    let mut parts = value.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(prefix), Some(address)) if !address.is_empty() => Ok(RelayBackend {
            name: name.to_string(),
            prefix: prefix.to_string(),
            address: address.to_string(),
        }),
        _ => anyhow::bail!("Invalid backend {:?}, expected NAME:PREFIX:HOST:PORT", value),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr, so stdout stays the chat transcript)
    let log_level = if args.foreground {
        "debug"
    } else {
        &args.log_level
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config::default_config_dir().join("relay.toml"));

    let mut config: RelayConfig = if config_path.exists() {
        config::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        tracing::debug!("No config at {:?}, using defaults", config_path);
        RelayConfig::default()
    };

    // Apply command-line overrides
    if let Some(secret) = args.secret {
        config.secret = secret;
    }
    if !args.backend.is_empty() {
        config.backends = args
            .backend
            .iter()
            .map(|value| parse_backend(value))
            .collect::<Result<_>>()?;
    }

    config.validate().context("Invalid relay configuration")?;

    let shutdown = CancellationToken::new();
    let mut router = CommandRouter::new();
    let mut tasks = Vec::new();

    for backend in &config.backends {
        let sink = Arc::new(ConsoleSink::new(backend.prefix.clone()));
        let client = Arc::new(RelayClient::new(&config, backend.clone(), sink));
        router.register(Arc::clone(&client));

        let token = shutdown.child_token();
        tasks.push(tokio::spawn(async move { client.run(token).await }));
    }

    println!("{}", router.help_text());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, shutting down...");
                break;
            }
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };

        let Some(line) = line else {
            break;
        };

        match router.handle(&line).await {
            RouteOutcome::Help(text) => println!("{}", text),
            RouteOutcome::Forwarded(prefix) => tracing::debug!("Forwarded to {}", prefix),
            RouteOutcome::SendFailed(_) | RouteOutcome::Ignored => {}
        }
    }

    shutdown.cancel();
    for task in tasks {
        let _ = task.await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend() {
        let backend = parse_backend("Minecraft:mc:127.0.0.1:7700").unwrap();
        assert_eq!(backend.name, "Minecraft");
        assert_eq!(backend.prefix, "mc");
        assert_eq!(backend.address, "127.0.0.1:7700");

        assert!(parse_backend("Minecraft:mc").is_err());
        assert!(parse_backend("Minecraft:mc:").is_err());
    }
}
