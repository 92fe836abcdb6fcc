//! serverbot controller agent
//!
//! Runs next to the game server binary: supervises the server process and
//! serves the relay over an authenticated localhost IPC channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sb_controller::{Dispatcher, IpcListener, Supervisor};
use sb_core::auth;
use sb_core::config::{self, BackendProfile, ControllerConfig, SECRET_ENV};
use sb_core::ConnectionSlot;

#[derive(Parser)]
#[command(name = "sb-controller")]
#[command(about = "serverbot controller agent - supervises a game server for the chat relay")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Shared secret (overrides the config file)
    #[arg(long, env = SECRET_ENV, hide_env_values = true)]
    secret: Option<String>,

    /// Address to listen on (e.g. 127.0.0.1:7700)
    #[arg(short, long)]
    listen: Option<String>,

    /// Use a built-in backend profile (minecraft, terraria)
    #[arg(short, long)]
    preset: Option<String>,

    /// Working directory of the game server (with --preset)
    #[arg(short, long)]
    workdir: Option<PathBuf>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Print a new random shared secret and exit
    GenSecret {
        /// Also store the secret in this controller config file
        #[arg(long, value_name = "PATH")]
        write: Option<PathBuf>,
    },
}

/// Set `secret` in the controller config at `path`, creating it if needed
fn store_secret(path: &Path, secret: &str) -> Result<()> {
    let mut config: ControllerConfig = if path.exists() {
        config::load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?
    } else {
        ControllerConfig::default()
    };
    config.secret = secret.to_string();
    config::save_config(path, &config)
        .with_context(|| format!("Failed to write config to {:?}", path))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(Command::GenSecret { write }) = args.command {
        let secret = auth::generate_secret();
        if let Some(path) = write {
            store_secret(&path, &secret)?;
            eprintln!("Secret stored in {:?}", path);
        }
        println!("{}", secret);
        return Ok(());
    }

    // Initialize logging
    let log_level = if args.foreground {
        "debug"
    } else {
        &args.log_level
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("serverbot controller starting...");

    // Load configuration
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config::default_config_dir().join("controller.toml"));

    let mut config: ControllerConfig = if config_path.exists() {
        config::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        tracing::debug!("No config at {:?}, using defaults", config_path);
        ControllerConfig::default()
    };

    // Apply command-line overrides
    if let Some(secret) = args.secret {
        config.secret = secret;
    }
    if let Some(listen) = args.listen {
        config.listen_address = listen;
    }
    if let Some(preset) = args.preset {
        let workdir = args
            .workdir
            .clone()
            .unwrap_or_else(|| config.backend.working_dir.clone());
        config.backend = BackendProfile::preset(&preset, workdir)
            .ok_or_else(|| anyhow::anyhow!("Unknown preset {:?} (try minecraft or terraria)", preset))?;
    } else if let Some(workdir) = args.workdir {
        config.backend.working_dir = workdir;
    }

    config.validate().context("Invalid controller configuration")?;

    tracing::info!(
        "Supervising {} server in {:?}",
        config.backend.name,
        config.backend.working_dir
    );

    let shutdown = CancellationToken::new();
    let slot = Arc::new(ConnectionSlot::with_send_timeout(config.send_timeout));
    let supervisor = Arc::new(
        Supervisor::new(&config, Arc::clone(&slot), shutdown.clone())
            .context("Invalid backend profile")?,
    );
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&supervisor), &config.backend));
    let listener = IpcListener::new(&config, dispatcher, slot, shutdown.clone());

    // Ctrl-C cancels every loop; the supervisor then stops the server
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl-C, shutting down...");
                signal_token.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let result = listener.run().await;
    shutdown.cancel();
    supervisor.shutdown().await;

    tracing::info!("serverbot controller stopped");
    result
}
