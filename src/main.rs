//! loopcast - Main entry point
//!
//! Drives one looping live broadcast: initializes the slot ring, spawns the
//! playout subprocess, and runs the synchronization engine until the process
//! exits or a termination signal arrives. Alternative modes rebroadcast an
//! existing playlist unchanged or restore the broadcast directories to their
//! idle state.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loopcast::config::Config;
use loopcast::playout::{reset_broadcast, Engine, EngineEvent};
use loopcast::{launcher, watcher};

/// Command-line arguments for loopcast
#[derive(Parser, Debug)]
#[command(name = "loopcast")]
#[command(about = "Gapless looping live broadcast driver")]
#[command(version)]
struct Args {
    /// Broadcast root folder (slots, queue, and filler live under it)
    #[arg(short, long, env = "LOOPCAST_ROOT")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Loop the slot ring to the ingest endpoint
    Stream,

    /// Rebroadcast an existing playlist unchanged
    Restream {
        /// Master playlist location handed to the re-streamer
        playlist: String,
    },

    /// Purge the queue directory and restore every slot from filler
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loopcast=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::resolve(args.root.as_deref()).context("Failed to resolve configuration")?;

    match args.mode {
        Mode::Stream => run_stream(config).await,
        Mode::Restream { playlist } => {
            if playlist.is_empty() {
                anyhow::bail!("please provide the master playlist location");
            }
            run_restream(config, &playlist).await
        }
        Mode::Reset => reset_broadcast(&config)
            .await
            .context("Failed to reset broadcast directories"),
    }
}

/// Run the looping broadcast until the playout process exits or a
/// termination signal arrives.
async fn run_stream(config: Config) -> Result<()> {
    let mut engine = Engine::init(config.clone())
        .await
        .context("Failed to initialize broadcast engine")?;
    let events = engine.event_sender();

    let playout =
        launcher::spawn_playout(&config, events.clone()).context("Failed to spawn playout process")?;
    let watcher = watcher::spawn(
        config.queue_directory.clone(),
        config.queue_stability(),
        config.queue_poll(),
        events,
    );

    let interrupted = tokio::select! {
        res = engine.run() => {
            res.context("Broadcast engine failed")?;
            false
        }
        _ = shutdown_signal() => true,
    };

    if interrupted {
        info!("received termination signal, stopping stream ...");
        playout.detach_output();
        playout.terminate().await?;
    }

    info!("stopping file watcher ...");
    watcher.abort();
    Ok(())
}

/// Rebroadcast an existing playlist, forwarding the re-streamer's output to
/// the log until it exits or a termination signal arrives.
async fn run_restream(config: Config, playlist: &str) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let playout = launcher::spawn_restream(&config, playlist, tx)
        .context("Failed to spawn re-stream process")?;

    let interrupted = loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(EngineEvent::Progress(line)) => info!(target: "loopcast::playout", "{line}"),
                Some(EngineEvent::PlayoutExited { .. }) | None => break false,
                Some(_) => {}
            },
            _ = shutdown_signal() => break true,
        }
    };

    if interrupted {
        info!("received termination signal, stopping re-stream ...");
        playout.detach_output();
        playout.terminate().await?;
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
