// autosyncd: watch a repository and keep it committed and pushed.

use std::path::PathBuf;

use anyhow::{bail, Context};
use autosync_common::types::SyncMode;
use autosync_daemon::config::AutosyncConfig;
use autosync_daemon::{start_engine, EngineEvent};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "autosyncd", version, about = "Commit and push a git working tree as files change")]
struct Args {
    /// Repository to manage (defaults to the current directory).
    #[arg(long, short = 'p')]
    path: Option<PathBuf>,

    /// Change detection: `event` or `polling`. Overrides the config file.
    #[arg(long, short = 'm')]
    mode: Option<SyncMode>,

    /// Config file to use instead of the repository/global lookup.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Run a single sync now, print its outcome as JSON, and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let repo = match args.path {
        Some(path) => path,
        None => std::env::current_dir().context("failed to resolve current directory")?,
    };

    let mut config = match &args.config {
        Some(path) => AutosyncConfig::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AutosyncConfig::load(&repo).context("failed to load config")?,
    };
    if let Some(mode) = args.mode {
        config.sync.mode = mode;
    }

    let handle = start_engine(config.into_engine_config(repo))
        .await
        .context("failed to start sync engine")?;

    if args.once {
        let outcome = handle.trigger_manual_sync().await;
        handle.wait().await;
        println!("{}", serde_json::to_string(&outcome).context("failed to encode outcome")?);
        if !outcome.is_success() {
            bail!("sync did not complete: {}", outcome.kind());
        }
        return Ok(());
    }

    let mut events = handle.subscribe();
    info!(repo = %handle.repository().root().display(), "watching for changes, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(EngineEvent::LoopTerminated { reason }) => {
                    handle.wait().await;
                    bail!("sync loop terminated: {reason}");
                }
                Ok(EngineEvent::SyncCompleted { .. }) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event subscriber lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.wait().await;
    Ok(())
}
