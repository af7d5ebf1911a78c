use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use arthvidya_core::{FileStore, StateManager};
use arthvidya_sync::{CycleOutcome, GitTransport, SyncConfig, SyncLoop, tracked_files};

#[derive(Parser, Debug)]
#[command(name = "arthvidya-sync", version, about = "Mirror the game exchange documents through git")]
struct Cli {
    /// Config file; only its `[sync]` table is read.
    #[arg(long, default_value = "arthvidya.toml")]
    config: PathBuf,

    /// Git working copy (overrides `sync.repo_dir`).
    #[arg(long)]
    repo_dir: Option<PathBuf>,

    /// Directory holding the JSON documents. Defaults to the repo dir.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the repository if needed and write default documents.
    Init,
    /// Run one stage/commit/push cycle.
    Push,
    /// Pull the remote branch into the working copy.
    Pull,
    /// Show `git status --porcelain`.
    Status,
    /// Push periodically until interrupted.
    Watch,
    /// Set the URL of the configured remote.
    Remote { url: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = SyncConfig::load_from(&cli.config);
    if let Some(dir) = cli.repo_dir {
        config.repo_dir = dir;
    }
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }
    let data_dir = cli.data_dir.unwrap_or_else(|| config.repo_dir.clone());

    let transport = GitTransport::new(&config);
    match transport.version().await {
        Ok(version) => tracing::debug!(%version, "Found git"),
        Err(e) => {
            tracing::error!("git is required but could not be run: {e}");
            return ExitCode::FAILURE;
        },
    }

    let result = match cli.command {
        Command::Init => init(&transport, &data_dir).await,
        Command::Push => push_once(transport, &data_dir, &config).await,
        Command::Pull => arthvidya_sync::sync_loop::pull(&transport)
            .await
            .map_err(|e| e.to_string()),
        Command::Status => transport
            .status()
            .await
            .map(|status| {
                if status.is_empty() {
                    println!("clean");
                } else {
                    print!("{status}");
                }
            })
            .map_err(|e| e.to_string()),
        Command::Watch => {
            watch(transport, &data_dir, &config).await;
            Ok(())
        },
        Command::Remote { url } => transport.set_remote(&url).await.map_err(|e| e.to_string()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        },
    }
}

async fn init(transport: &GitTransport, data_dir: &std::path::Path) -> Result<(), String> {
    transport.ensure_repo().await.map_err(|e| e.to_string())?;
    let store = FileStore::open(data_dir).map_err(|e| e.to_string())?;
    let manager = StateManager::new(Arc::new(store));
    let created = manager.init_files().map_err(|e| e.to_string())?;
    tracing::info!(created = created.len(), dir = %data_dir.display(), "Documents ready");
    Ok(())
}

async fn push_once(
    transport: GitTransport,
    data_dir: &std::path::Path,
    config: &SyncConfig,
) -> Result<(), String> {
    let mut sync = SyncLoop::new(transport, tracked_files(data_dir), config);
    match sync.run_cycle().await {
        CycleOutcome::NothingToSync => {
            println!("nothing to sync");
            Ok(())
        },
        CycleOutcome::Pushed { files } => {
            println!("pushed {files} file(s)");
            Ok(())
        },
        CycleOutcome::Failed { error } => Err(error),
    }
}

async fn watch(transport: GitTransport, data_dir: &std::path::Path, config: &SyncConfig) {
    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after the current cycle");
            stopper.cancel();
        }
    });

    let sync = SyncLoop::new(transport, tracked_files(data_dir), config);
    sync.run(cancel).await;
}
