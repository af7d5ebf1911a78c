use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use arthvidya_core::{FileStore, StateManager};
use arthvidya_dashboard::auth::DigestAuthenticator;
use arthvidya_dashboard::config::{CONFIG_FILE, DashboardConfig};
use arthvidya_dashboard::state::AppState;
use arthvidya_dashboard::{build_app, spawn_housekeeping, spawn_sync_loop};
use arthvidya_sync::GitTransport;

#[derive(Parser, Debug)]
#[command(name = "arthvidya-dashboard", version, about = "Arthvidya game dashboard host")]
struct Cli {
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the digest of a role secret for `auth.mode = "digest"`.
    HashSecret {
        secret: String,
        /// Defaults to ARTHVIDYA_PEPPER / auth.pepper.
        #[arg(long)]
        pepper: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = DashboardConfig::load_from(&cli.config);

    if let Some(Command::HashSecret { secret, pepper }) = cli.command {
        let Some(pepper) = pepper.or(config.auth.pepper).filter(|p| !p.is_empty()) else {
            tracing::error!("No pepper given (--pepper, ARTHVIDYA_PEPPER or auth.pepper)");
            return ExitCode::FAILURE;
        };
        return match DigestAuthenticator::digest(&pepper, &secret) {
            Some(digest) => {
                println!("{digest}");
                ExitCode::SUCCESS
            },
            None => ExitCode::FAILURE,
        };
    }

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    match serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        },
    }
}

async fn serve(config: DashboardConfig) -> Result<(), String> {
    let store = FileStore::open(&config.data_dir).map_err(|e| e.to_string())?;
    let manager = StateManager::new(Arc::new(store));
    let created = manager.init_files().map_err(|e| e.to_string())?;
    tracing::info!(
        dir = %config.data_dir.display(),
        created = created.len(),
        "Exchange documents ready"
    );

    let cancel = CancellationToken::new();
    let mut sync_task = None;
    let mut state = AppState::new(config.clone(), manager).map_err(|e| e.to_string())?;

    if config.sync.enabled {
        let version = GitTransport::new(&config.sync)
            .version()
            .await
            .map_err(|e| format!("sync is enabled but git could not be run: {e}"))?;
        tracing::info!(%version, "Starting sync loop");
        let (handle, status) = spawn_sync_loop(&config.sync, &config.data_dir, cancel.clone());
        state = state.with_sync_status(status);
        sync_task = Some(handle);
    }

    let housekeeping = spawn_housekeeping(
        state.clone(),
        Duration::from_secs(config.limits.housekeeping_interval_secs),
        cancel.clone(),
    );
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {e}", config.listen_addr))?;
    tracing::info!("Arthvidya dashboard listening on {}", config.listen_addr);

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down");
            }
            shutdown.cancel();
        })
        .await
        .map_err(|e| format!("Server error: {e}"))?;

    cancel.cancel();
    let _ = housekeeping.await;
    if let Some(handle) = sync_task {
        match handle.await {
            Ok(status) => tracing::info!(pushes = status.pushes, "Sync loop finished"),
            Err(e) => tracing::warn!("Sync task ended abnormally: {e}"),
        }
    }
    Ok(())
}
