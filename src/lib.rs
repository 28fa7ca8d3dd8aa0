pub mod backends;
pub mod db;
pub mod focus;
pub mod server;
pub mod session;
pub mod settings;
pub mod utils;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::ValueEnum;
use log::info;
use tokio::net::TcpListener;

use backends::blueprint_from_settings;
use db::Database;
use focus::{ChildProcessLauncher, FocusManager, InProcessLauncher, ManagerTimeouts, WorkerLauncher};
use server::{create_router, AppState};
use session::SessionController;
use settings::SettingsStore;

/// Where the classification worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WorkerMode {
    /// A separate `focuslens worker` process.
    Child,
    /// A task inside the server process.
    Inline,
}

#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub settings_path: Option<PathBuf>,
    pub worker_mode: WorkerMode,
}

impl ServeOptions {
    fn settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("settings.json"))
    }
}

fn build_launcher(mode: WorkerMode, settings: &Arc<SettingsStore>) -> Result<Arc<dyn WorkerLauncher>> {
    Ok(match mode {
        WorkerMode::Child => Arc::new(ChildProcessLauncher::current_exe(
            settings.path().to_path_buf(),
        )?),
        WorkerMode::Inline => {
            let store = Arc::clone(settings);
            Arc::new(InProcessLauncher::new(move || {
                blueprint_from_settings(&store.snapshot())
            }))
        }
    })
}

/// Opens storage, wires the engine and serves the HTTP API until Ctrl-C.
pub async fn serve(options: ServeOptions) -> Result<()> {
    std::fs::create_dir_all(&options.data_dir).with_context(|| {
        format!("failed to create data directory {}", options.data_dir.display())
    })?;

    let settings = Arc::new(SettingsStore::new(options.settings_path())?);
    // The child worker reads settings from disk, so make sure the file exists.
    settings.flush()?;

    let database = Database::new(options.data_dir.join("focuslens.sqlite3"))?;

    let engine = settings.engine();
    let manager = Arc::new(FocusManager::new(
        build_launcher(options.worker_mode, &settings)?,
        ManagerTimeouts {
            startup: engine.startup_timeout(),
            request: engine.request_timeout(),
        },
    ));

    let sessions = SessionController::new(database, Arc::clone(&manager));
    sessions.recover().await?;

    let app = create_router(AppState::new(sessions, settings));
    let listener = TcpListener::bind(options.bind)
        .await
        .with_context(|| format!("failed to bind {}", options.bind))?;
    info!(
        "focuslens listening on {} ({:?} worker)",
        options.bind, options.worker_mode
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    manager.stop().await;
    info!("focuslens stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}
