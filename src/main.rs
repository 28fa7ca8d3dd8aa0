use std::{net::SocketAddr, path::PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use focuslens::{
    backends::blueprint_from_settings, focus::serve_stdio, serve, settings::SettingsStore,
    utils::logging::init_logging, ServeOptions, WorkerMode,
};

#[derive(Parser, Debug)]
#[command(name = "focuslens", about = "Goal-driven focus classification for browsing sessions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        #[arg(long, env = "FOCUSLENS_BIND", default_value = "127.0.0.1:5000")]
        bind: SocketAddr,
        #[arg(long, env = "FOCUSLENS_DATA_DIR", default_value = ".focuslens")]
        data_dir: PathBuf,
        /// Defaults to `<data-dir>/settings.json`.
        #[arg(long, env = "FOCUSLENS_SETTINGS")]
        settings: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = WorkerMode::Child)]
        worker_mode: WorkerMode,
    },
    /// Host one classification worker over stdin/stdout.
    Worker {
        #[arg(long, allow_hyphen_values = true)]
        goal: String,
        #[arg(long)]
        settings: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            bind,
            data_dir,
            settings,
            worker_mode,
        } => {
            log::info!("focuslens starting up...");
            serve(ServeOptions {
                bind,
                data_dir,
                settings_path: settings,
                worker_mode,
            })
            .await
        }
        Command::Worker { goal, settings } => {
            let snapshot = SettingsStore::new(settings)?.snapshot();
            let outcome = serve_stdio(goal, move || blueprint_from_settings(&snapshot)).await;
            // The stdin reader sits on a blocking thread the runtime would wait for.
            match outcome {
                Ok(()) => std::process::exit(0),
                Err(err) => {
                    log::error!("worker failed: {err:#}");
                    std::process::exit(1)
                }
            }
        }
    }
}
