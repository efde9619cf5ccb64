mod app;
mod config_cmd;
mod history_cmd;
mod process_cmd;
mod serve_cmd;
mod status_cmd;
mod terminal_output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use visiongrab_config::{config_dir, load_and_prepare, settings_file_path};
use visiongrab_core::BackendKind;

use app::{log_dir, App};
use config_cmd::ConfigCommands;
use history_cmd::HistoryCommands;

#[derive(Parser)]
#[command(name = "visiongrab")]
#[command(about = "VisionGrab: screen text extraction through local, cloud, remote or relay backends")]
#[command(version)]
struct Cli {
    /// Settings directory (defaults to $VISIONGRAB_CONFIG_DIR or ~/.visiongrab)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start default services and, if enabled, the relay server; run until Ctrl-C
    Serve {
        /// Override relay.serverPort
        #[arg(short, long)]
        port: Option<String>,
        /// Start the relay server even if relay.serverEnabled is off
        #[arg(long)]
        relay: bool,
    },
    /// Extract text from an image file with the selected backend
    Process {
        image: PathBuf,
        /// local, cloud, remote or relay; defaults to defaultBackend
        #[arg(short, long)]
        backend: Option<BackendKind>,
        /// Instruction sent with the image; defaults to customPrompt
        #[arg(short = 'P', long)]
        prompt: Option<String>,
    },
    /// List or manage recorded results
    History {
        #[command(subcommand)]
        command: Option<HistoryCommands>,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Probe a relay server's liveness endpoint
    Status {
        /// Relay address; defaults to relay.clientAddress
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Inspect the settings file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let dir = cli.config_dir.unwrap_or_else(config_dir);

    // Settings are loaded once before logging so the level and directory apply.
    let settings = load_and_prepare(&settings_file_path(&dir)).await?;
    let level = settings.logging.level.clone().unwrap_or_else(|| "info".to_string());
    visiongrab_logging::init_logger(log_dir(&dir, &settings), &level);

    match cli.command {
        Commands::Config { command } => config_cmd::run(&dir, &settings, command).await,
        Commands::Status { address } => {
            let address = address.unwrap_or_else(|| settings.relay.client_address.clone());
            status_cmd::run(&address).await
        }
        Commands::Serve { port, relay } => {
            let app = App::build(&dir, settings)?;
            serve_cmd::run(&app, port, relay).await
        }
        Commands::Process {
            image,
            backend,
            prompt,
        } => {
            let app = App::build(&dir, settings)?;
            process_cmd::run(&app, &image, backend, prompt).await
        }
        Commands::History { command, limit } => {
            let app = App::build(&dir, settings)?;
            history_cmd::run(&app, command, limit)
        }
    }
}
