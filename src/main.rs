use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ktron::client::DEFAULT_API_URL;
use ktron::profiles::ProfileSet;
use ktron::recon::{self, Recon};
use ktron::scanner::{self, Scanner};
use ktron::{logging, server};

/// ktron — recon helper that drives nmap through a small local HTTP service.
#[derive(Debug, Parser)]
#[command(name = "ktron", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the scan service.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "KTRON_BIND", default_value = "127.0.0.1:5000")]
        bind: String,

        /// Scanner executable.
        #[arg(long, env = "KTRON_NMAP", default_value = scanner::DEFAULT_PROGRAM)]
        nmap: String,

        /// TOML file with extra scan profiles (overrides built-ins of the same name).
        #[arg(long)]
        profiles: Option<PathBuf>,
    },
    /// Register a target and run basic reconnaissance against it.
    Recon {
        /// Target IP address.
        #[arg(short, long)]
        ip: String,

        /// Target hostname.
        #[arg(short = 'n', long)]
        hostname: String,

        /// Force rerun of all tools.
        #[arg(short, long, default_value_t = false)]
        force: bool,

        /// Directory holding one subdirectory per target.
        #[arg(long, env = "WORKING_DIR")]
        working_dir: Option<PathBuf>,

        /// Base URL of the scan service.
        #[arg(long, env = "KTRON_API_URL", default_value = DEFAULT_API_URL)]
        api_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // WORKING_DIR and friends may come from a .env file
    recon::load_env_file(None);
    let cli = Cli::parse();
    logging::init();

    match cli.command {
        Command::Serve {
            bind,
            nmap,
            profiles,
        } => serve(&bind, nmap, profiles).await,
        Command::Recon {
            ip,
            hostname,
            force,
            working_dir,
            api_url,
        } => {
            recon::display_banner();
            let config = recon::resolve_config(ip, hostname, force, working_dir, api_url)?;
            let mut recon = Recon::init(config)?;
            recon.run().await
        }
    }
}

async fn serve(bind: &str, nmap: String, profiles: Option<PathBuf>) -> Result<()> {
    let profiles = match profiles {
        Some(path) => ProfileSet::load_toml(&path)
            .with_context(|| format!("failed to load profiles from {}", path.display()))?,
        None => ProfileSet::default(),
    };
    for p in profiles.iter() {
        info!(name = %p.name, args = ?p.args, "scan profile");
    }
    if scanner::locate_program(&nmap).is_none() {
        warn!(program = %nmap, "scanner not found; scans will fail until it is installed");
    }

    let shutdown = CancellationToken::new();
    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        on_ctrl_c.cancel();
    });

    server::spawn_server(bind, Scanner::new(nmap, profiles), shutdown).await
}
