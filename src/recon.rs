//! The `recon` command: register a target, ask the scan service for a quick
//! scan and keep what comes back in the target's document store.
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tracing::{debug, error, info};

use crate::client::ApiClient;
use crate::scanner::{locate_program, validate_target};
use crate::store::DocumentStore;
use crate::types::{OpenPort, TargetInfo, TargetRecord};

pub const QUICK_SCAN: &str = "quick_scan";

/// Helper programs the recon steps rely on, with install hints.
pub const REQUIRED_TOOLS: &[(&str, &[&str])] = &[
    (
        "nmap",
        &[
            "For Ubuntu/Debian/Kali: sudo apt-get install nmap",
            "For Fedora: sudo dnf install nmap",
            "For Arch Linux: sudo pacman -S nmap",
        ],
    ),
    (
        "terminator",
        &[
            "For Ubuntu/Debian: sudo apt-get install terminator",
            "For Fedora: sudo dnf install terminator",
            "For Arch Linux: sudo pacman -S terminator",
        ],
    ),
    (
        "gobuster",
        &[
            "For Ubuntu/Debian/Kali: sudo apt-get install gobuster",
            "For Fedora: sudo dnf install gobuster",
            "For Arch Linux: sudo pacman -S gobuster",
        ],
    ),
];

const BANNER: &str = r"
     _     _ _______ ______ _______ _______
    (_)   | (_______|_____ (_______|_______)
     _____| |   _    _____) )     _ _     _
    |  _   _)  | |  |  __  / |   | | |   | |
    | |  \ \   | |  | |  \ \ |___| | |   | |
    |_|   \_)  |_|  |_|   |_\_____/|_|   |_|

                   Recon Tool
";

#[derive(Debug, Clone)]
pub struct ReconConfig {
    pub ip: String,
    pub hostname: String,
    pub force: bool,
    pub working_dir: PathBuf,
    pub api_url: String,
}

impl ReconConfig {
    pub fn target_info(&self) -> TargetInfo {
        TargetInfo {
            working_dir: self.working_dir.clone(),
            hostname: self.hostname.clone(),
            ip: self.ip.clone(),
            force: self.force,
        }
    }

    pub fn target_dir(&self) -> PathBuf {
        self.working_dir.join(&self.hostname)
    }

    pub fn db_path(&self) -> PathBuf {
        db_path(&self.working_dir, &self.hostname)
    }
}

/// `<working_dir>/<hostname>/<hostname>_tinydb.json`
pub fn db_path(working_dir: &Path, hostname: &str) -> PathBuf {
    working_dir
        .join(hostname)
        .join(format!("{hostname}_tinydb.json"))
}

pub struct Recon {
    config: ReconConfig,
    client: ApiClient,
    store: DocumentStore,
    record: TargetRecord,
}

impl Recon {
    /// Create the target directory and store, and register the target.
    ///
    /// A host already in the store keeps its scan history.
    pub fn init(config: ReconConfig) -> Result<Self> {
        validate_target(&config.target_info())?;

        let target_dir = config.target_dir();
        std::fs::create_dir_all(&target_dir)
            .with_context(|| format!("failed to create {}", target_dir.display()))?;
        println!(
            "{} {}",
            "Working directory created:".green(),
            target_dir.display().to_string().cyan()
        );

        let mut store = DocumentStore::open(config.db_path())
            .with_context(|| format!("failed to open {}", config.db_path().display()))?;
        println!(
            "{} {}",
            "Database initialized at".green(),
            store.path().display().to_string().cyan()
        );

        check_required_tools();

        let record = store.register(&config.target_info())?.clone();
        println!("{}", "Reconnaissance information updated in database".green());

        let client = ApiClient::new(&config.api_url)?;
        Ok(Self {
            config,
            client,
            store,
            record,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        for line in format_feedback(&self.config) {
            println!("{line}");
        }
        println!("{}", "Starting basic reconnaissance...".yellow());
        self.perform_scan(QUICK_SCAN).await
    }

    /// Run one scan profile through the service; failures are reported, not propagated.
    pub async fn perform_scan(&mut self, scan_type: &str) -> Result<()> {
        println!("{}", format!("Kicking off nmap {scan_type}...").yellow());
        let ports = match self
            .client
            .perform_nmap_scan(&self.record.target_info(), scan_type)
            .await
        {
            Ok(ports) => ports,
            Err(e) => {
                error!("{e:#}");
                println!("{}", "Failed to perform nmap scan. Exiting.".red());
                return Ok(());
            }
        };

        println!("{}", "Nmap scan completed successfully".green());
        print_ports_table(&ports);

        let updated = self
            .store
            .update_with_scan_results(&self.config.hostname, scan_type, &ports)?;
        self.record = updated.clone();
        info!(
            hostname = %self.config.hostname,
            scan_type,
            known_ports = self.record.open_ports.len(),
            "stored scan results"
        );
        Ok(())
    }
}

pub fn display_banner() {
    let rule = "=".repeat(50);
    println!("{}", rule.cyan());
    println!("{}", BANNER.green());
    println!("{}", rule.cyan());
}

/// Summary of the run's settings, labels highlighted.
pub fn format_feedback(config: &ReconConfig) -> Vec<String> {
    let db_name = config
        .db_path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let rule = "=".repeat(50);
    vec![
        format!("\n{}", rule.cyan()),
        format!("{} {}", "Working directory:".yellow(), config.working_dir.display()),
        format!("{} {}", "Hostname:".yellow(), config.hostname),
        format!("{} {}", "IP:".yellow(), config.ip),
        format!("{} {}", "Force:".yellow(), config.force),
        format!("{} {db_name}", "Database:".yellow()),
        format!("{}\n", rule.cyan()),
    ]
}

/// Load `KEY=value` pairs from `path`, or from a `.env` found in the current
/// directory or its parents. Variables already set in the process win.
pub fn load_env_file(path: Option<&Path>) -> Option<PathBuf> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };
    match loaded {
        Ok(path) => Some(path),
        Err(e) => {
            debug!("no env file loaded: {e}");
            None
        }
    }
}

/// Warn about every helper tool missing from `PATH`; returns how many were found.
pub fn check_required_tools() -> usize {
    REQUIRED_TOOLS
        .iter()
        .filter(|(tool, hints)| check_tool_installed(tool, hints))
        .count()
}

pub fn check_tool_installed(tool: &str, install_hints: &[&str]) -> bool {
    if locate_program(tool).is_some() {
        println!("{}", format!("{tool} is installed.").green());
        return true;
    }
    println!("{}", format!("{tool} is not installed.").red());
    println!("To install {tool}, you can use one of the following commands:");
    for hint in install_hints {
        println!("  {hint}");
    }
    false
}

/// Render open ports as a table, one row per port.
pub fn format_ports_table(ports: &[OpenPort]) -> String {
    let rows: Vec<[String; 4]> = ports
        .iter()
        .map(|p| {
            [
                p.port_number.to_string(),
                p.protocol.clone(),
                p.service.clone().unwrap_or_else(|| "unknown".into()),
                p.version.clone().unwrap_or_else(|| "Unknown".into()),
            ]
        })
        .collect();

    let headers = ["Port", "Protocol", "Service", "Version"];
    let mut widths = headers.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let sep = format!(
        "+{}+",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );
    let line = |cells: [&str; 4]| {
        let inner: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(c, w)| format!(" {c:^w$} "))
            .collect();
        format!("|{}|", inner.join("|"))
    };

    let mut out = vec![sep.clone(), line(headers), sep.clone()];
    for row in &rows {
        out.push(line([&row[0], &row[1], &row[2], &row[3]]));
    }
    out.push(sep);
    out.join("\n")
}

fn print_ports_table(ports: &[OpenPort]) {
    println!("{}", "Nmap scan results:".green());
    println!("{}", format_ports_table(ports).cyan());
}

/// Build a [`ReconConfig`] from CLI values, failing when no working directory is known.
pub fn resolve_config(
    ip: String,
    hostname: String,
    force: bool,
    working_dir: Option<PathBuf>,
    api_url: String,
) -> Result<ReconConfig> {
    let Some(working_dir) = working_dir else {
        bail!("no working directory: set WORKING_DIR or pass --working-dir");
    };
    Ok(ReconConfig {
        ip,
        hostname,
        force,
        working_dir,
        api_url,
    })
}
