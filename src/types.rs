use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use ::time::{format_description::well_known, OffsetDateTime};

/// Tool name under which scanner runs are recorded in a [`TargetRecord`].
pub const NMAP_TOOL: &str = "nmap";

/// One open port reported by the scanner.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OpenPort {
    pub port_number: u16,
    pub protocol: String,
    pub service: Option<String>,
    pub version: Option<String>,
}

impl OpenPort {
    /// Identity used when merging port lists.
    pub fn key(&self) -> (u16, &str) {
        (self.port_number, self.protocol.as_str())
    }
}

/// Target description sent by the client with every scan request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    pub working_dir: PathBuf,
    pub hostname: String,
    pub ip: String,
    #[serde(default)]
    pub force: bool,
}

/// Body of `POST /perform_nmap_scan`.
///
/// Both fields are optional at the type level so a request that omits them
/// can be answered with a descriptive error instead of a rejection.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ScanRequest {
    #[serde(default)]
    pub info_dict: Option<TargetInfo>,
    #[serde(default)]
    pub scan_type: Option<String>,
}

/// The last run of one scan profile.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanRun {
    pub timestamp: String,
    pub open_ports: Vec<OpenPort>,
}

/// Per-tool results, keyed by scan profile name.
pub type ToolRuns = BTreeMap<String, ScanRun>;

/// Document kept per hostname in the document store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TargetRecord {
    pub working_dir: PathBuf,
    pub hostname: String,
    pub ip: String,
    #[serde(default)]
    pub force: bool,
    pub recon_date: String,
    #[serde(default)]
    pub tools: BTreeMap<String, ToolRuns>,
    #[serde(default)]
    pub open_ports: Vec<OpenPort>,
}

impl TargetRecord {
    pub fn new(target: &TargetInfo) -> Self {
        Self {
            working_dir: target.working_dir.clone(),
            hostname: target.hostname.clone(),
            ip: target.ip.clone(),
            force: target.force,
            recon_date: now_rfc3339(),
            tools: BTreeMap::new(),
            open_ports: Vec::new(),
        }
    }

    pub fn target_info(&self) -> TargetInfo {
        TargetInfo {
            working_dir: self.working_dir.clone(),
            hostname: self.hostname.clone(),
            ip: self.ip.clone(),
            force: self.force,
        }
    }
}

pub fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
