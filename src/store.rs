//! Flat JSON document store, one file per target.
//!
//! The file uses TinyDB's table layout so existing databases stay readable:
//!
//! ```json
//! {"_default": {"1": {"hostname": "box", ...}}}
//! ```
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ScanError};
use crate::types::{now_rfc3339, OpenPort, ScanRun, TargetInfo, TargetRecord, NMAP_TOOL};

const DEFAULT_TABLE: &str = "_default";

#[derive(Serialize, Deserialize, Debug, Default)]
struct Tables {
    #[serde(rename = "_default", default)]
    default: BTreeMap<u64, TargetRecord>,
}

#[derive(Debug)]
pub struct DocumentStore {
    path: PathBuf,
    tables: Tables,
}

impl DocumentStore {
    /// Open the store at `path`, creating an empty one if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => Tables::default(),
            Ok(content) => serde_json::from_str(&content).map_err(|source| ScanError::Json {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(e) => return Err(e.into()),
        };
        let store = Self { path, tables };
        store.flush()?;
        debug!(path = %store.path.display(), table = DEFAULT_TABLE, docs = store.len(), "opened document store");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.tables.default.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.default.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &TargetRecord> {
        self.tables.default.values()
    }

    /// Append a document and return its id.
    pub fn insert(&mut self, record: TargetRecord) -> Result<u64> {
        let id = self.tables.default.keys().next_back().map_or(1, |last| last + 1);
        self.tables.default.insert(id, record);
        self.flush()?;
        Ok(id)
    }

    pub fn get(&self, hostname: &str) -> Option<&TargetRecord> {
        self.all().find(|r| r.hostname == hostname)
    }

    /// Replace the document for `record.hostname`, inserting it if there is none.
    pub fn upsert(&mut self, record: TargetRecord) -> Result<u64> {
        match self.id_of(&record.hostname) {
            Some(id) => {
                self.tables.default.insert(id, record);
                self.flush()?;
                Ok(id)
            }
            None => self.insert(record),
        }
    }

    /// Register `target`, keeping the scan history of a host that is already known.
    ///
    /// An existing document only has its target fields refreshed; its
    /// `recon_date`, `tools` and `open_ports` are left as they are.
    pub fn register(&mut self, target: &TargetInfo) -> Result<&TargetRecord> {
        let id = match self.id_of(&target.hostname) {
            Some(id) => {
                if let Some(record) = self.tables.default.get_mut(&id) {
                    record.working_dir = target.working_dir.clone();
                    record.ip = target.ip.clone();
                    record.force = target.force;
                }
                self.flush()?;
                id
            }
            None => self.insert(TargetRecord::new(target))?,
        };
        self.tables
            .default
            .get(&id)
            .ok_or_else(|| ScanError::UnknownHost(target.hostname.clone()))
    }

    /// Record a scan run for `hostname` and fold its ports into the host's port list.
    pub fn update_with_scan_results(
        &mut self,
        hostname: &str,
        scan_type: &str,
        open_ports: &[OpenPort],
    ) -> Result<&TargetRecord> {
        let id = self
            .id_of(hostname)
            .ok_or_else(|| ScanError::UnknownHost(hostname.to_string()))?;
        let record = self
            .tables
            .default
            .get_mut(&id)
            .ok_or_else(|| ScanError::UnknownHost(hostname.to_string()))?;

        record.tools.entry(NMAP_TOOL.to_string()).or_default().insert(
            scan_type.to_string(),
            ScanRun {
                timestamp: now_rfc3339(),
                open_ports: open_ports.to_vec(),
            },
        );
        merge_ports(&mut record.open_ports, open_ports);

        self.flush()?;
        self.tables
            .default
            .get(&id)
            .ok_or_else(|| ScanError::UnknownHost(hostname.to_string()))
    }

    fn id_of(&self, hostname: &str) -> Option<u64> {
        self.tables
            .default
            .iter()
            .find(|(_, r)| r.hostname == hostname)
            .map(|(id, _)| *id)
    }

    /// Write the tables to a sibling file and move it over the store, so a
    /// failed write never leaves a truncated store behind.
    fn flush(&self) -> Result<()> {
        let tmp = temp_path(&self.path);
        let result = File::create(&tmp).map_err(ScanError::from).and_then(|file| {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &self.tables).map_err(|source| {
                ScanError::Json {
                    path: tmp.clone(),
                    source,
                }
            })?;
            writer.flush()?;
            Ok(())
        });
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// `<store>.tmp`, next to the store so the rename stays on one filesystem.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(".tmp");
    PathBuf::from(s)
}

/// Merge `incoming` into `existing`, keyed by (port, protocol).
///
/// A port seen again is replaced in place by the newer entry; new ports are appended.
pub fn merge_ports(existing: &mut Vec<OpenPort>, incoming: &[OpenPort]) {
    for port in incoming {
        match existing.iter_mut().find(|p| p.key() == port.key()) {
            Some(slot) => *slot = port.clone(),
            None => existing.push(port.clone()),
        }
    }
}
