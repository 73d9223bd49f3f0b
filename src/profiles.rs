use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// A named set of scanner arguments.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanProfile {
    pub name: String,
    pub description: String,
    pub args: Vec<String>,
}

/// Profile body as written in a profiles TOML file; the table name is the profile name.
#[derive(Deserialize, Debug)]
struct ProfileEntry {
    #[serde(default)]
    description: String,
    args: Vec<String>,
}

/// The two profiles every server knows about.
pub fn builtin_profiles() -> Vec<ScanProfile> {
    const BUILTIN: &[(&str, &str, &[&str])] = &[
        (
            "quick_scan",
            "Quick scan of top 1000 ports",
            &["--top-ports", "1000"],
        ),
        (
            "detailed_scan",
            "Detailed scan with version detection and default scripts",
            &["-sC", "-sV", "--top-ports", "1000"],
        ),
    ];
    BUILTIN
        .iter()
        .map(|(name, description, args)| ScanProfile {
            name: name.to_string(),
            description: description.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        })
        .collect()
}

/// Ordered collection of scan profiles, looked up by name.
#[derive(Debug, Clone)]
pub struct ProfileSet {
    profiles: Vec<ScanProfile>,
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self {
            profiles: builtin_profiles(),
        }
    }
}

impl ProfileSet {
    pub fn lookup(&self, name: &str) -> Result<&ScanProfile> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ScanError::UnknownScanType(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScanProfile> {
        self.profiles.iter()
    }

    /// Add a profile, replacing any existing profile with the same name in place.
    pub fn insert(&mut self, profile: ScanProfile) {
        match self.profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(slot) => *slot = profile,
            None => self.profiles.push(profile),
        }
    }

    /// Built-in profiles extended (or overridden) by the tables of a TOML document.
    ///
    /// ```toml
    /// [udp_scan]
    /// description = "Top 100 UDP ports"
    /// args = ["-sU", "--top-ports", "100"]
    /// ```
    pub fn from_toml_str(s: &str) -> std::result::Result<Self, String> {
        let entries: BTreeMap<String, ProfileEntry> =
            toml::from_str(s).map_err(|e| e.to_string())?;
        let mut set = Self::default();
        for (name, entry) in entries {
            if !is_valid_profile_name(&name) {
                return Err(format!("invalid profile name: {name:?}"));
            }
            set.insert(ScanProfile {
                name,
                description: entry.description,
                args: entry.args,
            });
        }
        Ok(set)
    }

    pub fn load_toml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|reason| ScanError::Profiles {
            path: path.to_path_buf(),
            reason,
        })
    }
}

/// Profile names end up in output file names.
fn is_valid_profile_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
