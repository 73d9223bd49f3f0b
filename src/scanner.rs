use std::ffi::OsString;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, ScanError};
use crate::profiles::{ProfileSet, ScanProfile};
use crate::report;
use crate::types::{OpenPort, TargetInfo};

/// Files produced by `nmap -oA <prefix>`; all must exist for a cached result to be used.
pub const OUTPUT_EXTENSIONS: [&str; 3] = ["nmap", "gnmap", "xml"];

pub const DEFAULT_PROGRAM: &str = "nmap";

/// Runs scan profiles against targets, reusing earlier output files when present.
#[derive(Debug, Clone)]
pub struct Scanner {
    program: String,
    profiles: ProfileSet,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM, ProfileSet::default())
    }
}

impl Scanner {
    pub fn new(program: impl Into<String>, profiles: ProfileSet) -> Self {
        Self {
            program: program.into(),
            profiles,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    /// Scan `target` with the profile named `scan_type` and return its open ports.
    ///
    /// Unless `target.force` is set, a complete set of earlier output files for
    /// the same target and profile is parsed instead of launching the scanner.
    pub async fn run_scan(&self, target: &TargetInfo, scan_type: &str) -> Result<Vec<OpenPort>> {
        let profile = self.profiles.lookup(scan_type)?;
        validate_target(target)?;

        let prefix = output_prefix(target, &profile.name)?;
        let xml = with_extension(&prefix, "xml");

        if has_cached_results(target, &prefix) {
            info!(
                scan_type,
                prefix = %prefix.display(),
                "results already exist, processing existing results"
            );
            return report::convert_report(&xml);
        }

        let argv = build_command(&self.program, target, profile, &prefix);
        execute(&argv).await?;
        report::convert_report(&xml)
    }
}

/// Resolve `program` the way a shell would: paths are checked directly, bare names against `PATH`.
pub fn locate_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

/// Reject targets that would escape the working directory or confuse the scanner.
pub fn validate_target(target: &TargetInfo) -> Result<()> {
    let host = target.hostname.as_str();
    if host.is_empty() || host == "." || host == ".." || host.contains(['/', '\\']) {
        return Err(ScanError::InvalidTarget(format!(
            "hostname {host:?} must be a single path component"
        )));
    }
    if target.ip.parse::<IpAddr>().is_err() {
        return Err(ScanError::InvalidTarget(format!(
            "{:?} is not an IP address",
            target.ip
        )));
    }
    Ok(())
}

/// `<working_dir>/<hostname>/nmap_<profile>_<ip>`, creating the host directory.
pub fn output_prefix(target: &TargetInfo, profile_name: &str) -> Result<PathBuf> {
    let dir = target.working_dir.join(&target.hostname);
    std::fs::create_dir_all(&dir)?;
    let ip = target.ip.replace(['.', ':'], "_");
    Ok(dir.join(format!("nmap_{profile_name}_{ip}")))
}

pub fn with_extension(prefix: &Path, ext: &str) -> PathBuf {
    let mut s: OsString = prefix.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

pub fn has_cached_results(target: &TargetInfo, prefix: &Path) -> bool {
    !target.force
        && OUTPUT_EXTENSIONS
            .iter()
            .all(|ext| with_extension(prefix, ext).exists())
}

/// Full argument vector, program first: `<program> -oA <prefix> <profile args> <ip>`.
pub fn build_command(
    program: &str,
    target: &TargetInfo,
    profile: &ScanProfile,
    prefix: &Path,
) -> Vec<OsString> {
    let mut argv: Vec<OsString> = vec![program.into(), "-oA".into(), prefix.into()];
    argv.extend(profile.args.iter().map(OsString::from));
    argv.push(target.ip.clone().into());
    argv
}

/// Run the command to completion, failing on a non-zero exit status.
pub async fn execute(argv: &[OsString]) -> Result<()> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| ScanError::Launch {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        })?;
    let command_line = argv
        .iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");

    info!(command = %command_line, "launching scanner");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| ScanError::Launch {
            program: program.to_string_lossy().into_owned(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        warn!(command = %command_line, status = %output.status, stderr = %stderr.trim(), "scanner failed");
        return Err(ScanError::ScannerFailed {
            command: command_line,
            status: output.status,
            stderr: stderr.trim().to_string(),
        });
    }
    debug!(stdout = %stdout, "scanner output");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(dir: &Path, force: bool) -> TargetInfo {
        TargetInfo {
            working_dir: dir.to_path_buf(),
            hostname: "box".into(),
            ip: "10.10.11.7".into(),
            force,
        }
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ktron_scanner_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn prefix_layout_and_dir_creation() {
        let dir = scratch("prefix");
        let t = target(&dir, false);
        let prefix = output_prefix(&t, "quick_scan").unwrap();
        assert_eq!(prefix, dir.join("box").join("nmap_quick_scan_10_10_11_7"));
        assert!(dir.join("box").is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn ipv6_colons_replaced() {
        let dir = scratch("v6");
        let mut t = target(&dir, false);
        t.ip = "fe80::1".into();
        let prefix = output_prefix(&t, "quick_scan").unwrap();
        assert!(prefix.ends_with("nmap_quick_scan_fe80__1"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn command_order() {
        let t = target(Path::new("/w"), false);
        let set = ProfileSet::default();
        let profile = set.lookup("detailed_scan").unwrap();
        let argv = build_command("nmap", &t, profile, Path::new("/w/box/nmap_detailed_scan_x"));
        let argv: Vec<String> = argv.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            argv,
            vec![
                "nmap",
                "-oA",
                "/w/box/nmap_detailed_scan_x",
                "-sC",
                "-sV",
                "--top-ports",
                "1000",
                "10.10.11.7"
            ]
        );
    }

    #[test]
    fn cache_needs_all_three_files() {
        let dir = scratch("cache");
        let t = target(&dir, false);
        let prefix = output_prefix(&t, "quick_scan").unwrap();
        std::fs::write(with_extension(&prefix, "xml"), "<nmaprun/>").unwrap();
        std::fs::write(with_extension(&prefix, "nmap"), "").unwrap();
        assert!(!has_cached_results(&t, &prefix));

        std::fs::write(with_extension(&prefix, "gnmap"), "").unwrap();
        assert!(has_cached_results(&t, &prefix));
        assert!(!has_cached_results(&target(&dir, true), &prefix));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn empty_command_is_a_launch_failure() {
        let err = execute(&[]).await.unwrap_err();
        assert!(matches!(err, ScanError::Launch { .. }));
        assert!(!err.is_client_error());
    }

    #[test]
    fn rejects_path_hostnames_and_bad_ips() {
        let mut t = target(Path::new("/w"), false);
        t.hostname = "../etc".into();
        assert!(matches!(validate_target(&t), Err(ScanError::InvalidTarget(_))));

        let mut t = target(Path::new("/w"), false);
        t.ip = "10.0.0.1; rm -rf /".into();
        assert!(matches!(validate_target(&t), Err(ScanError::InvalidTarget(_))));
    }

    #[test]
    fn locate_missing_program() {
        assert!(locate_program("ktron-no-such-scanner").is_none());
        assert!(locate_program("/nonexistent/ktron-no-such-scanner").is_none());
    }

    #[tokio::test]
    async fn unknown_profile_checked_first() {
        let scanner = Scanner::default();
        let t = target(Path::new("/nonexistent"), false);
        let err = scanner.run_scan(&t, "bogus").await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown scan type: bogus");
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let argv = vec![OsString::from("/nonexistent/ktron-no-such-scanner")];
        let err = execute(&argv).await.unwrap_err();
        assert!(matches!(err, ScanError::Launch { .. }));
    }
}
