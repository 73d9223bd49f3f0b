#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use ktron::types::TargetInfo;

pub const DETAILED_XML: &str = include_str!("../fixtures/detailed_scan.xml");

pub struct FakeScanners {
    /// Writes the fixture report for the `-oA` prefix and appends its argv to `<host dir>/calls.log`.
    pub ok: PathBuf,
    /// Prints to stderr and exits 1 without writing anything.
    pub failing: PathBuf,
}

/// Scanner stand-ins, written once per test binary before any of them is spawned.
#[cfg(unix)]
pub fn fake_scanners() -> &'static FakeScanners {
    use std::os::unix::fs::PermissionsExt;

    static SCANNERS: OnceLock<FakeScanners> = OnceLock::new();
    SCANNERS.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("ktron_fake_nmap_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let ok = dir.join("nmap-ok");
        let script = format!(
            "#!/bin/sh\n\
             prefix=\"$2\"\n\
             echo \"$@\" >> \"$(dirname \"$prefix\")/calls.log\"\n\
             cat > \"$prefix.xml\" <<'KTRON_XML'\n{DETAILED_XML}\nKTRON_XML\n\
             : > \"$prefix.nmap\"\n\
             : > \"$prefix.gnmap\"\n"
        );
        std::fs::write(&ok, script).unwrap();

        let failing = dir.join("nmap-fail");
        std::fs::write(
            &failing,
            "#!/bin/sh\necho 'QUITTING! unable to resolve target' >&2\nexit 1\n",
        )
        .unwrap();

        for p in [&ok, &failing] {
            std::fs::set_permissions(p, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        FakeScanners { ok, failing }
    })
}

pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ktron_it_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn target(working_dir: &Path, force: bool) -> TargetInfo {
    TargetInfo {
        working_dir: working_dir.to_path_buf(),
        hostname: "box".into(),
        ip: "10.10.11.7".into(),
        force,
    }
}

/// Number of times the fake scanner ran for targets under `working_dir`.
pub fn scanner_calls(working_dir: &Path) -> usize {
    std::fs::read_to_string(working_dir.join("box").join("calls.log"))
        .map(|s| s.lines().count())
        .unwrap_or(0)
}
