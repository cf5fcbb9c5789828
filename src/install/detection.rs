//! Installation state detection
//!
//! Presence on disk is the only state the installer keeps. A set is treated as
//! installed when its sentinel path exists as a file or a directory; the
//! sentinel's integrity is not checked.

use std::path::{Path, PathBuf};

use log::trace;

use crate::config::ProvisionConfig;

/// Installation state enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallationState {
    /// Neither sentinel present
    NotInstalled,
    /// Binaries present, resources missing (or the other way round)
    PartiallyInstalled,
    /// Both sentinels present
    FullyInstalled,
}

/// Whether `rel` exists under `install_dir` as a file or directory.
///
/// A leading `/` on `rel` means the install root, not the filesystem root.
pub fn check_presence(install_dir: &Path, rel: &Path) -> bool {
    let path = install_dir.join(rel.strip_prefix("/").unwrap_or(rel));
    let exists = path.is_file() || path.is_dir();
    trace!(
        "Checking presence of {} ({}): {}",
        rel.display(),
        path.display(),
        if exists { "found" } else { "not found" }
    );
    exists
}

/// Check the state of both asset sets without touching anything.
pub fn check_installation_state(config: &ProvisionConfig) -> InstallationState {
    let binaries = check_presence(&config.install_dir, config.binaries.primary.path());
    let resources = check_presence(&config.install_dir, &config.resources.sentinel);

    match (binaries, resources) {
        (false, false) => InstallationState::NotInstalled,
        (true, true) => InstallationState::FullyInstalled,
        _ => InstallationState::PartiallyInstalled,
    }
}

/// Presence and permission of one managed binary, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryStatus {
    pub path: PathBuf,
    pub present: bool,
    pub executable: bool,
}

/// Inspect every managed binary (primary first, then the resource manifest).
pub fn inspect_binaries(config: &ProvisionConfig) -> Vec<BinaryStatus> {
    std::iter::once(&config.binaries.primary)
        .chain(config.resources.managed.iter())
        .map(|bin| {
            let path = config.install_dir.join(bin.path());
            let present = path.is_file();
            BinaryStatus {
                executable: present && is_executable(&path),
                present,
                path,
            }
        })
        .collect()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
