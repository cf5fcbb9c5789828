//! Runtime provisioning
//!
//! Brings the install directory to a usable state on first run and re-checks
//! it on every later run:
//!
//! 1. If the primary binary is missing, stream-extract the zip binary bundle.
//! 2. Mark the primary binary executable (every run).
//! 3. If the resource sentinel is missing, copy the tar.gz resource archive in,
//!    unpack it and mark the resource binaries executable.
//!
//! The first failing step aborts the rest. Presence on disk is the only state.

pub mod assets;
pub mod detection;
pub mod error;
pub mod extract;
pub mod manifest;
pub mod process;

use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info, warn};

pub use assets::{AssetSource, DirectoryBundle, MemoryBundle};
pub use detection::{InstallationState, check_installation_state, check_presence};
pub use error::{ProvisionError, Result};
pub use manifest::ManagedBinary;
pub use process::{Exit, Invocation, ProcessRunner, SystemRunner};

use crate::config::{BinarySet, ExtractionMode, PermissionConfig, ProvisionConfig, ResourceSet};

/// What a successful verification actually had to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// Entry count, when the binary bundle was extracted on this run
    pub binaries_extracted: Option<usize>,
    /// Whether the resource archive was unpacked (or handed off) on this run
    pub resources_extracted: bool,
    /// Permission fix-up invocations issued
    pub permission_fixups: usize,
}

/// Orchestrates presence checks, extraction and permission fix-ups.
///
/// Not safe to run concurrently against the same install directory.
pub struct InstallationManager<S, P = SystemRunner> {
    install_dir: PathBuf,
    binaries: BinarySet,
    resources: ResourceSet,
    permissions: PermissionConfig,
    source: S,
    runner: P,
}

impl<S: AssetSource> InstallationManager<S, SystemRunner> {
    pub fn new(config: &ProvisionConfig, source: S) -> Self {
        Self::with_runner(config, source, SystemRunner)
    }
}

impl<S: AssetSource, P: ProcessRunner> InstallationManager<S, P> {
    pub fn with_runner(config: &ProvisionConfig, source: S, runner: P) -> Self {
        Self {
            install_dir: config.install_dir.clone(),
            binaries: config.binaries.clone(),
            resources: config.resources.clone(),
            permissions: config.permissions.clone(),
            source,
            runner,
        }
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Absolute path of the primary binary.
    pub fn primary_binary(&self) -> PathBuf {
        self.install_dir.join(self.binaries.primary.path())
    }

    /// Run every provisioning step; `false` means the installation is unusable.
    pub fn verify_installation(&self) -> bool {
        match self.try_verify() {
            Ok(report) => {
                info!(
                    "Installation verified at {} ({:?})",
                    self.install_dir.display(),
                    report
                );
                true
            }
            Err(e) => {
                error!("Runtime installation incomplete: {e}");
                false
            }
        }
    }

    /// Same as [`verify_installation`](Self::verify_installation) but keeps the cause.
    pub fn try_verify(&self) -> Result<Report> {
        fs::create_dir_all(&self.install_dir)
            .map_err(|e| ProvisionError::io(&self.install_dir, e))?;

        let mut report = Report::default();

        if !check_presence(&self.install_dir, self.binaries.primary.path()) {
            info!("Extracting binaries");
            let count = self
                .extract_binaries()
                .inspect_err(|e| error!("Could not extract binaries: {e}"))?;
            report.binaries_extracted = Some(count);
        }

        info!("Setting execute permissions");
        self.set_executable(self.binaries.primary.path())
            .inspect_err(|e| error!("Could not set execute permissions: {e}"))?;
        report.permission_fixups += 1;

        if !check_presence(&self.install_dir, &self.resources.sentinel) {
            info!("Extracting resources");
            self.extract_resources()
                .inspect_err(|e| error!("Could not extract resources: {e}"))?;
            report.resources_extracted = true;

            for binary in &self.resources.managed {
                self.set_executable(binary.path())?;
                report.permission_fixups += 1;
            }
        }

        Ok(report)
    }

    fn extract_binaries(&self) -> Result<usize> {
        let stream = self.source.open(&self.binaries.archive)?;
        extract::unzip_staged(stream, &self.install_dir, self.binaries.primary.path())
    }

    fn extract_resources(&self) -> Result<()> {
        let name = &self.resources.archive;
        let archive = extract::copy_asset(&self.source, name, &self.install_dir)?;

        match self.resources.extraction {
            ExtractionMode::Builtin => extract::unpack_tar_gz(&archive, &self.install_dir),
            ExtractionMode::Wait => {
                let inv = self.tar_invocation();
                let exit = self.runner.run(&inv)?;
                if exit.success() {
                    Ok(())
                } else {
                    Err(ProvisionError::ExitStatus {
                        program: inv.program,
                        exit,
                    })
                }
            }
            ExtractionMode::Detached => {
                let inv = self.tar_invocation();
                self.runner.spawn_detached(&inv)?;
                warn!("Not waiting for '{inv}'; permission fix-ups may race the extraction");
                Ok(())
            }
        }
    }

    /// `<primary> tar -xf <archive>`, run from the install directory.
    fn tar_invocation(&self) -> Invocation {
        Invocation::new(self.primary_binary())
            .arg("tar")
            .arg("-xf")
            .arg(&self.resources.archive)
            .current_dir(&self.install_dir)
    }

    fn set_executable(&self, path: &Path) -> Result<()> {
        let inv = process::permission_invocation(
            &self.permissions.tool,
            &self.permissions.mode,
            &self.install_dir,
            path,
        );
        info!("Set execute permission on {} ({})", path.display(), self.install_dir.join(path).display());

        let exit = self.runner.run(&inv)?;
        if !exit.success() {
            // Exit status of the permission tool is not part of the contract.
            warn!("'{inv}' finished with {exit}");
        }
        Ok(())
    }
}
