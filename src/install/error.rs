//! Provisioning error type
//!
//! Every step that touches the bundle, the filesystem or an external process
//! reports through [`ProvisionError`]. The caller-facing contract is still a
//! plain pass/fail (see `InstallationManager::verify_installation`); the
//! variants only exist so the failure can be logged with its cause.

use std::path::PathBuf;

use thiserror::Error;

use super::process::Exit;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("asset '{name}' not found in bundle")]
    AssetNotFound { name: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} exited with {exit}", program.display())]
    ExitStatus { program: PathBuf, exit: Exit },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("archive entry '{name}' escapes the install directory")]
    UnsafeEntry { name: String },

    #[error("installation has not been verified; refusing to start dependent components")]
    NotProvisioned,

    #[error("{op} failed: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: nix::Error,
    },
}

impl ProvisionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProvisionError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
