//! Static manifest of what the installer provisions
//!
//! The names below are the packaged layout contract: archive names inside the
//! bundle, sentinel paths whose existence means "already installed", and the
//! ordered list of binaries that must end up executable. They are plain data
//! consumed by `InstallationManager`, which itself knows nothing about any
//! particular file.

use std::path::{Component, Path, PathBuf};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Zip asset holding the binary distribution.
pub const BINARY_ARCHIVE: &str = "binaries-armeabi-v7a.zip";

/// Primary binary; doubles as the sentinel for the binary set.
pub const PRIMARY_BINARY: &str = "busybox";

/// Compressed tar asset holding the X11 resources.
pub const RESOURCE_ARCHIVE: &str = "data-1.tgz";

/// Directory whose presence means the resources were unpacked.
pub const RESOURCE_SENTINEL: &str = "usr/share/X11";

/// Resource binaries that need execute permission, in fix-up order.
pub const RESOURCE_BINARIES: &[&str] = &[
    "usr/bin/xkbcomp",
    "usr/bin/xhost",
    "usr/bin/xli",
    "usr/bin/xsel",
];

/// A path under the install directory that must carry execute permission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ManagedBinary(PathBuf);

impl ManagedBinary {
    /// Parse a manifest path. A leading `/` is taken to mean "from the install
    /// root"; `..` and other non-normal components are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        relative_path(raw).map(ManagedBinary)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl TryFrom<String> for ManagedBinary {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        ManagedBinary::parse(&raw).ok_or_else(|| format!("invalid managed binary path '{raw}'"))
    }
}

impl From<ManagedBinary> for String {
    fn from(binary: ManagedBinary) -> Self {
        binary.0.to_string_lossy().into_owned()
    }
}

/// Normalize `raw` into a path that stays inside whatever it is joined onto.
pub(crate) fn relative_path(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim_start_matches('/');
    let path = Path::new(trimmed);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Serde hook for configured paths: same normalization as [`ManagedBinary`].
pub(crate) fn deserialize_relative<'de, D: Deserializer<'de>>(de: D) -> Result<PathBuf, D::Error> {
    let raw = String::deserialize(de)?;
    relative_path(&raw)
        .ok_or_else(|| D::Error::custom(format!("path '{raw}' must stay inside the install directory")))
}

pub fn default_primary_binary() -> ManagedBinary {
    ManagedBinary(PathBuf::from(PRIMARY_BINARY))
}

/// The default resource manifest.
pub fn default_resource_binaries() -> Vec<ManagedBinary> {
    RESOURCE_BINARIES
        .iter()
        .filter_map(|p| ManagedBinary::parse(p))
        .collect()
}
