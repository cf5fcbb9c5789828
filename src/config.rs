use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::install::manifest::{
    self, BINARY_ARCHIVE, ManagedBinary, RESOURCE_ARCHIVE, RESOURCE_SENTINEL,
};

/// Top‑level provisioning configuration (defaults mirror the packaged layout).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Writable directory the bundle is materialized into
    pub install_dir: PathBuf,
    /// Directory holding the packaged archives, one file per asset name
    pub bundle_dir: PathBuf,
    pub binaries: BinarySet,
    pub resources: ResourceSet,
    pub permissions: PermissionConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
}

/// The zip-packaged binary distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinarySet {
    pub archive: String,
    /// Primary binary; its presence marks the set as installed
    pub primary: ManagedBinary,
}

/// The tar.gz-packaged resource set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSet {
    pub archive: String,
    /// Directory whose presence marks the set as installed
    #[serde(deserialize_with = "manifest::deserialize_relative")]
    pub sentinel: PathBuf,
    pub extraction: ExtractionMode,
    /// Binaries inside the resource set that must be executable, in order
    pub managed: Vec<ManagedBinary>,
}

/// How the resource archive gets unpacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Run `<primary> tar -xf <archive>` and wait; non-zero exit fails
    #[default]
    Wait,
    /// Run `<primary> tar -xf <archive>` without waiting for it
    Detached,
    /// Unpack in-process
    Builtin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// External chmod-equivalent
    pub tool: PathBuf,
    /// Octal mode passed as the tool's first argument
    pub mode: String,
}

/// Native server launched once provisioning succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server binary, relative to the install directory
    pub binary: ManagedBinary,
    #[serde(default)]
    pub args: Vec<String>,
    /// Path that appears once the server accepts clients
    pub ready_path: Option<PathBuf>,
    #[serde(default = "default_ready_retries")]
    pub ready_retries: u32,
    #[serde(default = "default_ready_interval_ms")]
    pub ready_interval_ms: u64,
}

fn default_ready_retries() -> u32 {
    5
}

fn default_ready_interval_ms() -> u64 {
    1000
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            install_dir: default_install_dir(),
            bundle_dir: PathBuf::from("/usr/share/vrx/assets"),
            binaries: BinarySet::default(),
            resources: ResourceSet::default(),
            permissions: PermissionConfig::default(),
            server: None,
        }
    }
}

impl Default for BinarySet {
    fn default() -> Self {
        Self {
            archive: BINARY_ARCHIVE.into(),
            primary: manifest::default_primary_binary(),
        }
    }
}

impl Default for ResourceSet {
    fn default() -> Self {
        Self {
            archive: RESOURCE_ARCHIVE.into(),
            sentinel: PathBuf::from(RESOURCE_SENTINEL),
            extraction: ExtractionMode::default(),
            managed: manifest::default_resource_binaries(),
        }
    }
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            tool: PathBuf::from("chmod"),
            mode: "0755".into(),
        }
    }
}

/// ~/.local/share/vrx   (or platform-equivalent)
pub fn default_install_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("vrx")
}

/// ~/.config/vrx/provision.toml   (or platform-equivalent)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vrx").join("provision.toml"))
}

impl ProvisionConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg: ProvisionConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `path`, writing the defaults there first if it does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config not found at {}, creating default configuration",
                path.display()
            );
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
            let default_toml = toml::to_string_pretty(&ProvisionConfig::default())
                .context("Failed to serialize default config")?;
            fs::write(path, default_toml).context("Failed to write config file")?;
        }
        Self::load(path)
    }

    pub fn validate(&self) -> Result<()> {
        let mode = &self.permissions.mode;
        if !(3..=4).contains(&mode.len()) || !mode.chars().all(|c| ('0'..='7').contains(&c)) {
            bail!("permissions.mode must be an octal mode like 0755, got '{mode}'");
        }

        let sentinel = self.resources.sentinel.to_string_lossy();
        if manifest::relative_path(&sentinel).is_none() {
            bail!("resources.sentinel must be a path inside the install directory, got '{sentinel}'");
        }

        for name in [&self.binaries.archive, &self.resources.archive] {
            if name.is_empty() || name.contains(['/', '\\']) {
                bail!("asset names must be plain file names, got '{name}'");
            }
        }

        if let Some(server) = &self.server
            && server.ready_retries == 0
        {
            bail!("server.ready_retries must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_packaged_layout() {
        let cfg = ProvisionConfig::default();
        assert_eq!(cfg.binaries.archive, "binaries-armeabi-v7a.zip");
        assert_eq!(cfg.binaries.primary.path(), Path::new("busybox"));
        assert_eq!(cfg.resources.archive, "data-1.tgz");
        assert_eq!(cfg.resources.sentinel, Path::new("usr/share/X11"));
        assert_eq!(cfg.resources.managed.len(), 4);
        assert_eq!(cfg.resources.extraction, ExtractionMode::Wait);
        assert_eq!(cfg.permissions.mode, "0755");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/provision.toml");

        let cfg = ProvisionConfig::load_or_create(&path).unwrap();

        assert!(path.exists());
        assert_eq!(cfg.resources.archive, "data-1.tgz");
        assert_eq!(cfg.install_dir, default_install_dir());
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("provision.toml");
        fs::write(
            &path,
            r#"
install_dir = "/tmp/vrx-test"

[resources]
extraction = "detached"
managed = ["/usr/bin/xhost"]

[server]
binary = "usr/bin/Xvfb"
args = [":0"]
"#,
        )
        .unwrap();

        let cfg = ProvisionConfig::load(&path).unwrap();
        assert_eq!(cfg.install_dir, Path::new("/tmp/vrx-test"));
        assert_eq!(cfg.resources.extraction, ExtractionMode::Detached);
        assert_eq!(cfg.resources.archive, "data-1.tgz");
        assert_eq!(cfg.resources.managed[0].path(), Path::new("usr/bin/xhost"));
        let server = cfg.server.unwrap();
        assert_eq!(server.ready_retries, 5);
        assert_eq!(server.args, vec![":0".to_string()]);
    }

    #[test]
    fn test_rejects_bad_mode_and_escaping_paths() {
        let mut cfg = ProvisionConfig::default();
        cfg.permissions.mode = "rwx".into();
        assert!(cfg.validate().is_err());

        let mut cfg = ProvisionConfig::default();
        cfg.resources.sentinel = PathBuf::from("../X11");
        assert!(cfg.validate().is_err());

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("provision.toml");
        fs::write(&path, "[resources]\nmanaged = [\"../../bin/sh\"]\n").unwrap();
        assert!(ProvisionConfig::load(&path).is_err());

        fs::write(&path, "[resources]\nsentinel = \"/../etc\"\n").unwrap();
        assert!(ProvisionConfig::load(&path).is_err());
    }

    #[test]
    fn test_rooted_sentinel_is_made_relative() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("provision.toml");
        fs::write(&path, "[resources]\nsentinel = \"/usr/share/X11\"\n").unwrap();

        let cfg = ProvisionConfig::load(&path).unwrap();
        assert_eq!(cfg.resources.sentinel, Path::new("usr/share/X11"));

        let mut cfg = ProvisionConfig::default();
        cfg.resources.sentinel = PathBuf::from("/usr/share/X11");
        assert!(cfg.validate().is_ok());
    }
}
