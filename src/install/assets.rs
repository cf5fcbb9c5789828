//! Read-only asset bundles
//!
//! An asset bundle is the packaged, immutable set of archives shipped with the
//! application. The installer only ever asks for a blob by its logical name and
//! reads it front to back once.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::{ProvisionError, Result};

pub trait AssetSource {
    /// Open the blob called `name` as a forward-only byte stream.
    fn open(&self, name: &str) -> Result<Box<dyn Read + '_>>;
}

impl<T: AssetSource + ?Sized> AssetSource for &T {
    fn open(&self, name: &str) -> Result<Box<dyn Read + '_>> {
        (**self).open(name)
    }
}

/// Bundle laid out as one file per asset in a directory.
#[derive(Debug, Clone)]
pub struct DirectoryBundle {
    root: PathBuf,
}

impl DirectoryBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetSource for DirectoryBundle {
    fn open(&self, name: &str) -> Result<Box<dyn Read + '_>> {
        // Asset names are flat; anything that looks like a path is not in the bundle.
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return Err(ProvisionError::AssetNotFound {
                name: name.to_string(),
            });
        }

        let path = self.root.join(name);
        match fs::File::open(&path) {
            Ok(file) if file.metadata().map(|m| m.is_file()).unwrap_or(false) => {
                Ok(Box::new(BufReader::new(file)))
            }
            Ok(_) => Err(ProvisionError::AssetNotFound {
                name: name.to_string(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ProvisionError::AssetNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(ProvisionError::io(path, e)),
        }
    }
}

/// In-memory bundle, for embedded assets.
#[derive(Debug, Clone, Default)]
pub struct MemoryBundle {
    blobs: HashMap<String, Arc<[u8]>>,
}

impl MemoryBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.blobs.insert(name.into(), Arc::from(bytes.into()));
        self
    }
}

impl AssetSource for MemoryBundle {
    fn open(&self, name: &str) -> Result<Box<dyn Read + '_>> {
        self.blobs
            .get(name)
            .map(|bytes| Box::new(Cursor::new(&bytes[..])) as Box<dyn Read + '_>)
            .ok_or_else(|| ProvisionError::AssetNotFound {
                name: name.to_string(),
            })
    }
}
