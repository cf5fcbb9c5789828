//! Host process glue: one-time initialization, the native server launcher and
//! local address discovery.

pub mod net;
pub mod server;

use log::info;

use crate::config::ServerConfig;
use crate::install::{AssetSource, InstallationManager, ProcessRunner, ProvisionError, Result};

pub use net::{AddressFamily, LocalAddress, local_address};
pub use server::{Readiness, ServerHandle};

/// Initialization state owned by the host process.
///
/// Provisioning runs at most once successfully per runtime; dependent
/// components can only be started after it did.
pub struct HostRuntime<S, P> {
    manager: InstallationManager<S, P>,
    initialized: bool,
}

impl<S: AssetSource, P: ProcessRunner> HostRuntime<S, P> {
    pub fn new(manager: InstallationManager<S, P>) -> Self {
        Self {
            manager,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Verify the installation unless that already succeeded.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let report = self.manager.try_verify()?;
        info!("Runtime initialized: {report:?}");
        self.initialized = true;
        Ok(())
    }

    /// Start the native server from the install directory.
    pub fn launch_server(&self, config: &ServerConfig) -> Result<ServerHandle> {
        if !self.initialized {
            return Err(ProvisionError::NotProvisioned);
        }
        ServerHandle::launch(self.manager.install_dir(), config)
    }
}
