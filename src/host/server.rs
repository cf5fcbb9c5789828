//! Native server launch/terminate contract
//!
//! The server itself is an external binary inside the install directory. This
//! module only starts it, polls for readiness and stops it.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use crate::config::ServerConfig;
use crate::install::{Exit, ProvisionError, Result};

/// Outcome of waiting for the server to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// The server died before becoming ready
    Exited(Exit),
    TimedOut,
}

pub struct ServerHandle {
    child: Child,
    program: PathBuf,
    ready_path: Option<PathBuf>,
    retries: u32,
    interval: Duration,
}

impl ServerHandle {
    /// Spawn the configured server with the install directory as working directory.
    pub fn launch(install_dir: &Path, config: &ServerConfig) -> Result<Self> {
        let program = install_dir.join(config.binary.path());
        let child = Command::new(&program)
            .args(&config.args)
            .current_dir(install_dir)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| ProvisionError::Spawn {
                program: program.clone(),
                source,
            })?;
        info!("Server {} started (pid {})", program.display(), child.id());

        Ok(Self {
            child,
            program,
            // Relative ready paths are resolved against the install directory
            ready_path: config.ready_path.as_ref().map(|p| install_dir.join(p)),
            retries: config.ready_retries.max(1),
            interval: Duration::from_millis(config.ready_interval_ms),
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Poll until the ready path exists, the server exits, or retries run out.
    pub fn wait_ready(&mut self) -> Result<Readiness> {
        for attempt in 1..=self.retries {
            if let Some(status) = self.try_wait()? {
                warn!("Server exited before becoming ready ({})", Exit::from(status));
                return Ok(Readiness::Exited(status.into()));
            }

            match &self.ready_path {
                None => return Ok(Readiness::Ready),
                Some(path) if path.exists() => {
                    debug!("Server ready after {attempt} check(s)");
                    return Ok(Readiness::Ready);
                }
                Some(_) => {}
            }

            if attempt < self.retries {
                thread::sleep(self.interval);
            }
        }
        Ok(Readiness::TimedOut)
    }

    /// Block until the server exits on its own.
    pub fn wait(mut self) -> Result<Exit> {
        let status = self
            .child
            .wait()
            .map_err(|e| ProvisionError::io(&self.program, e))?;
        Ok(status.into())
    }

    /// Send SIGTERM and reap the process.
    pub fn terminate(mut self) -> Result<Exit> {
        if let Some(status) = self.try_wait()? {
            return Ok(status.into());
        }

        let pid = Pid::from_raw(self.child.id() as i32);
        match kill(pid, Signal::SIGTERM) {
            // Already gone between try_wait and kill
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(source) => return Err(ProvisionError::Os { op: "kill", source }),
        }

        let status = self
            .child
            .wait()
            .map_err(|e| ProvisionError::io(&self.program, e))?;
        info!("Server {} terminated", self.program.display());
        Ok(status.into())
    }

    fn try_wait(&mut self) -> Result<Option<std::process::ExitStatus>> {
        self.child
            .try_wait()
            .map_err(|e| ProvisionError::io(&self.program, e))
    }
}
