//! External process invocation
//!
//! Two shapes are needed by the installer:
//! - `run`: spawn and block until exit. The exit is handed back to the caller
//!   but never turned into an error here; only spawn/wait failures are.
//! - `spawn_detached`: spawn and return immediately. Completion is never
//!   observed.
//!
//! The [`ProcessRunner`] trait is the seam the installation manager is written
//! against so invocations can be recorded in tests.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use log::debug;

use super::error::{ProvisionError, Result};

/// How a finished process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Code(i32),
    /// Terminated by a signal (no exit code available)
    Signal,
}

impl Exit {
    pub fn success(self) -> bool {
        matches!(self, Exit::Code(0))
    }
}

impl From<ExitStatus> for Exit {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => Exit::Code(code),
            None => Exit::Signal,
        }
    }
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exit::Code(code) => write!(f, "exit code {code}"),
            Exit::Signal => f.write_str("a signal"),
        }
    }
}

/// A fully described external command: program, arguments, working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }

    fn spawn_error(&self, source: std::io::Error) -> ProvisionError {
        ProvisionError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

pub trait ProcessRunner {
    /// Spawn `inv` and block until it exits.
    fn run(&self, inv: &Invocation) -> Result<Exit>;

    /// Spawn `inv` without waiting for it.
    fn spawn_detached(&self, inv: &Invocation) -> Result<()>;
}

impl<T: ProcessRunner + ?Sized> ProcessRunner for &T {
    fn run(&self, inv: &Invocation) -> Result<Exit> {
        (**self).run(inv)
    }

    fn spawn_detached(&self, inv: &Invocation) -> Result<()> {
        (**self).spawn_detached(inv)
    }
}

/// [`ProcessRunner`] backed by `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, inv: &Invocation) -> Result<Exit> {
        debug!("Running '{inv}'");
        let status = inv
            .command()
            .stdin(Stdio::null())
            .status()
            .map_err(|e| inv.spawn_error(e))?;
        Ok(status.into())
    }

    fn spawn_detached(&self, inv: &Invocation) -> Result<()> {
        debug!("Spawning '{inv}' (not waiting)");
        let child = inv
            .command()
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| inv.spawn_error(e))?;
        // Dropping the handle neither waits nor kills.
        drop(child);
        Ok(())
    }
}

/// Build the permission fix-up invocation: `<tool> <mode> <dir>/<path>`.
pub fn permission_invocation(tool: &Path, mode: &str, install_dir: &Path, path: &Path) -> Invocation {
    Invocation::new(tool)
        .arg(mode)
        .arg(install_dir.join(path))
        .current_dir(install_dir)
}
