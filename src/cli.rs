use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "vrx runtime provisioner")]
pub struct Args {
    /// Path to configuration file (default: ~/.config/vrx/provision.toml)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Sub‑commands (run, verify, status)
    #[command(subcommand)]
    pub sub: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Provision, then start the server and wait for it (default if no sub‑command)
    Run,
    /// Provision only (Exit 0 = usable, 1 = incomplete)
    Verify,
    /// Show what is installed without changing anything
    Status,
}
