mod cli;

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{error, info, warn};

use vrx_provision::config::{self, ProvisionConfig};
use vrx_provision::host::{AddressFamily, HostRuntime, LocalAddress, Readiness, local_address};
use vrx_provision::install::detection::inspect_binaries;
use vrx_provision::install::{DirectoryBundle, InstallationManager, check_installation_state, check_presence};

fn main() {
    // Initialize logger with the same line format the daemon tooling expects
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .init();

    if let Err(e) = real_main() {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<()> {
    let args = cli::Args::parse();

    let cfg_path = match args.config {
        Some(path) => path,
        None => config::default_config_path()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?,
    };
    let sub = args.sub.unwrap_or(cli::Cmd::Run);

    // status never writes, not even the default config
    let cfg = if matches!(sub, cli::Cmd::Status) && !cfg_path.exists() {
        ProvisionConfig::default()
    } else {
        ProvisionConfig::load_or_create(&cfg_path)?
    };
    info!("Using config from: {}", cfg_path.display());

    match sub {
        cli::Cmd::Run => run(&cfg),
        cli::Cmd::Verify => handle_verify(&cfg),
        cli::Cmd::Status => handle_status(&cfg),
    }
}

fn manager(cfg: &ProvisionConfig) -> InstallationManager<DirectoryBundle> {
    InstallationManager::new(cfg, DirectoryBundle::new(cfg.bundle_dir.clone()))
}

/// Provision, start the server and block until it exits.
fn run(cfg: &ProvisionConfig) -> Result<()> {
    info!("Checking installation state: {:?}", check_installation_state(cfg));

    let mut runtime = HostRuntime::new(manager(cfg));
    runtime
        .initialize()
        .context("Runtime installation incomplete")?;

    let Some(server_cfg) = &cfg.server else {
        warn!("No [server] section configured; provisioning finished, nothing to start");
        return Ok(());
    };

    let mut server = runtime
        .launch_server(server_cfg)
        .context("Failed to start server")?;

    match server.wait_ready()? {
        Readiness::Ready => {
            info!("Server ready (pid {})", server.id());
            log_address();
        }
        Readiness::Exited(exit) => bail!("Server exited during startup with {exit}"),
        Readiness::TimedOut => {
            server.terminate().context("Failed to stop unresponsive server")?;
            bail!(
                "Server did not become ready after {} checks",
                server_cfg.ready_retries
            );
        }
    }

    let exit = server.wait()?;
    info!("Server exited with {exit}");
    if !exit.success() {
        bail!("Server exited with {exit}");
    }
    Ok(())
}

/// Handle verify command (Exit 0 = usable, 1 = incomplete)
fn handle_verify(cfg: &ProvisionConfig) -> Result<()> {
    if manager(cfg).verify_installation() {
        println!("installation at {} is complete", cfg.install_dir.display());
        std::process::exit(0);
    } else {
        println!("installation at {} is incomplete", cfg.install_dir.display());
        std::process::exit(1);
    }
}

/// Handle status command - read-only report
fn handle_status(cfg: &ProvisionConfig) -> Result<()> {
    println!("install dir: {}", cfg.install_dir.display());
    println!("state:       {:?}", check_installation_state(cfg));

    let sentinel = &cfg.resources.sentinel;
    println!(
        "resources:   {} {}",
        sentinel.display(),
        presence(check_presence(&cfg.install_dir, sentinel))
    );

    for bin in inspect_binaries(cfg) {
        let state = match (bin.present, bin.executable) {
            (false, _) => "missing",
            (true, false) => "present, not executable",
            (true, true) => "ok",
        };
        println!("binary:      {} {state}", display_rel(cfg, &bin.path).display());
    }

    match local_address(AddressFamily::V4) {
        Ok(LocalAddress::Found(addr)) => println!("address:     {addr}"),
        Ok(LocalAddress::NoInterface) => println!("address:     no network interface"),
        Err(e) => println!("address:     lookup failed ({e})"),
    }
    Ok(())
}

fn log_address() {
    match local_address(AddressFamily::V4) {
        Ok(LocalAddress::Found(addr)) => info!("Clients can connect to {addr}"),
        Ok(LocalAddress::NoInterface) => warn!("No network interface; only local clients can connect"),
        Err(e) => warn!("Could not determine local address: {e}"),
    }
}

fn presence(present: bool) -> &'static str {
    if present { "ok" } else { "missing" }
}

fn display_rel(cfg: &ProvisionConfig, path: &std::path::Path) -> PathBuf {
    path.strip_prefix(&cfg.install_dir)
        .map(PathBuf::from)
        .unwrap_or_else(|_| path.to_path_buf())
}
