// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # AEGIS Netboot Daemon
//!
//! The `netbootd` binary serves a legacy workstation class its boot
//! image and installer payload over BOOTP, TFTP, BFS and RSH, answering
//! everything from one read-only install archive.
//!
//! ## Usage
//!
//! - `netbootd 192.168.7.1` - serve on the standard privileged ports
//! - `netbootd 127.0.0.1 --archive ./netinstall.tar --tftp-port 6969` -
//!   unprivileged testing setup
//! - `--single-thread` - run every daemon on one current-thread runtime
//!   (degraded mode for constrained hosts)

use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use netboot_core::application::{NetbootConfig, NetbootServer};
use tracing::info;

/// AEGIS Netboot - boot and install server for legacy workstations
#[derive(Parser)]
#[command(name = "netbootd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Address to bind every protocol socket on
    address: Ipv4Addr,

    /// Path to the install-asset archive
    #[arg(
        long,
        env = "NETBOOT_ARCHIVE",
        value_name = "FILE",
        default_value = "netinstall.tar"
    )]
    archive: PathBuf,

    /// BOOTP port
    #[arg(long, env = "NETBOOT_BOOTP_PORT", default_value = "67")]
    bootp_port: u16,

    /// TFTP port
    #[arg(long, env = "NETBOOT_TFTP_PORT", default_value = "69")]
    tftp_port: u16,

    /// BFS port
    #[arg(long, env = "NETBOOT_BFS_PORT", default_value = "2201")]
    bfs_port: u16,

    /// RSH port
    #[arg(long, env = "NETBOOT_RSH_PORT", default_value = "514")]
    rsh_port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "NETBOOT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Run all daemons on a single-threaded runtime
    #[arg(long)]
    single_thread: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let mut config = NetbootConfig::new(cli.address, cli.archive);
    config.bootp_port = cli.bootp_port;
    config.tftp_port = cli.tftp_port;
    config.bfs_port = cli.bfs_port;
    config.rsh_port = cli.rsh_port;

    let server = NetbootServer::new(config).context("Failed to start netboot server")?;

    let runtime = if cli.single_thread {
        info!("running on a single-threaded runtime");
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
    } else {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
    }
    .context("Failed to build async runtime")?;

    runtime
        .block_on(server.run())
        .context("Netboot server failed")
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
