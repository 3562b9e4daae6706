//! XDP Load Balancer - Userspace Control Plane
//!
//! Loads the XDP load balancer, attaches it to an interface, publishes
//! the backend table and prints per-backend traffic every tick.
//!
//! ## Usage
//!
//! ```bash
//! # Attach to veth0 with the backends from the default sample file
//! sudo ./l4lb --iface veth0 --elf ebpf_prog/xdp.elf
//!
//! # Inline backends, half-second refresh, JSON output
//! sudo ./l4lb -i eth1 --backend 10.0.0.5,aa:bb:cc:dd:ee:ff --interval-ms 500 --format json
//!
//! # Try it out without root against simulated traffic
//! ./l4lb --dry-run --backend 10.0.0.5,aa:bb:cc:dd:ee:ff
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use l4lb_common::MAX_DESTINATIONS;
use l4lb_control::{
    config::Args,
    loader::{AyaLoader, MemoryLoader},
    run, RunSummary,
};
use log::info;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    let config = args.runtime_config().context("Invalid configuration")?;
    let backends = args.backend_list().context("Failed to read backend list")?;

    info!("Starting XDP load balancer control plane...");
    info!("   Interface: {}", config.interface);
    info!("   Object: {:?}", config.image);
    info!("   Program: {}", config.program);
    info!("   Table: {}", config.table);
    info!("   Backends: {}", backends.len());
    info!("   Interval: {:?}", config.interval);

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let stdout = std::io::stdout();

    let summary: RunSummary = if args.dry_run {
        info!("Dry run: using in-memory table with simulated traffic");
        let loader = MemoryLoader::new()
            .with_program(&config.program)
            .with_table(&config.table, MAX_DESTINATIONS)
            .with_interface(&config.interface);
        spawn_traffic_simulator(&loader, &config.table, backends.len() as u32);

        run(&loader, &config, &backends, stdout.lock(), shutdown).await?
    } else {
        let loader = AyaLoader::new(args.xdp_mode()?);
        run(&loader, &config, &backends, stdout.lock(), shutdown).await?
    };

    info!(
        "Published {} backends, polled {} times",
        summary.published, summary.ticks
    );

    Ok(())
}

/// Play the role of the XDP program in dry runs
fn spawn_traffic_simulator(loader: &MemoryLoader, table: &str, backends: u32) {
    let Some(table) = loader.table(table) else {
        return;
    };

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        loop {
            ticker.tick().await;
            for slot in 0..backends {
                let packets = 100 * u64::from(slot + 1);
                table.add_traffic(slot, packets, packets * 1200);
            }
        }
    });
}
