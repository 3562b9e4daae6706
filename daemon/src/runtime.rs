//! Runtime orchestrator
//!
//! Sequences load, attach, publish and the poll loop, and tears the
//! attachment down again on every exit path.

use log::{error, info, warn};
use std::{future::Future, io::Write, path::PathBuf, time::Duration};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use l4lb_common::{DEFAULT_PROGRAM_NAME, DEFAULT_TABLE_NAME};

use crate::{
    error::{ControlError, Result},
    loader::{ProgramLoader, Session},
    poller::{self, PollSnapshot},
    publisher::{self, BackendDefinition},
    render::{OutputFormat, StatusRenderer},
};

/// Everything the orchestrator needs to know about one run
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Compiled XDP object file
    pub image: PathBuf,
    /// Entry point inside the image
    pub program: String,
    /// Backend table inside the image
    pub table: String,
    /// Interface to attach to
    pub interface: String,
    /// Poll period
    pub interval: Duration,
    /// Consecutive ticks with read failures before giving up
    pub max_failed_ticks: u32,
    pub format: OutputFormat,
    pub clear_screen: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            image: PathBuf::from("ebpf_prog/xdp.elf"),
            program: DEFAULT_PROGRAM_NAME.to_string(),
            table: DEFAULT_TABLE_NAME.to_string(),
            interface: "veth0".to_string(),
            interval: Duration::from_secs(1),
            max_failed_ticks: 3,
            format: OutputFormat::Text,
            clear_screen: true,
        }
    }
}

/// What a completed run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Backends written to the table
    pub published: usize,
    /// Poll ticks handled before shutdown
    pub ticks: u64,
}

/// Run the control plane until `shutdown` resolves
///
/// Shutdown is only observed between ticks, so a poll that has already
/// started always completes.
pub async fn run<L, W, F>(
    loader: &L,
    config: &RuntimeConfig,
    backends: &[BackendDefinition],
    out: W,
    shutdown: F,
) -> Result<RunSummary>
where
    L: ProgramLoader,
    W: Write,
    F: Future<Output = ()>,
{
    let mut session = Session::load(loader, &config.image)?;
    let program = session.resolve_program(&config.program)?;
    let mut table = session.resolve_table(&config.table)?;
    session.attach(program, &config.interface)?;

    // From here on, dropping `session` detaches
    let published = publisher::publish(&mut table, backends)?;

    let mut renderer = StatusRenderer::new(out, config.format, config.clear_screen, config.interval);
    renderer.banner()?;

    let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut snapshot = PollSnapshot::default();
    let mut failed_ticks = 0u32;
    let mut ticks = 0u64;

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Interrupted, shutting down...");
                break;
            }
            _ = ticker.tick() => {
                let report = poller::poll_once(&table, &snapshot, config.interval);
                ticks += 1;
                renderer.render(&report.stats)?;
                snapshot = report.snapshot;

                let Some(first) = report.failures.first() else {
                    failed_ticks = 0;
                    continue;
                };

                failed_ticks += 1;
                for failure in &report.failures {
                    warn!("Skipping slot {} this tick: {}", failure.slot, failure.error);
                }

                if failed_ticks >= config.max_failed_ticks {
                    error!("Table reads failed for {} consecutive ticks, giving up", failed_ticks);
                    return Err(ControlError::TableReadFailed {
                        slot: first.slot,
                        reason: format!("{} (failing for {} consecutive ticks)", first.error, failed_ticks),
                    });
                }
            }
        }
    }

    renderer.farewell()?;
    session.detach();

    Ok(RunSummary { published, ticks })
}
