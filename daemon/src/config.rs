//! Command-line configuration
//!
//! Flags are parsed with clap and validated into a [`RuntimeConfig`].

use clap::Parser;
use std::{path::PathBuf, time::Duration};

use l4lb_common::{DEFAULT_PROGRAM_NAME, DEFAULT_TABLE_NAME};

use crate::{
    backends,
    error::{ControlError, Result},
    loader::XdpMode,
    publisher::BackendDefinition,
    render::OutputFormat,
    runtime::RuntimeConfig,
};

/// XDP layer-4 load balancer control plane
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Interface to bind the XDP program to
    #[clap(short, long, default_value = "veth0")]
    pub iface: String,

    /// clang/llvm compiled object file
    #[clap(short, long, default_value = "ebpf_prog/xdp.elf")]
    pub elf: PathBuf,

    /// Name of the XDP program (function name)
    #[clap(short, long, default_value = DEFAULT_PROGRAM_NAME)]
    pub program: String,

    /// Name of the backend table map
    #[clap(short, long, default_value = DEFAULT_TABLE_NAME)]
    pub table: String,

    /// File with one IP,MAC backend per line
    #[clap(short, long, default_value = "destination_samples/32_destinations.csv")]
    pub backends: PathBuf,

    /// Inline backend as IP,MAC (repeatable, replaces the backend file)
    #[clap(long = "backend")]
    pub inline_backends: Vec<String>,

    /// Poll interval in milliseconds
    #[clap(long, default_value_t = 1000)]
    pub interval_ms: u64,

    /// Consecutive ticks with table read failures before exiting
    #[clap(long, default_value_t = 3)]
    pub max_failed_ticks: u32,

    /// XDP attach mode (default, skb, drv, hw)
    #[clap(long, default_value = "default")]
    pub xdp_mode: String,

    /// Output format (text, json)
    #[clap(short, long, default_value = "text")]
    pub format: String,

    /// Do not clear the terminal between ticks
    #[clap(long)]
    pub no_clear: bool,

    /// Run against an in-memory table with simulated traffic
    #[clap(long)]
    pub dry_run: bool,

    /// Verbose logging
    #[clap(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Validate flags into the runtime configuration
    pub fn runtime_config(&self) -> Result<RuntimeConfig> {
        if self.iface.trim().is_empty() {
            return Err(ControlError::Configuration("--iface is required".to_string()));
        }
        if self.interval_ms == 0 {
            return Err(ControlError::Configuration("--interval-ms must be >= 1".to_string()));
        }
        if self.max_failed_ticks == 0 {
            return Err(ControlError::Configuration(
                "--max-failed-ticks must be >= 1".to_string(),
            ));
        }

        Ok(RuntimeConfig {
            image: self.elf.clone(),
            program: self.program.clone(),
            table: self.table.clone(),
            interface: self.iface.trim().to_string(),
            interval: Duration::from_millis(self.interval_ms),
            max_failed_ticks: self.max_failed_ticks,
            format: self.format.parse()?,
            clear_screen: !self.no_clear,
        })
    }

    pub fn xdp_mode(&self) -> Result<XdpMode> {
        self.xdp_mode.parse()
    }

    /// Inline backends if any were given, otherwise the backend file
    pub fn backend_list(&self) -> Result<Vec<BackendDefinition>> {
        if self.inline_backends.is_empty() {
            return backends::load_backends(&self.backends);
        }
        self.inline_backends
            .iter()
            .map(|entry| backends::parse_entry(entry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::parse_from(std::iter::once("l4lb").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        let config = args.runtime_config().unwrap();

        assert_eq!(config.interface, "veth0");
        assert_eq!(config.image, PathBuf::from("ebpf_prog/xdp.elf"));
        assert_eq!(config.program, "xdp_l4lb");
        assert_eq!(config.table, "servers");
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.max_failed_ticks, 3);
        assert_eq!(config.format, OutputFormat::Text);
        assert!(config.clear_screen);
        assert_eq!(args.xdp_mode().unwrap(), XdpMode::Default);
    }

    #[test]
    fn test_overrides() {
        let args = parse(&[
            "-i", "eth1", "--elf", "build/lb.o", "--interval-ms", "250", "--format", "json",
            "--no-clear", "--xdp-mode", "skb",
        ]);
        let config = args.runtime_config().unwrap();

        assert_eq!(config.interface, "eth1");
        assert_eq!(config.image, PathBuf::from("build/lb.o"));
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.format, OutputFormat::Json);
        assert!(!config.clear_screen);
        assert_eq!(args.xdp_mode().unwrap(), XdpMode::Skb);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            parse(&["--iface", ""]).runtime_config(),
            Err(ControlError::Configuration(_))
        ));
        assert!(parse(&["--interval-ms", "0"]).runtime_config().is_err());
        assert!(parse(&["--max-failed-ticks", "0"]).runtime_config().is_err());
        assert!(parse(&["--format", "xml"]).runtime_config().is_err());
        assert!(parse(&["--xdp-mode", "fast"]).xdp_mode().is_err());
    }

    #[test]
    fn test_inline_backends() {
        let args = parse(&[
            "--backend", "10.0.0.5,aa:bb:cc:dd:ee:ff", "--backend", "10.0.0.6, aa:bb:cc:dd:ee:fe",
        ]);
        let list = args.backend_list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1], BackendDefinition::new("10.0.0.6", "aa:bb:cc:dd:ee:fe"));
    }
}
