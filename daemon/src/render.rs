//! Status output
//!
//! Writes one block of destination lines per tick, either as the classic
//! terminal table or as one JSON document per line.

use serde::Serialize;
use std::{io::Write, str::FromStr, time::Duration};

use crate::{
    error::{ControlError, Result},
    poller::DestinationStats,
};

const CLEAR_SCREEN: &str = "\x1b[H\x1b[2J";

/// Status output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human readable table, redrawn every tick
    #[default]
    Text,
    /// One JSON object per tick
    Json,
}

impl FromStr for OutputFormat {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(ControlError::Configuration(format!(
                "unsupported format: {}. Use text or json",
                s
            ))),
        }
    }
}

#[derive(Serialize)]
struct TickReport<'a> {
    timestamp: String,
    interval_ms: u64,
    destinations: &'a [DestinationStats],
}

/// Renders poll results to a writer
pub struct StatusRenderer<W: Write> {
    out: W,
    format: OutputFormat,
    clear_screen: bool,
    interval: Duration,
}

impl<W: Write> StatusRenderer<W> {
    pub fn new(out: W, format: OutputFormat, clear_screen: bool, interval: Duration) -> Self {
        Self {
            out,
            format,
            clear_screen,
            interval,
        }
    }

    /// Announce that polling has started
    pub fn banner(&mut self) -> Result<()> {
        if self.format == OutputFormat::Text {
            writeln!(
                self.out,
                "XDP program successfully loaded and attached. Counters refreshed every {:?}.",
                self.interval
            )?;
            writeln!(self.out)?;
            self.out.flush()?;
        }
        Ok(())
    }

    pub fn render(&mut self, stats: &[DestinationStats]) -> Result<()> {
        match self.format {
            OutputFormat::Text => {
                if self.clear_screen {
                    write!(self.out, "{}", CLEAR_SCREEN)?;
                }
                for entry in stats {
                    writeln!(self.out, "{}", entry)?;
                }
            }
            OutputFormat::Json => {
                let report = TickReport {
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    interval_ms: u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
                    destinations: stats,
                };
                serde_json::to_writer(&mut self.out, &report).map_err(std::io::Error::from)?;
                writeln!(self.out)?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    /// Final line printed on shutdown
    pub fn farewell(&mut self) -> Result<()> {
        if self.format == OutputFormat::Text {
            writeln!(self.out, "\nDetaching program and exit")?;
            self.out.flush()?;
        }
        Ok(())
    }
}
