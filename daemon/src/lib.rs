//! XDP Load Balancer Control Plane Library
//!
//! Loads the XDP program, publishes the backend table and turns the
//! kernel's per-backend counters into rates.

pub mod backends;
pub mod config;
pub mod error;
pub mod loader;
pub mod poller;
pub mod publisher;
pub mod record;
pub mod render;
pub mod runtime;

pub use error::{ControlError, Result};
pub use loader::{AyaLoader, MemoryLoader, ProgramHandle, ProgramLoader, Session, SlotTable};
pub use poller::{poll_once, DestinationStats, PollReport, PollSnapshot};
pub use publisher::{publish, BackendDefinition};
pub use render::OutputFormat;
pub use runtime::{run, RunSummary, RuntimeConfig};
