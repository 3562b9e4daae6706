//! Kernel program attachment
//!
//! The orchestrator is written once against [`ProgramLoader`] and
//! [`ProgramHandle`]. [`AyaLoader`] talks to the real kernel; [`MemoryLoader`]
//! keeps everything in process for dry runs and tests.
//!
//! [`Session`] owns a loaded handle and walks the lifecycle
//! `Loaded -> Attached -> Detached`. Dropping an attached session detaches it.

use bytes::Bytes;
use l4lb_common::DESTINATION_RECORD_SIZE;
use log::{info, warn};
use std::path::Path;

use crate::error::{ControlError, Result};

pub mod kernel;
pub mod memory;

pub use kernel::{AyaLoader, XdpMode};
pub use memory::{MemoryLoader, MemoryTable};

/// Key-indexed table shared with the kernel program
pub trait SlotTable {
    /// Number of addressable slots
    fn capacity(&self) -> u32;

    /// Overwrite one slot with an encoded record
    fn write_slot(&mut self, slot: u32, raw: &[u8; DESTINATION_RECORD_SIZE]) -> Result<()>;

    /// Read the raw bytes currently stored in one slot
    fn read_slot(&self, slot: u32) -> Result<Bytes>;
}

/// Entry point of a loaded image, referenced by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramRef {
    name: String,
}

impl ProgramRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Loads compiled program images
pub trait ProgramLoader {
    type Handle: ProgramHandle;

    /// Read and validate a compiled image
    fn load(&self, image: &Path) -> Result<Self::Handle>;
}

/// A loaded program image and the objects inside it
pub trait ProgramHandle {
    type Table: SlotTable;
    type Link;

    /// Look up the backend table by name
    fn resolve_table(&mut self, name: &str) -> Result<Self::Table>;

    /// Look up (and prepare) an entry point by name
    fn resolve_program(&mut self, name: &str) -> Result<ProgramRef>;

    /// Bind the program to an interface's ingress path
    fn attach(&mut self, program: &ProgramRef, interface: &str) -> Result<Self::Link>;

    /// Undo a previous attach
    fn detach(&mut self, program: &ProgramRef, link: Self::Link) -> Result<()>;
}

enum SessionState<L> {
    Loaded,
    Attached { program: ProgramRef, interface: String, link: L },
    Detached,
}

/// A loaded image together with its attachment state
pub struct Session<H: ProgramHandle> {
    handle: H,
    state: SessionState<H::Link>,
}

impl<H: ProgramHandle> Session<H> {
    /// Load an image through `loader`, entering the `Loaded` state
    pub fn load<L>(loader: &L, image: &Path) -> Result<Self>
    where
        L: ProgramLoader<Handle = H>,
    {
        let handle = loader.load(image)?;
        Ok(Self {
            handle,
            state: SessionState::Loaded,
        })
    }

    pub fn resolve_table(&mut self, name: &str) -> Result<H::Table> {
        self.handle.resolve_table(name)
    }

    pub fn resolve_program(&mut self, name: &str) -> Result<ProgramRef> {
        self.handle.resolve_program(name)
    }

    /// Attach `program` to `interface`; only valid from `Loaded`
    pub fn attach(&mut self, program: ProgramRef, interface: &str) -> Result<()> {
        let reason = match self.state {
            SessionState::Loaded => None,
            SessionState::Attached { .. } => Some("program is already attached"),
            SessionState::Detached => Some("program has already been detached"),
        };
        if let Some(reason) = reason {
            return Err(ControlError::AttachFailed {
                interface: interface.to_string(),
                reason: reason.to_string(),
            });
        }

        let link = self.handle.attach(&program, interface)?;
        info!("Attached '{}' to {}", program.name(), interface);

        self.state = SessionState::Attached {
            program,
            interface: interface.to_string(),
            link,
        };
        Ok(())
    }

    /// Detach if attached. Failures are logged, never returned.
    pub fn detach(&mut self) {
        match std::mem::replace(&mut self.state, SessionState::Detached) {
            SessionState::Attached {
                program,
                interface,
                link,
            } => {
                info!("Detaching '{}' from {}", program.name(), interface);
                if let Err(e) = self.handle.detach(&program, link) {
                    warn!("Detach failed, continuing shutdown: {}", e);
                }
            }
            // Never attached, nothing to undo
            SessionState::Loaded => self.state = SessionState::Loaded,
            SessionState::Detached => {}
        }
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.state, SessionState::Attached { .. })
    }
}

impl<H: ProgramHandle> Drop for Session<H> {
    fn drop(&mut self) {
        self.detach();
    }
}
