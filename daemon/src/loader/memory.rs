//! In-process program loader
//!
//! Mirrors the kernel objects the control plane talks to so the whole
//! runtime can be exercised without privileges. Tables are shared handles:
//! cloning one from [`MemoryLoader::table`] lets a caller play the role of
//! the XDP program and bump counters while the poller reads them.

use bytes::Bytes;
use l4lb_common::{DestinationRecord, DESTINATION_RECORD_SIZE};
use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use super::{ProgramHandle, ProgramLoader, ProgramRef, SlotTable};
use crate::{
    error::{ControlError, ObjectKind, Result},
    record,
};

#[derive(Default)]
struct MemoryKernel {
    programs: HashSet<String>,
    tables: HashMap<String, MemoryTable>,
    interfaces: HashSet<String>,
    /// interface -> program currently attached to it
    attached: HashMap<String, String>,
    links: HashMap<u64, String>,
    next_link: u64,
    attach_calls: u64,
    detach_calls: u64,
    unloadable: bool,
}

/// Loader backed by process memory
#[derive(Clone, Default)]
pub struct MemoryLoader {
    kernel: Arc<Mutex<MemoryKernel>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(self, name: &str) -> Self {
        self.kernel().programs.insert(name.to_string());
        self
    }

    pub fn with_table(self, name: &str, capacity: u32) -> Self {
        self.kernel()
            .tables
            .insert(name.to_string(), MemoryTable::new(capacity));
        self
    }

    pub fn with_interface(self, name: &str) -> Self {
        self.kernel().interfaces.insert(name.to_string());
        self
    }

    /// Make every subsequent `load` fail as if the image were corrupt
    pub fn with_unloadable_image(self) -> Self {
        self.kernel().unloadable = true;
        self
    }

    /// Shared handle to a table, if one was registered
    pub fn table(&self, name: &str) -> Option<MemoryTable> {
        self.kernel().tables.get(name).cloned()
    }

    pub fn is_attached(&self, interface: &str) -> bool {
        self.kernel().attached.contains_key(interface)
    }

    pub fn attach_calls(&self) -> u64 {
        self.kernel().attach_calls
    }

    pub fn detach_calls(&self) -> u64 {
        self.kernel().detach_calls
    }

    fn kernel(&self) -> MutexGuard<'_, MemoryKernel> {
        self.kernel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgramLoader for MemoryLoader {
    type Handle = MemoryProgram;

    fn load(&self, image: &Path) -> Result<MemoryProgram> {
        if self.kernel().unloadable {
            return Err(ControlError::ImageLoadFailed {
                path: image.to_path_buf(),
                reason: "invalid object format".to_string(),
            });
        }

        Ok(MemoryProgram {
            loader: self.clone(),
        })
    }
}

/// Handle returned by [`MemoryLoader::load`]
pub struct MemoryProgram {
    loader: MemoryLoader,
}

impl ProgramHandle for MemoryProgram {
    type Table = MemoryTable;
    type Link = u64;

    fn resolve_table(&mut self, name: &str) -> Result<MemoryTable> {
        self.loader
            .table(name)
            .ok_or_else(|| ControlError::ObjectNotFound {
                kind: ObjectKind::Table,
                name: name.to_string(),
            })
    }

    fn resolve_program(&mut self, name: &str) -> Result<ProgramRef> {
        if !self.loader.kernel().programs.contains(name) {
            return Err(ControlError::ObjectNotFound {
                kind: ObjectKind::Program,
                name: name.to_string(),
            });
        }
        Ok(ProgramRef::new(name))
    }

    fn attach(&mut self, program: &ProgramRef, interface: &str) -> Result<u64> {
        let mut kernel = self.loader.kernel();
        kernel.attach_calls += 1;

        let failure = |reason: &str| ControlError::AttachFailed {
            interface: interface.to_string(),
            reason: reason.to_string(),
        };
        if !kernel.interfaces.contains(interface) {
            return Err(failure("no such device"));
        }
        if kernel.attached.contains_key(interface) {
            return Err(failure("device or resource busy"));
        }

        let link = kernel.next_link;
        kernel.next_link += 1;
        kernel
            .attached
            .insert(interface.to_string(), program.name().to_string());
        kernel.links.insert(link, interface.to_string());
        Ok(link)
    }

    fn detach(&mut self, program: &ProgramRef, link: u64) -> Result<()> {
        let mut kernel = self.loader.kernel();
        kernel.detach_calls += 1;

        let interface = kernel
            .links
            .remove(&link)
            .ok_or_else(|| ControlError::DetachFailed {
                program: program.name().to_string(),
                reason: format!("unknown link {}", link),
            })?;
        kernel.attached.remove(&interface);
        Ok(())
    }
}

#[derive(Default)]
struct TableSlots {
    slots: Vec<[u8; DESTINATION_RECORD_SIZE]>,
    failing_reads: HashSet<u32>,
    write_limit: Option<u32>,
}

/// Array table kept in memory; clones share the same slots
#[derive(Clone, Default)]
pub struct MemoryTable {
    inner: Arc<Mutex<TableSlots>>,
}

impl MemoryTable {
    pub fn new(capacity: u32) -> Self {
        let slots = TableSlots {
            slots: vec![[0u8; DESTINATION_RECORD_SIZE]; capacity as usize],
            ..Default::default()
        };
        Self {
            inner: Arc::new(Mutex::new(slots)),
        }
    }

    /// Decoded contents of one slot
    pub fn record(&self, slot: u32) -> Option<DestinationRecord> {
        let inner = self.inner();
        let raw = inner.slots.get(slot as usize)?;
        record::decode(raw).ok()
    }

    /// Account forwarded traffic to a slot, as the XDP program would
    pub fn add_traffic(&self, slot: u32, packets: u64, bytes: u64) {
        self.update(slot, |record| {
            record.packet_count = record.packet_count.wrapping_add(packets);
            record.byte_count = record.byte_count.wrapping_add(bytes);
        });
    }

    /// Zero the counters of a slot, as a program reload would
    pub fn reset_counters(&self, slot: u32) {
        self.update(slot, |record| {
            record.packet_count = 0;
            record.byte_count = 0;
        });
    }

    /// Make reads of `slot` fail until cleared
    pub fn set_read_failure(&self, slot: u32, failing: bool) {
        let mut inner = self.inner();
        if failing {
            inner.failing_reads.insert(slot);
        } else {
            inner.failing_reads.remove(&slot);
        }
    }

    /// Reject writes to any slot at or above `limit`
    pub fn set_write_limit(&self, limit: Option<u32>) {
        self.inner().write_limit = limit;
    }

    /// Number of slots that currently hold a non-zero record
    pub fn populated_slots(&self) -> u32 {
        self.inner()
            .slots
            .iter()
            .filter(|raw| raw.iter().any(|b| *b != 0))
            .count() as u32
    }

    fn update(&self, slot: u32, f: impl FnOnce(&mut DestinationRecord)) {
        let mut inner = self.inner();
        if let Some(raw) = inner.slots.get_mut(slot as usize) {
            if let Ok(mut current) = record::decode(raw.as_slice()) {
                f(&mut current);
                *raw = record::encode(&current);
            }
        }
    }

    fn inner(&self) -> MutexGuard<'_, TableSlots> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SlotTable for MemoryTable {
    fn capacity(&self) -> u32 {
        self.inner().slots.len() as u32
    }

    fn write_slot(&mut self, slot: u32, raw: &[u8; DESTINATION_RECORD_SIZE]) -> Result<()> {
        let mut inner = self.inner();
        if inner.write_limit.is_some_and(|limit| slot >= limit) {
            return Err(ControlError::TableWriteFailed {
                slot,
                reason: "argument list too long".to_string(),
            });
        }
        let target = inner
            .slots
            .get_mut(slot as usize)
            .ok_or_else(|| ControlError::TableWriteFailed {
                slot,
                reason: "index out of bounds".to_string(),
            })?;
        *target = *raw;
        Ok(())
    }

    fn read_slot(&self, slot: u32) -> Result<Bytes> {
        let inner = self.inner();
        if inner.failing_reads.contains(&slot) {
            return Err(ControlError::TableReadFailed {
                slot,
                reason: "operation not permitted".to_string(),
            });
        }
        inner
            .slots
            .get(slot as usize)
            .map(|raw| Bytes::copy_from_slice(raw))
            .ok_or_else(|| ControlError::TableReadFailed {
                slot,
                reason: "index out of bounds".to_string(),
            })
    }
}
