//! eBPF program loader
//!
//! Loads the XDP object file with Aya, resolves the backend table and the
//! entry point, and attaches to a network interface.

use aya::{
    maps::{Array, MapData},
    programs::{xdp::XdpLinkId, Xdp, XdpFlags},
    Ebpf,
};
use bytes::Bytes;
use l4lb_common::DESTINATION_RECORD_SIZE;
use log::{debug, info, warn};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use super::{ProgramHandle, ProgramLoader, ProgramRef, SlotTable};
use crate::error::{ControlError, ObjectKind, Result};

/// How the XDP program is bound to the interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XdpMode {
    /// Let the kernel pick (native if supported, generic otherwise)
    #[default]
    Default,
    /// Generic mode, works on any driver
    Skb,
    /// Native driver mode
    Drv,
    /// Offloaded to the NIC
    Hw,
}

impl XdpMode {
    pub fn flags(self) -> XdpFlags {
        match self {
            XdpMode::Default => XdpFlags::default(),
            XdpMode::Skb => XdpFlags::SKB_MODE,
            XdpMode::Drv => XdpFlags::DRV_MODE,
            XdpMode::Hw => XdpFlags::HW_MODE,
        }
    }
}

impl FromStr for XdpMode {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "default" => Ok(XdpMode::Default),
            "skb" | "generic" => Ok(XdpMode::Skb),
            "drv" | "native" => Ok(XdpMode::Drv),
            "hw" | "offload" => Ok(XdpMode::Hw),
            _ => Err(ControlError::Configuration(format!(
                "unsupported XDP mode: {}. Use default, skb, drv or hw",
                s
            ))),
        }
    }
}

/// Loads object files into the running kernel
#[derive(Debug, Clone, Copy, Default)]
pub struct AyaLoader {
    mode: XdpMode,
}

impl AyaLoader {
    pub fn new(mode: XdpMode) -> Self {
        Self { mode }
    }
}

impl ProgramLoader for AyaLoader {
    type Handle = AyaProgram;

    fn load(&self, image: &Path) -> Result<AyaProgram> {
        info!("Loading eBPF object from: {:?}", image);

        let image_err = |reason: String| ControlError::ImageLoadFailed {
            path: image.to_path_buf(),
            reason,
        };

        let data = std::fs::read(image).map_err(|e| image_err(e.to_string()))?;
        let mut bpf = Ebpf::load(&data).map_err(|e| image_err(e.to_string()))?;

        // Kernel-side log records are optional
        if let Err(e) = aya_log::EbpfLogger::init(&mut bpf) {
            debug!("eBPF logging not available: {}", e);
        }

        for (name, _) in bpf.maps() {
            info!("  map: {}", name);
        }
        for (name, _) in bpf.programs() {
            info!("  program: {}", name);
        }

        info!("eBPF object loaded successfully");

        Ok(AyaProgram {
            bpf,
            path: image.to_path_buf(),
            mode: self.mode,
        })
    }
}

/// An object file loaded into the kernel
pub struct AyaProgram {
    bpf: Ebpf,
    path: PathBuf,
    mode: XdpMode,
}

impl AyaProgram {
    fn xdp_mut(&mut self, name: &str) -> Result<&mut Xdp> {
        let not_found = || ControlError::ObjectNotFound {
            kind: ObjectKind::Program,
            name: name.to_string(),
        };
        let program = self.bpf.program_mut(name).ok_or_else(not_found)?;
        program.try_into().map_err(|_| not_found())
    }
}

impl ProgramHandle for AyaProgram {
    type Table = AyaTable;
    type Link = XdpLinkId;

    fn resolve_table(&mut self, name: &str) -> Result<AyaTable> {
        let map = self
            .bpf
            .take_map(name)
            .ok_or_else(|| ControlError::ObjectNotFound {
                kind: ObjectKind::Table,
                name: name.to_string(),
            })?;

        let array = Array::try_from(map).map_err(|e| {
            warn!("Map '{}' is not an array of {}-byte values: {}", name, DESTINATION_RECORD_SIZE, e);
            ControlError::ObjectNotFound {
                kind: ObjectKind::Table,
                name: name.to_string(),
            }
        })?;

        Ok(AyaTable { array })
    }

    fn resolve_program(&mut self, name: &str) -> Result<ProgramRef> {
        let path = self.path.clone();
        let program = self.xdp_mut(name)?;
        program.load().map_err(|e| ControlError::ImageLoadFailed {
            path,
            reason: format!("kernel rejected program '{}': {}", name, e),
        })?;

        debug!("Program '{}' loaded into the kernel", name);
        Ok(ProgramRef::new(name))
    }

    fn attach(&mut self, program: &ProgramRef, interface: &str) -> Result<XdpLinkId> {
        let flags = self.mode.flags();
        let xdp = self.xdp_mut(program.name())?;
        xdp.attach(interface, flags)
            .map_err(|e| ControlError::AttachFailed {
                interface: interface.to_string(),
                reason: format!("{} - check permissions and that the interface exists", e),
            })
    }

    fn detach(&mut self, program: &ProgramRef, link: XdpLinkId) -> Result<()> {
        let xdp = self.xdp_mut(program.name())?;
        xdp.detach(link).map_err(|e| ControlError::DetachFailed {
            program: program.name().to_string(),
            reason: e.to_string(),
        })
    }
}

/// The backend table as a BPF array of raw records
pub struct AyaTable {
    array: Array<MapData, [u8; DESTINATION_RECORD_SIZE]>,
}

impl SlotTable for AyaTable {
    fn capacity(&self) -> u32 {
        self.array.len()
    }

    fn write_slot(&mut self, slot: u32, raw: &[u8; DESTINATION_RECORD_SIZE]) -> Result<()> {
        self.array
            .set(slot, raw, 0)
            .map_err(|e| ControlError::TableWriteFailed {
                slot,
                reason: e.to_string(),
            })
    }

    fn read_slot(&self, slot: u32) -> Result<Bytes> {
        let raw = self
            .array
            .get(&slot, 0)
            .map_err(|e| ControlError::TableReadFailed {
                slot,
                reason: e.to_string(),
            })?;
        Ok(Bytes::copy_from_slice(&raw))
    }
}
