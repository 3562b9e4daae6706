//! Shared constants for the load balancer
//!
//! These values are compiled into the XDP program as well, so changing
//! any of them requires rebuilding the kernel-side object.

// ============================================================================
// Destination Table
// ============================================================================

/// Number of slots in the backend destination table
pub const MAX_DESTINATIONS: u32 = 32;

/// Size in bytes of one encoded destination record
pub const DESTINATION_RECORD_SIZE: usize = 32;

/// Placeholder origin address written into every slot (10.0.0.1)
pub const PLACEHOLDER_SOURCE_ADDRESS: u32 = 0x0A00_0001;

/// Length of an Ethernet link-layer address
pub const LINK_ADDRESS_LEN: usize = 6;

// ============================================================================
// Record Field Offsets
// ============================================================================

pub const OFFSET_SOURCE_ADDRESS: usize = 0;
pub const OFFSET_DEST_ADDRESS: usize = 4;
pub const OFFSET_BYTE_COUNT: usize = 8;
pub const OFFSET_PACKET_COUNT: usize = 16;
pub const OFFSET_LINK_ADDRESS: usize = 24;

// ============================================================================
// Object Names
// ============================================================================

/// Default name of the XDP entry point inside the object file
pub const DEFAULT_PROGRAM_NAME: &str = "xdp_l4lb";

/// Default name of the backend table map inside the object file
pub const DEFAULT_TABLE_NAME: &str = "servers";
