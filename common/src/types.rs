//! Data structures shared between kernel and userspace
//!
//! The layout of these structures is the contract with the XDP program.
//! There is no versioning, so any drift corrupts the counters silently.

use crate::constants::*;

/// One backend server slot in the destination table
///
/// Address fields are written once by userspace; the counters are owned
/// by the XDP program and only grow while the program stays attached.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DestinationRecord {
    /// Origin address placed in forwarded packets
    pub source_address: u32,
    /// Backend IPv4 address, octets in memory order
    pub dest_address: u32,
    /// Cumulative bytes forwarded to this backend
    pub byte_count: u64,
    /// Cumulative packets forwarded to this backend
    pub packet_count: u64,
    /// Backend MAC address followed by two bytes of padding
    pub link_address: [u8; 8],
}

impl DestinationRecord {
    /// Record for a freshly published backend with zeroed counters
    pub const fn new(dest_address: u32, mac: [u8; LINK_ADDRESS_LEN]) -> Self {
        Self {
            source_address: PLACEHOLDER_SOURCE_ADDRESS,
            dest_address,
            byte_count: 0,
            packet_count: 0,
            link_address: [mac[0], mac[1], mac[2], mac[3], mac[4], mac[5], 0, 0],
        }
    }

    /// The six meaningful bytes of the link address
    pub fn mac(&self) -> [u8; LINK_ADDRESS_LEN] {
        let mut mac = [0u8; LINK_ADDRESS_LEN];
        mac.copy_from_slice(&self.link_address[..LINK_ADDRESS_LEN]);
        mac
    }
}

// Compile-time layout checks against the kernel program's struct
const _: () = {
    assert!(core::mem::size_of::<DestinationRecord>() == DESTINATION_RECORD_SIZE);
    assert!(core::mem::offset_of!(DestinationRecord, source_address) == OFFSET_SOURCE_ADDRESS);
    assert!(core::mem::offset_of!(DestinationRecord, dest_address) == OFFSET_DEST_ADDRESS);
    assert!(core::mem::offset_of!(DestinationRecord, byte_count) == OFFSET_BYTE_COUNT);
    assert!(core::mem::offset_of!(DestinationRecord, packet_count) == OFFSET_PACKET_COUNT);
    assert!(core::mem::offset_of!(DestinationRecord, link_address) == OFFSET_LINK_ADDRESS);
};
