//! Destination record codec
//!
//! Converts between [`DestinationRecord`] and the raw little-endian bytes
//! stored in the kernel table.

use bytes::{Buf, BufMut};
use l4lb_common::{DestinationRecord, DESTINATION_RECORD_SIZE, LINK_ADDRESS_LEN};
use std::{fmt, net::Ipv4Addr, str::FromStr};

use crate::error::{ControlError, Result};

/// Encode a record into its fixed-size table representation
pub fn encode(record: &DestinationRecord) -> [u8; DESTINATION_RECORD_SIZE] {
    let mut out = [0u8; DESTINATION_RECORD_SIZE];
    let mut buf = &mut out[..];
    buf.put_u32_le(record.source_address);
    buf.put_u32_le(record.dest_address);
    buf.put_u64_le(record.byte_count);
    buf.put_u64_le(record.packet_count);
    buf.put_slice(&record.link_address);
    out
}

/// Decode a record from raw table bytes
///
/// Bytes past the record size are ignored.
pub fn decode(raw: &[u8]) -> Result<DestinationRecord> {
    if raw.len() < DESTINATION_RECORD_SIZE {
        return Err(ControlError::MalformedRecord {
            expected: DESTINATION_RECORD_SIZE,
            actual: raw.len(),
        });
    }

    let mut buf = &raw[..DESTINATION_RECORD_SIZE];
    let source_address = buf.get_u32_le();
    let dest_address = buf.get_u32_le();
    let byte_count = buf.get_u64_le();
    let packet_count = buf.get_u64_le();
    let mut link_address = [0u8; 8];
    buf.copy_to_slice(&mut link_address);

    Ok(DestinationRecord {
        source_address,
        dest_address,
        byte_count,
        packet_count,
        link_address,
    })
}

/// Table representation of an IPv4 address
///
/// The octets are read as a little-endian word so they land in memory in
/// network order, which is how the XDP program compares them.
pub fn address_to_raw(addr: Ipv4Addr) -> u32 {
    u32::from_le_bytes(addr.octets())
}

/// Inverse of [`address_to_raw`]
pub fn raw_to_address(raw: u32) -> Ipv4Addr {
    Ipv4Addr::from(raw.to_le_bytes())
}

/// Ethernet address of a backend server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkAddress(pub [u8; LINK_ADDRESS_LEN]);

impl FromStr for LinkAddress {
    type Err = ControlError;

    /// Accepts six hex octets separated by `:` or `-`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ControlError::InvalidLinkAddress(s.to_string());
        let trimmed = s.trim();

        let separator = if trimmed.contains(':') { ':' } else { '-' };
        let mut octets = [0u8; LINK_ADDRESS_LEN];
        let mut count = 0;

        for part in trimmed.split(separator) {
            // from_str_radix alone would take a sign, e.g. "+a"
            if count == LINK_ADDRESS_LEN
                || part.len() != 2
                || !part.bytes().all(|b| b.is_ascii_hexdigit())
            {
                return Err(invalid());
            }
            octets[count] = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
            count += 1;
        }

        if count != LINK_ADDRESS_LEN {
            return Err(invalid());
        }

        Ok(Self(octets))
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}
