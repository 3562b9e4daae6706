//! Destination table publisher
//!
//! Writes the backend list into the shared table once, before polling
//! starts. Slot `i` always holds the `i`-th backend.

use l4lb_common::{DestinationRecord, MAX_DESTINATIONS};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

use crate::{
    error::{ControlError, Result},
    loader::SlotTable,
    record::{self, LinkAddress},
};

/// One backend server as supplied by the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDefinition {
    /// IPv4 address (IPv4-mapped IPv6 is accepted)
    pub address: String,
    /// Ethernet address, `aa:bb:cc:dd:ee:ff`
    pub link_address: String,
}

impl BackendDefinition {
    pub fn new(address: impl Into<String>, link_address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            link_address: link_address.into(),
        }
    }

    /// Build the table record for this backend
    pub fn to_record(&self) -> Result<DestinationRecord> {
        let addr = parse_ipv4(&self.address)?;
        let mac: LinkAddress = self.link_address.parse()?;
        Ok(DestinationRecord::new(record::address_to_raw(addr), mac.0))
    }
}

fn parse_ipv4(s: &str) -> Result<Ipv4Addr> {
    match s.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(addr)) => Ok(addr),
        Ok(IpAddr::V6(addr)) => addr
            .to_ipv4_mapped()
            .ok_or_else(|| ControlError::InvalidAddress(s.to_string())),
        Err(_) => Err(ControlError::InvalidAddress(s.to_string())),
    }
}

/// Publish `backends` into `table`, returning the number of slots written
///
/// Every entry is validated before the first write, so a bad list never
/// leaves a partially populated table behind.
pub fn publish<T: SlotTable>(table: &mut T, backends: &[BackendDefinition]) -> Result<usize> {
    if backends.is_empty() {
        return Err(ControlError::EmptyBackendList);
    }

    let capacity = table.capacity().min(MAX_DESTINATIONS);
    if backends.len() > capacity as usize {
        return Err(ControlError::CapacityExceeded {
            count: backends.len(),
            capacity,
        });
    }

    let records = backends
        .iter()
        .map(BackendDefinition::to_record)
        .collect::<Result<Vec<_>>>()?;

    for (slot, rec) in (0u32..).zip(&records) {
        table.write_slot(slot, &record::encode(rec))?;
        debug!(
            "  slot {:>2}: {} ({})",
            slot,
            record::raw_to_address(rec.dest_address),
            LinkAddress(rec.mac())
        );
    }

    info!("Published {} backends to the destination table", records.len());
    Ok(records.len())
}
