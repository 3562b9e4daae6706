//! Statistics poller
//!
//! Reads every table slot, turns the cumulative kernel counters into
//! per-period rates and hands back the snapshot for the next tick.

use l4lb_common::{DestinationRecord, MAX_DESTINATIONS};
use log::warn;
use serde::Serialize;
use std::{fmt, net::Ipv4Addr, time::Duration};

use crate::{error::ControlError, loader::SlotTable, record};

/// Last record seen per slot, indexed by slot number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSnapshot {
    records: Vec<DestinationRecord>,
}

impl Default for PollSnapshot {
    fn default() -> Self {
        Self {
            records: vec![DestinationRecord::default(); MAX_DESTINATIONS as usize],
        }
    }
}

impl PollSnapshot {
    pub fn get(&self, slot: u32) -> DestinationRecord {
        self.records.get(slot as usize).copied().unwrap_or_default()
    }

    fn set(&mut self, slot: u32, record: DestinationRecord) {
        if let Some(entry) = self.records.get_mut(slot as usize) {
            *entry = record;
        }
    }
}

/// Per-destination rates computed for one tick
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DestinationStats {
    pub slot: u32,
    pub address: Ipv4Addr,
    /// Cumulative packets since attach
    pub packets: u64,
    /// Packets since the previous tick
    pub packet_delta: u64,
    /// `packet_delta` normalised to one second
    ///
    /// This is the text "pps" column. It equals `packet_delta` only at the
    /// default 1000 ms interval; with any other `--interval-ms` the column
    /// is scaled and `packet_delta` stays the raw per-tick count.
    pub packets_per_sec: u64,
    /// Cumulative bytes since attach
    pub bytes: u64,
    /// Bytes since the previous tick
    pub byte_delta: u64,
    pub kilobytes: u64,
    pub megabits_per_sec: u64,
    /// Counters went backwards since the previous tick
    pub counter_reset: bool,
}

impl DestinationStats {
    /// Compare `current` against `previous` over a tick of length `period`
    pub fn compute(slot: u32, current: &DestinationRecord, previous: &DestinationRecord, period: Duration) -> Self {
        let (packet_delta, packets_reset) = counter_delta(current.packet_count, previous.packet_count);
        let (byte_delta, bytes_reset) = counter_delta(current.byte_count, previous.byte_count);

        Self {
            slot,
            address: record::raw_to_address(current.dest_address),
            packets: current.packet_count,
            packet_delta,
            packets_per_sec: per_second(packet_delta, period),
            bytes: current.byte_count,
            byte_delta,
            kilobytes: current.byte_count / 1000,
            megabits_per_sec: megabits_per_sec(byte_delta, period),
            counter_reset: packets_reset || bytes_reset,
        }
    }
}

impl fmt::Display for DestinationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<12} {:>11} pkts ( {:>10} pps ) {:>11} Kbytes ( {:>6} Mbits/s )",
            self.address.to_string(),
            self.packets,
            self.packets_per_sec,
            self.kilobytes,
            self.megabits_per_sec
        )
    }
}

/// Growth of a monotonic counter
///
/// A counter smaller than before means it was reset; the whole current
/// value is then the growth since the reset.
pub fn counter_delta(current: u64, previous: u64) -> (u64, bool) {
    match current.checked_sub(previous) {
        Some(delta) => (delta, false),
        None => (current, true),
    }
}

fn period_millis(period: Duration) -> u128 {
    period.as_millis().max(1)
}

fn per_second(delta: u64, period: Duration) -> u64 {
    let rate = u128::from(delta) * 1000 / period_millis(period);
    u64::try_from(rate).unwrap_or(u64::MAX)
}

/// Floor of `byte_delta * 8 / seconds / 1_000_000`
pub fn megabits_per_sec(byte_delta: u64, period: Duration) -> u64 {
    let rate = u128::from(byte_delta) * 8 * 1000 / (1_000_000 * period_millis(period));
    u64::try_from(rate).unwrap_or(u64::MAX)
}

/// A slot that could not be read this tick
#[derive(Debug)]
pub struct SlotFailure {
    pub slot: u32,
    pub error: ControlError,
}

/// Outcome of one poll
#[derive(Debug)]
pub struct PollReport {
    /// Snapshot to pass to the next poll
    pub snapshot: PollSnapshot,
    /// Successfully read slots, ascending
    pub stats: Vec<DestinationStats>,
    pub failures: Vec<SlotFailure>,
}

/// Read all slots once and compute rates against `previous`
///
/// Slots that fail to read or decode keep their previous snapshot entry
/// and are reported in [`PollReport::failures`].
pub fn poll_once<T: SlotTable>(table: &T, previous: &PollSnapshot, period: Duration) -> PollReport {
    let slots = table.capacity().min(MAX_DESTINATIONS);
    let mut snapshot = previous.clone();
    let mut stats = Vec::with_capacity(slots as usize);
    let mut failures = Vec::new();

    for slot in 0..slots {
        let current = match table.read_slot(slot).and_then(|raw| record::decode(&raw)) {
            Ok(current) => current,
            Err(error) => {
                failures.push(SlotFailure { slot, error });
                continue;
            }
        };

        let entry = DestinationStats::compute(slot, &current, &previous.get(slot), period);
        if entry.counter_reset {
            warn!("Counters for slot {} ({}) went backwards, treating as reset", slot, entry.address);
        }

        stats.push(entry);
        snapshot.set(slot, current);
    }

    PollReport {
        snapshot,
        stats,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        loader::MemoryTable,
        publisher::{publish, BackendDefinition},
    };
    use proptest::prelude::*;

    const SECOND: Duration = Duration::from_secs(1);

    fn record_with(packets: u64, bytes: u64) -> DestinationRecord {
        DestinationRecord {
            packet_count: packets,
            byte_count: bytes,
            ..DestinationRecord::new(record::address_to_raw(Ipv4Addr::new(10, 0, 0, 5)), [0xaa; 6])
        }
    }

    #[test]
    fn test_first_tick_equals_cumulative() {
        let current = record_with(1234, 987_654);
        let stats = DestinationStats::compute(0, &current, &DestinationRecord::default(), SECOND);

        assert_eq!(stats.packet_delta, current.packet_count);
        assert_eq!(stats.byte_delta, current.byte_count);
        assert!(!stats.counter_reset);
    }

    #[test]
    fn test_increasing_counters_non_negative() {
        let mut previous = record_with(0, 0);
        for step in 1..50u64 {
            let current = record_with(previous.packet_count + step * 3, previous.byte_count + step * 1500);
            let stats = DestinationStats::compute(0, &current, &previous, SECOND);
            assert_eq!(stats.packet_delta, step * 3);
            assert_eq!(stats.byte_delta, step * 1500);
            assert!(!stats.counter_reset);
            previous = current;
        }
    }

    #[test]
    fn test_counter_reset() {
        let previous = record_with(5000, 4_000_000);
        let current = record_with(10, 640);
        let stats = DestinationStats::compute(0, &current, &previous, SECOND);

        assert!(stats.counter_reset);
        assert_eq!(stats.packet_delta, 10);
        assert_eq!(stats.byte_delta, 640);
    }

    #[test]
    fn test_rates() {
        // 125_000 bytes in one second is exactly one megabit
        assert_eq!(megabits_per_sec(125_000, SECOND), 1);
        assert_eq!(megabits_per_sec(124_999, SECOND), 0);
        assert_eq!(megabits_per_sec(125_000, Duration::from_millis(500)), 2);
        assert_eq!(megabits_per_sec(u64::MAX, SECOND), u64::MAX / 125_000);
        assert_eq!(per_second(50, Duration::from_millis(500)), 100);
        assert_eq!(per_second(7, Duration::ZERO), 7000);
    }

    #[test]
    fn test_pps_column_scales_with_interval() {
        let previous = record_with(1000, 0);
        let current = record_with(1050, 0);
        let stats = DestinationStats::compute(0, &current, &previous, Duration::from_millis(500));

        assert_eq!(stats.packet_delta, 50);
        assert_eq!(stats.packets_per_sec, 100);
        assert!(stats.to_string().contains("(        100 pps )"));

        let stats = DestinationStats::compute(0, &current, &previous, SECOND);
        assert_eq!(stats.packets_per_sec, stats.packet_delta);
    }

    #[test]
    fn test_scenario_line() {
        let mut table = MemoryTable::new(32);
        publish(&mut table, &[BackendDefinition::new("10.0.0.5", "aa:bb:cc:dd:ee:ff")]).unwrap();
        table.add_traffic(0, 100, 64_000);

        let report = poll_once(&table, &PollSnapshot::default(), SECOND);
        assert!(report.failures.is_empty());
        assert_eq!(report.stats.len(), 32);

        let first = &report.stats[0];
        assert_eq!(first.packets, 100);
        assert_eq!(first.packet_delta, 100);
        assert_eq!(first.kilobytes, 64);
        assert_eq!(first.megabits_per_sec, 0);
        assert_eq!(
            first.to_string(),
            "10.0.0.5             100 pkts (        100 pps )          64 Kbytes (      0 Mbits/s )"
        );
    }

    #[test]
    fn test_snapshot_threads_through_ticks() {
        let mut table = MemoryTable::new(32);
        publish(&mut table, &[BackendDefinition::new("10.0.0.5", "aa:bb:cc:dd:ee:ff")]).unwrap();

        table.add_traffic(0, 100, 64_000);
        let first = poll_once(&table, &PollSnapshot::default(), SECOND);

        table.add_traffic(0, 40, 2_000_000);
        let second = poll_once(&table, &first.snapshot, SECOND);

        let stats = &second.stats[0];
        assert_eq!(stats.packets, 140);
        assert_eq!(stats.packet_delta, 40);
        assert_eq!(stats.byte_delta, 2_000_000);
        assert_eq!(stats.megabits_per_sec, 16);
        assert_eq!(second.snapshot.get(0).packet_count, 140);
    }

    #[test]
    fn test_slots_in_ascending_order() {
        let mut table = MemoryTable::new(32);
        let list: Vec<_> = (0..5)
            .map(|i| BackendDefinition::new(format!("172.16.0.{}", i + 1), "02:00:00:00:00:01"))
            .collect();
        publish(&mut table, &list).unwrap();

        let report = poll_once(&table, &PollSnapshot::default(), SECOND);
        let slots: Vec<u32> = report.stats.iter().map(|s| s.slot).collect();
        assert_eq!(slots, (0..32).collect::<Vec<_>>());
        assert_eq!(report.stats[4].address, Ipv4Addr::new(172, 16, 0, 5));
    }

    #[test]
    fn test_failed_slot_is_isolated() {
        let mut table = MemoryTable::new(32);
        let list = vec![
            BackendDefinition::new("10.0.0.5", "aa:bb:cc:dd:ee:ff"),
            BackendDefinition::new("10.0.0.6", "aa:bb:cc:dd:ee:fe"),
        ];
        publish(&mut table, &list).unwrap();
        table.add_traffic(1, 10, 1000);

        let first = poll_once(&table, &PollSnapshot::default(), SECOND);
        table.add_traffic(1, 5, 500);
        table.set_read_failure(1, true);

        let second = poll_once(&table, &first.snapshot, SECOND);
        assert_eq!(second.failures.len(), 1);
        assert_eq!(second.failures[0].slot, 1);
        assert!(matches!(second.failures[0].error, ControlError::TableReadFailed { slot: 1, .. }));
        assert_eq!(second.stats.len(), 31);
        assert!(second.stats.iter().all(|s| s.slot != 1));
        // Failed slot keeps its old snapshot entry
        assert_eq!(second.snapshot.get(1).packet_count, 10);

        table.set_read_failure(1, false);
        let third = poll_once(&table, &second.snapshot, SECOND);
        let recovered = third.stats.iter().find(|s| s.slot == 1).unwrap();
        assert_eq!(recovered.packet_delta, 5);
    }

    proptest! {
        #[test]
        fn test_growing_counter_delta_is_growth(previous in any::<u64>(), growth in any::<u64>()) {
            let growth = growth.min(u64::MAX - previous);
            prop_assert_eq!(counter_delta(previous + growth, previous), (growth, false));
        }

        #[test]
        fn test_any_first_tick_equals_cumulative(
            packets in any::<u64>(),
            bytes in any::<u64>(),
            period_ms in 1u64..10_000,
        ) {
            let current = record_with(packets, bytes);
            let stats = DestinationStats::compute(
                0,
                &current,
                &DestinationRecord::default(),
                Duration::from_millis(period_ms),
            );
            prop_assert_eq!(stats.packet_delta, packets);
            prop_assert_eq!(stats.byte_delta, bytes);
            prop_assert!(!stats.counter_reset);
        }

        #[test]
        fn test_rates_never_decrease_with_traffic(
            delta in any::<u64>(),
            extra in any::<u64>(),
            period_ms in 1u64..10_000,
        ) {
            let period = Duration::from_millis(period_ms);
            let more = delta.saturating_add(extra);
            prop_assert!(megabits_per_sec(more, period) >= megabits_per_sec(delta, period));
            prop_assert!(per_second(more, period) >= per_second(delta, period));
        }
    }
}
