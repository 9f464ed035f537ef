//! Logging helpers that mirror the timing core's event log.
//!
//! The timing core only appends to its in-memory [`EventLog`]; this module
//! walks the records added since the last call and forwards them to defmt on
//! the target or stdout on host builds.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use heapless::Vec;
use pulse_core::telemetry::{EventId, EventLog, TimingRecord};

/// Records copied out of the event log per call.
pub const MIRROR_BATCH: usize = 8;

/// Remembers which records have already been collected.
pub struct TelemetryMirror {
    next: EventId,
}

impl TelemetryMirror {
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Copies up to [`MIRROR_BATCH`] records newer than the previous call.
    /// Anything left over is picked up next time.
    pub fn collect<const CAPACITY: usize>(
        &mut self,
        log: &EventLog<CAPACITY>,
    ) -> Vec<TimingRecord, MIRROR_BATCH> {
        let mut batch = Vec::new();
        if log.next_id() == self.next {
            return batch;
        }
        for record in log.since(self.next) {
            if batch.push(*record).is_err() {
                break;
            }
            self.next = record.id.wrapping_add(1);
        }
        batch
    }
}

impl Default for TelemetryMirror {
    fn default() -> Self {
        Self::new()
    }
}

pub fn emit_all(records: &[TimingRecord]) {
    for record in records {
        emit_log(record);
    }
}

#[cfg(target_os = "none")]
fn emit_log(record: &TimingRecord) {
    defmt::info!(
        "telemetry:timing #{} t={}us {} {}",
        record.id,
        record.timestamp.as_micros(),
        defmt::Display2Format(&record.event),
        defmt::Display2Format(&record.payload)
    );
}

#[cfg(not(target_os = "none"))]
fn emit_log(record: &TimingRecord) {
    println!(
        "telemetry:timing #{} t={}us {} {}",
        record.id,
        record.timestamp.as_micros(),
        record.event,
        record.payload
    );
}
