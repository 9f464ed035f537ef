//! Timing-core event catalog and in-memory event log.
//!
//! Events encode to compact `u16` codes so the firmware can mirror them over
//! `defmt` without formatting on the timing core. Records carry a
//! monotonically increasing id; consumers remember the last id they saw and
//! ask for everything newer.

use core::fmt;

use heapless::HistoryBuf;

use crate::error::ErrorCode;
use crate::time::Timestamp;

/// Total number of records retained in memory.
pub const EVENT_LOG_CAPACITY: usize = 32;

/// Identifier assigned to every logged record.
pub type EventId = u32;

/// Lifecycle events raised by the timing core.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimingEvent {
    TaskRegistered,
    TaskRejected(ErrorCode),
    ScheduleStarted,
    ScheduleComplete,
    ScheduleAborted,
    DeadlineBacklog,
    ErrorReported(ErrorCode),
    ErrorDropped(ErrorCode),
    Custom(u16),
}

impl TimingEvent {
    const TASK_REGISTERED_CODE: u16 = 0x0001;
    const SCHEDULE_STARTED_CODE: u16 = 0x0002;
    const SCHEDULE_COMPLETE_CODE: u16 = 0x0003;
    const SCHEDULE_ABORTED_CODE: u16 = 0x0004;
    const DEADLINE_BACKLOG_CODE: u16 = 0x0005;
    const TASK_REJECTED_BASE: u16 = 0x0100;
    const ERROR_REPORTED_BASE: u16 = 0x0200;
    const ERROR_DROPPED_BASE: u16 = 0x0300;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub fn to_raw(self) -> u16 {
        match self {
            TimingEvent::TaskRegistered => Self::TASK_REGISTERED_CODE,
            TimingEvent::TaskRejected(code) => Self::TASK_REJECTED_BASE | u16::from(code.bits()),
            TimingEvent::ScheduleStarted => Self::SCHEDULE_STARTED_CODE,
            TimingEvent::ScheduleComplete => Self::SCHEDULE_COMPLETE_CODE,
            TimingEvent::ScheduleAborted => Self::SCHEDULE_ABORTED_CODE,
            TimingEvent::DeadlineBacklog => Self::DEADLINE_BACKLOG_CODE,
            TimingEvent::ErrorReported(code) => Self::ERROR_REPORTED_BASE | u16::from(code.bits()),
            TimingEvent::ErrorDropped(code) => Self::ERROR_DROPPED_BASE | u16::from(code.bits()),
            TimingEvent::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`TimingEvent::Custom`].
    #[must_use]
    pub fn from_raw(raw: u16) -> Self {
        let base = raw & 0xFF00;
        let code = u8::try_from(raw & 0x00FF).ok().and_then(ErrorCode::from_bits);
        match (base, code) {
            (Self::TASK_REJECTED_BASE, Some(code)) => TimingEvent::TaskRejected(code),
            (Self::ERROR_REPORTED_BASE, Some(code)) => TimingEvent::ErrorReported(code),
            (Self::ERROR_DROPPED_BASE, Some(code)) => TimingEvent::ErrorDropped(code),
            _ => match raw {
                Self::TASK_REGISTERED_CODE => TimingEvent::TaskRegistered,
                Self::SCHEDULE_STARTED_CODE => TimingEvent::ScheduleStarted,
                Self::SCHEDULE_COMPLETE_CODE => TimingEvent::ScheduleComplete,
                Self::SCHEDULE_ABORTED_CODE => TimingEvent::ScheduleAborted,
                Self::DEADLINE_BACKLOG_CODE => TimingEvent::DeadlineBacklog,
                other => TimingEvent::Custom(other),
            },
        }
    }
}

impl fmt::Display for TimingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingEvent::TaskRegistered => f.write_str("task-registered"),
            TimingEvent::TaskRejected(code) => write!(f, "task-rejected {code}"),
            TimingEvent::ScheduleStarted => f.write_str("schedule-started"),
            TimingEvent::ScheduleComplete => f.write_str("schedule-complete"),
            TimingEvent::ScheduleAborted => f.write_str("schedule-aborted"),
            TimingEvent::DeadlineBacklog => f.write_str("deadline-backlog"),
            TimingEvent::ErrorReported(code) => write!(f, "error-reported {code}"),
            TimingEvent::ErrorDropped(code) => write!(f, "error-dropped {code}"),
            TimingEvent::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

/// Extra metadata carried alongside an event.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum TimingPayload {
    #[default]
    None,
    /// A task entered the arena.
    Task { slot: u8, pin_mask: u32 },
    /// Number of tasks taking part in a schedule.
    Schedule { tasks: u8 },
    /// Span of a finished or aborted schedule.
    Elapsed { micros: u32 },
    /// How far behind the scheduler fell.
    Late { micros: u32 },
}

impl fmt::Display for TimingPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingPayload::None => Ok(()),
            TimingPayload::Task { slot, pin_mask } => {
                write!(f, "slot={slot} mask={pin_mask:#010x}")
            }
            TimingPayload::Schedule { tasks } => write!(f, "tasks={tasks}"),
            TimingPayload::Elapsed { micros } => write!(f, "elapsed={micros}us"),
            TimingPayload::Late { micros } => write!(f, "late={micros}us"),
        }
    }
}

/// Entry stored in the event log.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimingRecord {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub event: TimingEvent,
    pub payload: TimingPayload,
}

impl fmt::Display for TimingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} @{} {}", self.id, self.timestamp, self.event)?;
        if self.payload != TimingPayload::None {
            write!(f, " {}", self.payload)?;
        }
        Ok(())
    }
}

/// Fixed-size ring of the most recent timing records.
#[derive(Clone, Debug)]
pub struct EventLog<const CAPACITY: usize = EVENT_LOG_CAPACITY> {
    ring: HistoryBuf<TimingRecord, CAPACITY>,
    next_id: EventId,
}

impl<const CAPACITY: usize> EventLog<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_id: 0,
        }
    }

    /// Appends an event and returns its id.
    pub fn record(
        &mut self,
        event: TimingEvent,
        payload: TimingPayload,
        timestamp: Timestamp,
    ) -> EventId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.ring.write(TimingRecord {
            id,
            timestamp,
            event,
            payload,
        });
        id
    }

    /// Records in chronological order.
    pub fn oldest_first(&self) -> impl Iterator<Item = &TimingRecord> + '_ {
        self.ring.oldest_ordered()
    }

    /// Records whose id is at least `first`, oldest first.
    pub fn since(&self, first: EventId) -> impl Iterator<Item = &TimingRecord> + '_ {
        self.ring
            .oldest_ordered()
            .filter(move |record| record.id.wrapping_sub(first) < u32::MAX / 2)
    }

    /// Id the next record will receive.
    #[must_use]
    pub const fn next_id(&self) -> EventId {
        self.next_id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Returns `true` when `event` is among the retained records.
    #[must_use]
    pub fn contains(&self, event: TimingEvent) -> bool {
        self.ring.iter().any(|record| record.event == event)
    }
}

impl<const CAPACITY: usize> Default for EventLog<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_round_trip() {
        let events = [
            TimingEvent::TaskRegistered,
            TimingEvent::TaskRejected(ErrorCode::CapacityExceeded),
            TimingEvent::ScheduleStarted,
            TimingEvent::ScheduleComplete,
            TimingEvent::ScheduleAborted,
            TimingEvent::DeadlineBacklog,
            TimingEvent::ErrorReported(ErrorCode::MissedDeadline),
            TimingEvent::ErrorDropped(ErrorCode::InvalidSpecification),
        ];
        for event in events {
            assert_eq!(TimingEvent::from_raw(event.to_raw()), event);
        }
    }

    #[test]
    fn unknown_codes_fall_back_to_custom() {
        assert_eq!(TimingEvent::from_raw(0x0103), TimingEvent::Custom(0x0103));
        assert_eq!(TimingEvent::from_raw(0x7777), TimingEvent::Custom(0x7777));
    }

    #[test]
    fn log_keeps_most_recent_records() {
        let mut log = EventLog::<2>::new();
        log.record(TimingEvent::TaskRegistered, TimingPayload::None, Timestamp::ZERO);
        log.record(
            TimingEvent::ScheduleStarted,
            TimingPayload::Schedule { tasks: 1 },
            Timestamp::from_micros(5),
        );
        let last = log.record(
            TimingEvent::ScheduleComplete,
            TimingPayload::Elapsed { micros: 20 },
            Timestamp::from_micros(25),
        );

        assert_eq!(last, 2);
        assert_eq!(log.len(), 2);
        assert!(!log.contains(TimingEvent::TaskRegistered));
        let ids: heapless::Vec<EventId, 2> = log.oldest_first().map(|record| record.id).collect();
        assert_eq!(ids.as_slice(), &[1, 2]);
        assert_eq!(log.since(2).count(), 1);
        assert_eq!(log.next_id(), 3);
    }
}
