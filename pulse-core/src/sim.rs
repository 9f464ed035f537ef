//! Host-side stand-ins for the hardware and transport seams.
//!
//! These back the unit tests, the integration tests, and the emulator. None
//! of them touch real hardware; time only moves when the caller moves it.

use core::cell::Cell;

use heapless::{Deque, HistoryBuf};

use crate::channel::{Inbox, Outbox};
use crate::error::ChannelFull;
use crate::gpio::{PinBank, PinUpdate};
use crate::scheduler::AlarmTimer;
use crate::time::Timestamp;

/// Number of masked writes retained by [`RecordingPins`].
pub const PIN_HISTORY_DEPTH: usize = 64;

/// Pin bank that keeps the output register in memory and remembers the most
/// recent writes.
#[derive(Clone, Debug, Default)]
pub struct RecordingPins {
    level: u32,
    write_count: u32,
    history: HistoryBuf<PinUpdate, PIN_HISTORY_DEPTH>,
}

impl RecordingPins {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of the simulated output register.
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Total masked writes performed, including those evicted from history.
    #[must_use]
    pub fn write_count(&self) -> u32 {
        self.write_count
    }

    #[must_use]
    pub fn last_write(&self) -> Option<PinUpdate> {
        self.history.recent().copied()
    }

    /// Retained writes, oldest first.
    pub fn writes(&self) -> impl Iterator<Item = &PinUpdate> + '_ {
        self.history.oldest_ordered()
    }
}

impl PinBank for RecordingPins {
    fn put_masked(&mut self, mask: u32, value: u32) {
        let update = PinUpdate { mask, value };
        self.level = update.apply_to(self.level);
        self.write_count = self.write_count.wrapping_add(1);
        self.history.write(update);
    }
}

/// Simulated microsecond counter with a single alarm slot.
///
/// Every `now()` read may advance the clock by a fixed cost, which lets tests
/// model a service pass that is slower than the waveform it drives.
#[derive(Debug, Default)]
pub struct SimAlarm {
    now: Cell<u32>,
    read_cost_us: u32,
    armed: Option<Timestamp>,
    arm_count: u32,
    overlapping_arms: u32,
}

impl SimAlarm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the counter at `start` instead of zero.
    #[must_use]
    pub fn starting_at(start: Timestamp) -> Self {
        let alarm = Self::default();
        alarm.now.set(start.as_micros());
        alarm
    }

    /// Advances the clock by `cost` on every read.
    #[must_use]
    pub fn with_read_cost_us(mut self, cost: u32) -> Self {
        self.read_cost_us = cost;
        self
    }

    /// Reads the clock without charging the read cost.
    #[must_use]
    pub fn peek_now(&self) -> Timestamp {
        Timestamp::from_micros(self.now.get())
    }

    pub fn set_now(&mut self, now: Timestamp) {
        self.now.set(now.as_micros());
    }

    pub fn advance(&mut self, micros: u32) {
        self.now.set(self.now.get().wrapping_add(micros));
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Deadline of the armed alarm, if any.
    #[must_use]
    pub fn armed_deadline(&self) -> Option<Timestamp> {
        self.armed
    }

    /// Returns `true` (and consumes the alarm) once the clock has reached
    /// the armed deadline.
    pub fn take_fired(&mut self) -> bool {
        match self.armed {
            Some(deadline) if self.peek_now().has_reached(deadline) => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn arm_count(&self) -> u32 {
        self.arm_count
    }

    /// Number of times `arm` was called while another alarm was pending.
    #[must_use]
    pub fn overlapping_arms(&self) -> u32 {
        self.overlapping_arms
    }
}

impl AlarmTimer for SimAlarm {
    fn now(&self) -> Timestamp {
        let now = self.now.get();
        self.now.set(now.wrapping_add(self.read_cost_us));
        Timestamp::from_micros(now)
    }

    fn arm(&mut self, deadline: Timestamp) {
        if self.armed.is_some() {
            self.overlapping_arms += 1;
        }
        self.armed = Some(deadline);
        self.arm_count += 1;
    }

    fn disarm(&mut self) {
        self.armed = None;
    }

    fn wait_until(&mut self, deadline: Timestamp) {
        if !self.peek_now().has_reached(deadline) {
            self.set_now(deadline);
        }
    }
}

/// Bounded FIFO implementing both channel halves.
#[derive(Debug)]
pub struct SimQueue<T, const N: usize> {
    items: Deque<T, N>,
}

impl<T, const N: usize> SimQueue<T, N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: Deque::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter()
    }
}

impl<T, const N: usize> Default for SimQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Inbox<T> for SimQueue<T, N> {
    fn try_receive(&mut self) -> Option<T> {
        self.items.pop_front()
    }
}

impl<T, const N: usize> Outbox<T> for SimQueue<T, N> {
    fn try_send(&mut self, item: T) -> Result<(), ChannelFull<T>> {
        self.items.push_back(item).map_err(ChannelFull)
    }

    fn capacity(&self) -> Option<usize> {
        Some(N)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_pins_track_level_and_history() {
        let mut pins = RecordingPins::new();
        pins.put_masked(0x3, 0x1);
        pins.put_masked(0x2, 0x2);

        assert_eq!(pins.level(), 0x3);
        assert_eq!(pins.write_count(), 2);
        assert_eq!(pins.last_write(), Some(PinUpdate { mask: 0x2, value: 0x2 }));
        assert_eq!(pins.writes().count(), 2);
    }

    #[test]
    fn read_cost_advances_clock() {
        let alarm = SimAlarm::new().with_read_cost_us(3);
        assert_eq!(alarm.now(), Timestamp::from_micros(0));
        assert_eq!(alarm.now(), Timestamp::from_micros(3));
        assert_eq!(alarm.peek_now(), Timestamp::from_micros(6));
    }

    #[test]
    fn alarm_fires_once_deadline_reached() {
        let mut alarm = SimAlarm::new();
        alarm.arm(Timestamp::from_micros(10));
        assert!(!alarm.take_fired());
        alarm.advance(10);
        assert!(alarm.take_fired());
        assert!(!alarm.is_armed());
    }

    #[test]
    fn queue_reports_full() {
        let mut queue = SimQueue::<u8, 2>::new();
        queue.try_send(1).unwrap();
        queue.try_send(2).unwrap();
        assert_eq!(queue.try_send(3).unwrap_err().into_inner(), 3);
        assert_eq!(queue.try_receive(), Some(1));
        assert_eq!(queue.drain(), 1);
    }
}
