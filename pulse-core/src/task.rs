//! Pulse-train state machine.
//!
//! A [`PulseTask`] alternates between [`PhaseState::Low`] and
//! [`PhaseState::High`], tracking the absolute deadline of its next edge. Edge
//! times are derived from the previous deadline rather than the time the
//! update actually ran, so a late service pass never accumulates drift.

use core::cmp::Ordering;

use crate::error::SpecError;
use crate::gpio::{Level, PinBank, PinUpdate};
use crate::time::{MAX_COMPARABLE_SPAN_US, Timestamp};

/// Current half of the waveform.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PhaseState {
    Low,
    High,
}

/// Immutable waveform parameters for a pulse train.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PulseParams {
    /// Phase offset before the first rising edge.
    pub delay_us: u32,
    /// Duration of the active phase.
    pub on_us: u32,
    /// Full cycle length.
    pub period_us: u32,
    /// Output pins driven together.
    pub pin_mask: u32,
    /// Number of periods to emit; `0` repeats forever.
    pub repeat_count: u32,
    /// Drive the active phase low instead of high.
    pub invert: bool,
}

impl PulseParams {
    /// Creates an infinitely repeating, non-inverted pulse train.
    pub const fn new(delay_us: u32, on_us: u32, period_us: u32, pin_mask: u32) -> Self {
        Self {
            delay_us,
            on_us,
            period_us,
            pin_mask,
            repeat_count: 0,
            invert: false,
        }
    }

    /// Limits the train to `count` periods (`0` keeps it infinite).
    #[must_use]
    pub const fn with_repeat_count(mut self, count: u32) -> Self {
        self.repeat_count = count;
        self
    }

    /// Selects output polarity.
    #[must_use]
    pub const fn with_invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    /// Checks the waveform invariants.
    pub const fn validate(&self) -> Result<(), SpecError> {
        if self.pin_mask == 0 {
            return Err(SpecError::EmptyPinMask);
        }
        if self.period_us == 0 {
            return Err(SpecError::ZeroPeriod);
        }
        if self.on_us > self.period_us {
            return Err(SpecError::OnTimeExceedsPeriod {
                on_us: self.on_us,
                period_us: self.period_us,
            });
        }
        if self.period_us > MAX_COMPARABLE_SPAN_US {
            return Err(SpecError::DurationOutOfRange {
                micros: self.period_us,
            });
        }
        if self.delay_us > MAX_COMPARABLE_SPAN_US {
            return Err(SpecError::DurationOutOfRange {
                micros: self.delay_us,
            });
        }
        Ok(())
    }
}

/// Bookkeeping for one pulse train.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PulseTask {
    params: PulseParams,
    phase_state: PhaseState,
    cycles_done: u32,
    start_time_us: Timestamp,
    /// Rising-edge time of the current cycle.
    cycle_start_us: Timestamp,
    next_deadline_us: Timestamp,
    retired: bool,
}

impl PulseTask {
    /// Validates `params` and builds a task referenced to time zero.
    ///
    /// Call [`PulseTask::start_at_time`] before driving the task.
    pub fn new(params: PulseParams) -> Result<Self, SpecError> {
        params.validate()?;
        let mut task = Self {
            params,
            phase_state: PhaseState::Low,
            cycles_done: 0,
            start_time_us: Timestamp::ZERO,
            cycle_start_us: Timestamp::ZERO,
            next_deadline_us: Timestamp::ZERO,
            retired: false,
        };
        task.start_at_time(Timestamp::ZERO);
        Ok(task)
    }

    pub const fn params(&self) -> &PulseParams {
        &self.params
    }

    pub const fn pin_mask(&self) -> u32 {
        self.params.pin_mask
    }

    pub const fn phase_state(&self) -> PhaseState {
        self.phase_state
    }

    pub const fn cycles_done(&self) -> u32 {
        self.cycles_done
    }

    pub const fn start_time(&self) -> Timestamp {
        self.start_time_us
    }

    /// Absolute time of the next required transition.
    pub const fn next_deadline(&self) -> Timestamp {
        self.next_deadline_us
    }

    /// Returns `true` once the task has been torn down by a reset.
    pub const fn is_retired(&self) -> bool {
        self.retired
    }

    /// Pin level corresponding to `state` after polarity is applied.
    pub const fn output_level(&self, state: PhaseState) -> Level {
        let active = matches!(state, PhaseState::High);
        Level::from_high(active != self.params.invert)
    }

    /// Update that parks the task's pins at their inactive level.
    pub const fn inactive_update(&self) -> PinUpdate {
        PinUpdate::drive(self.params.pin_mask, self.output_level(PhaseState::Low))
    }

    /// Phase a freshly started task begins in.
    pub const fn initial_phase(&self) -> PhaseState {
        if self.params.delay_us == 0 {
            PhaseState::High
        } else {
            PhaseState::Low
        }
    }

    /// Pin state the task presents at its start time.
    pub const fn initial_update(&self) -> PinUpdate {
        PinUpdate::drive(
            self.params.pin_mask,
            self.output_level(self.initial_phase()),
        )
    }

    /// Re-initializes the task relative to `start_time` without touching pins.
    ///
    /// Returns the update the caller must apply at `start_time`: pins forced
    /// to the inactive level, or straight to the active level when there is no
    /// phase delay.
    pub fn start_at_time(&mut self, start_time: Timestamp) -> PinUpdate {
        self.start_time_us = start_time;
        self.cycles_done = 0;
        self.retired = false;
        self.phase_state = self.initial_phase();
        self.cycle_start_us = start_time + self.params.delay_us;
        self.next_deadline_us = self.cycle_start_us;
        if self.phase_state == PhaseState::High {
            self.next_deadline_us = self.next_deadline_us + self.params.on_us;
        }
        self.initial_update()
    }

    /// Same as [`PulseTask::start_at_time`], driving the pins immediately.
    pub fn start_at_time_and_drive<P: PinBank>(
        &mut self,
        start_time: Timestamp,
        pins: &mut P,
    ) -> PinUpdate {
        pins.apply(self.inactive_update());
        let update = self.start_at_time(start_time);
        pins.apply(update);
        update
    }

    /// Returns `true` when the next transition is due at `now`.
    pub const fn is_due(&self, now: Timestamp) -> bool {
        now.has_reached(self.next_deadline_us)
    }

    /// Returns `true` while the scheduler must keep re-queuing the task.
    pub const fn requires_future_update(&self) -> bool {
        if self.retired {
            return false;
        }
        self.params.repeat_count == 0 || self.cycles_done != self.params.repeat_count
    }

    /// Advances the waveform by one edge without touching pins.
    ///
    /// The caller owns the output action; the returned update is what the
    /// edge drives. A finished or retired task returns an empty update.
    pub fn update(&mut self) -> PinUpdate {
        if !self.requires_future_update() {
            return PinUpdate::default();
        }
        match self.phase_state {
            PhaseState::Low => {
                let edge = self.next_deadline_us;
                self.cycle_start_us = edge;
                self.phase_state = PhaseState::High;
                self.next_deadline_us = edge + self.params.on_us;
            }
            PhaseState::High => {
                self.phase_state = PhaseState::Low;
                self.cycles_done = self.cycles_done.saturating_add(1);
                self.next_deadline_us = self.cycle_start_us + self.params.period_us;
            }
        }
        PinUpdate::drive(self.params.pin_mask, self.output_level(self.phase_state))
    }

    /// Advances by one edge and drives the result onto `pins`.
    pub fn update_and_drive<P: PinBank>(&mut self, pins: &mut P) -> PinUpdate {
        let update = self.update();
        pins.apply(update);
        update
    }

    /// Advances only if the next edge is due at `now`.
    pub fn update_if_due(&mut self, now: Timestamp) -> Option<PinUpdate> {
        if self.requires_future_update() && self.is_due(now) {
            Some(self.update())
        } else {
            None
        }
    }

    /// Stops the task permanently and returns the update parking its pins.
    pub fn retire(&mut self) -> PinUpdate {
        self.retired = true;
        self.phase_state = PhaseState::Low;
        self.inactive_update()
    }

    /// Wraparound-safe ordering by next deadline.
    pub fn deadline_cmp(&self, other: &Self) -> Ordering {
        self.next_deadline_us.deadline_cmp(other.next_deadline_us)
    }
}
