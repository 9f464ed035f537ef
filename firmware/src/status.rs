#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! Lightweight atomics hold the host-visible error-state register, the pins
//! reserved for pulse output, and the last state the timing core reported, so
//! either core can read them without taking the timing-core lock.

use portable_atomic::{AtomicU8, AtomicU32, Ordering};
use pulse_core::error::ErrorCode;
use pulse_core::runner::RunnerState;

/// Sticky error-state register. Codes are ORed in and only cleared on request.
pub struct ErrorLatch {
    bits: AtomicU8,
}

impl ErrorLatch {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU8::new(0),
        }
    }

    /// Sets the bit for `code`, returning `true` if it was not already set.
    pub fn latch(&self, code: ErrorCode) -> bool {
        let previous = self.bits.fetch_or(code.bits(), Ordering::AcqRel);
        !code.is_set_in(previous)
    }

    pub fn state(&self) -> u8 {
        self.bits.load(Ordering::Acquire)
    }

    /// Clears every bit and returns the previous register value.
    pub fn clear(&self) -> u8 {
        self.bits.swap(0, Ordering::AcqRel)
    }
}

impl Default for ErrorLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Host-visible error register.
pub static ERROR_STATE: ErrorLatch = ErrorLatch::new();

/// Pin mask currently reserved for pulse output.
static RESERVED_PINS: AtomicU32 = AtomicU32::new(0);
/// Last run-loop state published by the timing core.
static RUNNER_STATE: AtomicU8 = AtomicU8::new(0);
/// Error codes the timing core could not enqueue.
static DROPPED_ERRORS: AtomicU32 = AtomicU32::new(0);

pub fn record_reserved_pins(mask: u32) {
    RESERVED_PINS.store(mask, Ordering::Relaxed);
}

pub fn reserved_pins() -> u32 {
    RESERVED_PINS.load(Ordering::Relaxed)
}

/// Publishes the timing core's state and dropped-error count.
pub fn record_runner(state: RunnerState, dropped_errors: u32) {
    RUNNER_STATE.store(state_code(state), Ordering::Relaxed);
    DROPPED_ERRORS.store(dropped_errors, Ordering::Relaxed);
}

pub fn runner_state() -> RunnerState {
    decode_state(RUNNER_STATE.load(Ordering::Relaxed))
}

pub fn dropped_errors() -> u32 {
    DROPPED_ERRORS.load(Ordering::Relaxed)
}

/// Wire code of a run-loop state, as exposed through the status register.
pub const fn state_code(state: RunnerState) -> u8 {
    match state {
        RunnerState::AwaitingTasks => 0,
        RunnerState::AwaitingStart => 1,
        RunnerState::Running => 2,
        RunnerState::Complete => 3,
        RunnerState::Aborted => 4,
    }
}

const fn decode_state(raw: u8) -> RunnerState {
    match raw {
        1 => RunnerState::AwaitingStart,
        2 => RunnerState::Running,
        3 => RunnerState::Complete,
        4 => RunnerState::Aborted,
        _ => RunnerState::AwaitingTasks,
    }
}
