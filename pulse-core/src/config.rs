//! Tunables for the scheduler and the timing-core run loop.

/// Number of pulse trains the scheduler can hold at once.
pub const MAX_TASKS: usize = 64;

/// Minimum lead (µs) a deadline must have over "now" for the hardware alarm
/// to be trusted. Closer deadlines are serviced inline instead. Covers the
/// worst-case time between reading the counter and the alarm register write
/// landing on a 125 MHz RP2040 with the flash cache warm.
pub const DEFAULT_ARMING_MARGIN_US: u32 = 4;

/// Offset between `start()` and the common epoch of all tasks, giving the
/// first alarm room to be armed.
pub const DEFAULT_START_LEAD_US: u32 = 50;

/// Consecutive service rounds whose next deadline had already passed before a
/// backlog is reported.
pub const DEFAULT_MAX_CATCHUP_ROUNDS: u8 = 8;

/// Task transitions processed in a single batch before the round is cut short.
pub const DEFAULT_MAX_TRANSITIONS_PER_ROUND: usize = 4 * MAX_TASKS;

/// Bit position of port pin 0 within the GPIO bank.
pub const DEFAULT_PORT_BASE: u8 = 8;

/// Timing policy applied by the deadline scheduler.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SchedulerConfig {
    arming_margin_us: u32,
    start_lead_us: u32,
    max_catchup_rounds: u8,
    max_transitions_per_round: usize,
}

impl SchedulerConfig {
    pub const fn new() -> Self {
        Self {
            arming_margin_us: DEFAULT_ARMING_MARGIN_US,
            start_lead_us: DEFAULT_START_LEAD_US,
            max_catchup_rounds: DEFAULT_MAX_CATCHUP_ROUNDS,
            max_transitions_per_round: DEFAULT_MAX_TRANSITIONS_PER_ROUND,
        }
    }

    #[must_use]
    pub const fn with_arming_margin_us(mut self, margin: u32) -> Self {
        self.arming_margin_us = margin;
        self
    }

    #[must_use]
    pub const fn with_start_lead_us(mut self, lead: u32) -> Self {
        self.start_lead_us = lead;
        self
    }

    #[must_use]
    pub const fn with_max_catchup_rounds(mut self, rounds: u8) -> Self {
        self.max_catchup_rounds = rounds;
        self
    }

    #[must_use]
    pub const fn with_max_transitions_per_round(mut self, transitions: usize) -> Self {
        self.max_transitions_per_round = transitions;
        self
    }

    pub const fn arming_margin_us(&self) -> u32 {
        self.arming_margin_us
    }

    pub const fn start_lead_us(&self) -> u32 {
        self.start_lead_us
    }

    pub const fn max_catchup_rounds(&self) -> u8 {
        self.max_catchup_rounds
    }

    pub const fn max_transitions_per_round(&self) -> usize {
        self.max_transitions_per_round
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the timing-core run loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimingConfig {
    pub scheduler: SchedulerConfig,
    /// Shift applied to incoming port masks.
    pub port_base: u8,
}

impl TimingConfig {
    pub const fn new(scheduler: SchedulerConfig, port_base: u8) -> Self {
        Self {
            scheduler,
            port_base,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self::new(SchedulerConfig::new(), DEFAULT_PORT_BASE)
    }
}
