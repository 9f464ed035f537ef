//! Board constants for the pulse expander.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use pulse_core::config::{SchedulerConfig, TimingConfig};

/// GPIO number of port pin 0. Port pins occupy `PORT_BASE..PORT_BASE + PORT_WIDTH`.
pub const PORT_BASE: u8 = 8;

/// GPIO number of the level-shifter direction pin for port pin 0.
pub const PORT_DIR_BASE: u8 = 16;

/// Number of pins on the expander port.
pub const PORT_WIDTH: u8 = 8;

/// Mask of port bits the link accepts.
pub const PORT_MASK: u32 = (1 << PORT_WIDTH) - 1;

/// Host UART baud rate.
pub const HOST_BAUD: u32 = 115_200;

/// Bytes pulled from the host UART per read.
pub const HOST_READ_CHUNK: usize = 32;

/// Ring buffer size for each direction of the host UART.
pub const HOST_UART_BUFFER: usize = 64;

pub const SPEC_QUEUE_DEPTH: usize = 16;
pub const CONTROL_QUEUE_DEPTH: usize = 4;
pub const ERROR_QUEUE_DEPTH: usize = 8;

/// Pulse trains held by the timing core.
pub const MAX_TASKS: usize = pulse_core::config::MAX_TASKS;

/// Stack reserved for the timing core (core 1).
pub const CORE1_STACK_SIZE: usize = 8 * 1024;

/// Interval between port and error polls on the protocol core, in
/// microseconds. Bounds the latency of an external trigger.
pub const PORT_POLL_INTERVAL_US: u64 = 100;

/// Idle cycles between run-loop polls on the timing core (10us at 125 MHz).
pub const CORE1_POLL_GAP_CYCLES: u32 = 1_250;

/// Timing configuration used by the dedicated core.
pub const fn timing_config() -> TimingConfig {
    TimingConfig::new(SchedulerConfig::new(), PORT_BASE)
}

/// Shifts a port-relative mask onto the direction pins.
pub const fn direction_mask(port_mask: u32) -> u32 {
    (port_mask & PORT_MASK) << PORT_DIR_BASE
}

/// Shifts a port-relative mask onto the port pins.
pub const fn pin_mask(port_mask: u32) -> u32 {
    (port_mask & PORT_MASK) << PORT_BASE
}
