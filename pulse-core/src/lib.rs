#![no_std]

// Timing engine shared by the expander firmware and host tooling.
//
// Everything here is executor- and MCU-agnostic: hardware is reached through
// the `PinBank` and `AlarmTimer` traits and cross-core transport through the
// `Inbox`/`Outbox` traits, so the same scheduler runs on core 1 of the RP2040
// and inside the host emulator and tests.

pub mod channel;
pub mod config;
pub mod error;
pub mod gpio;
pub mod runner;
pub mod scheduler;
pub mod sim;
pub mod spec;
pub mod task;
pub mod telemetry;
pub mod time;
