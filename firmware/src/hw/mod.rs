//! RP2040 bindings for the timing engine's hardware seams.
//!
//! Port pins are written through the SIO block so a whole batch lands in one
//! register write. The alarm uses TIMER alarm 1; alarm 0 belongs to the
//! embassy time driver running on core 0.

use embassy_rp::gpio::{Level, Output};
use embassy_rp::pac;
use pulse_core::gpio::PinBank;
use pulse_core::scheduler::AlarmTimer;
use pulse_core::time::Timestamp;

use crate::config;
use crate::port::PortIo;

/// TIMER alarm reserved for the timing core.
pub const TIMING_ALARM: usize = 1;

/// Output register of GPIO bank 0.
pub struct SioPins {
    // Held so the pads stay muxed to SIO.
    _port: [Output<'static>; 8],
}

impl SioPins {
    /// Takes ownership of the port pins. They start as inputs driving low.
    pub fn new(port: [Output<'static>; 8]) -> Self {
        pac::SIO
            .gpio_oe(0)
            .value_clr()
            .write_value(config::pin_mask(config::PORT_MASK));
        Self { _port: port }
    }
}

impl PinBank for SioPins {
    fn put_masked(&mut self, mask: u32, value: u32) {
        let out = pac::SIO.gpio_out(0);
        let current = out.value().read();
        out.value_xor().write_value((current ^ value) & mask);
    }
}

/// General-purpose side of the port: SIO output enables, level-shifter
/// direction pins, and the input register.
pub struct SioPort {
    _dir: [Output<'static>; 8],
}

impl SioPort {
    pub fn new(dir: [Output<'static>; 8]) -> Self {
        Self { _dir: dir }
    }
}

impl PortIo for SioPort {
    fn reserve_outputs(&mut self, port_mask: u32) {
        let sio = pac::SIO;
        sio.gpio_out(0)
            .value_set()
            .write_value(config::direction_mask(port_mask));
        sio.gpio_oe(0)
            .value_set()
            .write_value(config::pin_mask(port_mask));
    }

    fn release(&mut self, port_mask: u32) {
        let sio = pac::SIO;
        sio.gpio_oe(0)
            .value_clr()
            .write_value(config::pin_mask(port_mask));
        sio.gpio_out(0)
            .value_clr()
            .write_value(config::direction_mask(port_mask));
    }

    fn read_levels(&self) -> u32 {
        (pac::SIO.gpio_in(0).read() >> config::PORT_BASE) & config::PORT_MASK
    }

    // Set/clear aliases leave bits owned by the timing core untouched.
    fn write_levels(&mut self, port_mask: u32, value: u32) {
        let out = pac::SIO.gpio_out(0);
        out.value_set()
            .write_value(config::pin_mask(port_mask & value));
        out.value_clr()
            .write_value(config::pin_mask(port_mask & !value));
    }
}

/// Single-shot alarm on the 1 MHz TIMER peripheral.
pub struct TimerAlarm {
    _private: (),
}

impl TimerAlarm {
    /// Clears any stale alarm state and enables the alarm interrupt.
    pub fn new() -> Self {
        let timer = pac::TIMER;
        timer.armed().write(|w| w.set_armed(1 << TIMING_ALARM));
        timer.intr().write(|w| w.set_alarm(TIMING_ALARM, true));
        timer.inte().modify(|w| w.set_alarm(TIMING_ALARM, true));
        Self { _private: () }
    }

    /// Acknowledges the alarm interrupt.
    pub fn acknowledge() {
        pac::TIMER
            .intr()
            .write(|w| w.set_alarm(TIMING_ALARM, true));
    }
}

impl AlarmTimer for TimerAlarm {
    fn now(&self) -> Timestamp {
        Timestamp::from_micros(pac::TIMER.timerawl().read())
    }

    fn arm(&mut self, deadline: Timestamp) {
        pac::TIMER
            .alarm(TIMING_ALARM)
            .write_value(deadline.as_micros());
    }

    fn disarm(&mut self) {
        let timer = pac::TIMER;
        timer.armed().write(|w| w.set_armed(1 << TIMING_ALARM));
        timer.intr().write(|w| w.set_alarm(TIMING_ALARM, true));
    }
}

/// Drives a port or direction pin low at boot.
pub fn output(pin: embassy_rp::Peri<'static, impl embassy_rp::gpio::Pin>) -> Output<'static> {
    Output::new(pin, Level::Low)
}
