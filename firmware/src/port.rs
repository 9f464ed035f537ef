//! Expander port I/O outside the pulse trains.
//!
//! Pins not reserved by a pulse train behave as plain digital I/O: the host
//! sets their direction and output level, reads their state, and may arm any
//! of them as an external trigger that starts the schedule on an edge.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

/// Port pins, their level shifters, and their input levels.
///
/// Every mask is port-relative: bit 0 is port pin 0.
pub trait PortIo {
    /// Turns the pins in `port_mask` into outputs: the buffer direction pins
    /// go high and the IO pins switch to output.
    fn reserve_outputs(&mut self, port_mask: u32);

    /// Returns the pins in `port_mask` to inputs.
    fn release(&mut self, port_mask: u32);

    /// Sets pins in `port_mask` to outputs where `outputs` has a one and to
    /// inputs elsewhere.
    fn set_directions(&mut self, port_mask: u32, outputs: u32) {
        self.reserve_outputs(port_mask & outputs);
        self.release(port_mask & !outputs);
    }

    /// Current level of every port pin.
    fn read_levels(&self) -> u32;

    /// Drives the pins in `port_mask` to the matching bits of `value`.
    fn write_levels(&mut self, port_mask: u32, value: u32);
}

/// Host-visible port registers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PortRegisters {
    /// Direction of the general-purpose pins; a one is an output.
    pub dir: u8,
    /// Pins that start the schedule on an edge.
    pub trigger_arm: u8,
    /// Edge per armed pin; a one selects rising, a zero falling.
    pub trigger_edge: u8,
    last_levels: u8,
}

/// What changed between two samples of the port.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PortSample {
    pub levels: u8,
    /// Input pins whose level differs from the previous sample.
    pub changed_inputs: u8,
    /// An armed pin saw its configured edge.
    pub triggered: bool,
}

impl PortRegisters {
    /// Power-on state: all pins inputs, nothing armed, rising edges.
    pub const fn new() -> Self {
        Self {
            dir: 0x00,
            trigger_arm: 0x00,
            trigger_edge: 0xFF,
            last_levels: 0x00,
        }
    }

    /// Seeds the edge detector without reporting a change.
    pub fn prime(&mut self, levels: u8) {
        self.last_levels = levels;
    }

    /// Compares `levels` with the previous sample. Pins in `driven` are
    /// treated as outputs on top of `dir`.
    pub fn sample(&mut self, levels: u8, driven: u8) -> PortSample {
        let old = self.last_levels;
        self.last_levels = levels;

        let changed_inputs = (old ^ levels) & !(self.dir | driven);
        let rising = changed_inputs & levels;
        let falling = changed_inputs & old;
        let fired =
            self.trigger_arm & ((rising & self.trigger_edge) | (falling & !self.trigger_edge));
        PortSample {
            levels,
            changed_inputs,
            triggered: fired != 0,
        }
    }
}

impl Default for PortRegisters {
    fn default() -> Self {
        Self::new()
    }
}
