//! Protocol-core handle on the timing engine.
//!
//! `TimingLink` is the slice of the host protocol that talks to the timing
//! core: it decodes spec records, reserves the port pins they drive, forwards
//! start/abort control bytes, and folds reported error codes into the
//! host-visible error register. It also owns the general-purpose side of the
//! port, since pins reserved for pulse trains must be kept out of it.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt;

use pulse_core::error::{DecodeError, ErrorCode, SpecError};
use pulse_core::spec::{ControlSignal, TaskSpec};

use crate::channels::{ControlSender, ErrorReceiver, SpecSender};
use crate::config::{PORT_BASE, PORT_MASK};
use crate::port::{PortIo, PortRegisters, PortSample};
use crate::status::{self, ErrorLatch};

/// Failure while handing a record to the timing core.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkError {
    /// The spec record could not be decoded.
    Decode(DecodeError),
    /// The record addresses pins outside the port.
    PortOutOfRange(u32),
    /// The record decodes but describes an impossible waveform.
    Invalid(SpecError),
    /// The queue towards the timing core is full.
    QueueFull,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Decode(err) => write!(f, "decode failed: {err}"),
            LinkError::PortOutOfRange(mask) => write!(f, "port mask {mask:#x} out of range"),
            LinkError::Invalid(err) => write!(f, "invalid task: {err}"),
            LinkError::QueueFull => f.write_str("timing queue full"),
        }
    }
}

impl From<DecodeError> for LinkError {
    fn from(value: DecodeError) -> Self {
        LinkError::Decode(value)
    }
}

pub struct TimingLink<'a, D> {
    specs: SpecSender<'a>,
    controls: ControlSender<'a>,
    errors: ErrorReceiver<'a>,
    latch: &'a ErrorLatch,
    io: D,
    port: PortRegisters,
    reserved: u32,
}

impl<'a, D> TimingLink<'a, D>
where
    D: PortIo,
{
    pub fn new(
        specs: SpecSender<'a>,
        controls: ControlSender<'a>,
        errors: ErrorReceiver<'a>,
        latch: &'a ErrorLatch,
        io: D,
    ) -> Self {
        let mut port = PortRegisters::new();
        port.prime(port_byte(io.read_levels()));
        Self {
            specs,
            controls,
            errors,
            latch,
            io,
            port,
            reserved: 0,
        }
    }

    /// Port bits currently driven by pulse trains.
    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    pub fn error_state(&self) -> u8 {
        self.latch.state()
    }

    /// Clears the error register, returning the bits that were set.
    pub fn clear_errors(&self) -> u8 {
        self.latch.clear()
    }

    /// Decodes a wire record, queues it, and reserves its pins.
    ///
    /// Malformed records latch [`ErrorCode::InvalidSpecification`] locally
    /// since they never reach the timing core. Pins are only reserved once
    /// the record is queued.
    pub fn submit_task(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let spec = TaskSpec::decode(bytes).inspect_err(|_| {
            self.latch.latch(ErrorCode::InvalidSpecification);
        })?;
        if spec.port_mask & !PORT_MASK != 0 {
            self.latch.latch(ErrorCode::InvalidSpecification);
            return Err(LinkError::PortOutOfRange(spec.port_mask));
        }
        if let Err(err) = spec.to_params(PORT_BASE) {
            self.latch.latch(ErrorCode::InvalidSpecification);
            return Err(LinkError::Invalid(err));
        }

        self.specs
            .try_send(spec)
            .map_err(|_| LinkError::QueueFull)?;
        self.io.reserve_outputs(spec.port_mask);
        self.reserved |= spec.port_mask;
        status::record_reserved_pins(self.reserved);
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), LinkError> {
        self.send_control(ControlSignal::Start)
    }

    /// Starts the schedule when `value` is non-zero.
    pub fn software_trigger(&mut self, value: u8) -> Result<(), LinkError> {
        if value == 0 { Ok(()) } else { self.start() }
    }

    /// Asks the timing core to tear down and hands the reserved pins back to
    /// input.
    pub fn abort(&mut self) -> Result<(), LinkError> {
        let sent = self.send_control(ControlSignal::Abort);
        self.io.release(self.reserved);
        self.port.dir &= !port_byte(self.reserved);
        self.reserved = 0;
        status::record_reserved_pins(0);
        sent
    }

    /// Folds every queued error code into the error register. Returns `true`
    /// when a bit that was clear became set.
    pub fn poll_errors(&mut self) -> bool {
        let mut raised = false;
        while let Ok(code) = self.errors.try_receive() {
            raised |= self.latch.latch(code);
        }
        raised
    }

    pub fn port_dir(&self) -> u8 {
        self.port.dir
    }

    /// Sets the direction of every pin not driven by a pulse train.
    pub fn write_port_dir(&mut self, dir: u8) {
        self.port.dir = dir;
        self.io
            .set_directions(PORT_MASK & !self.reserved, u32::from(dir));
    }

    /// Levels of all port pins, pulse-train outputs included.
    pub fn read_port_state(&self) -> u8 {
        port_byte(self.io.read_levels())
    }

    /// Drives the general-purpose outputs and returns the level read back.
    pub fn write_port_state(&mut self, value: u8) -> u8 {
        let outputs = u32::from(self.port.dir) & !self.reserved;
        self.io.write_levels(outputs, u32::from(value));
        self.read_port_state()
    }

    pub fn trigger_arm(&self) -> u8 {
        self.port.trigger_arm
    }

    /// Arms `mask` as external trigger inputs.
    pub fn arm_trigger(&mut self, mask: u8) {
        let inputs = mask & !port_byte(self.reserved);
        self.port.trigger_arm = mask;
        self.port.dir &= !inputs;
        self.io.release(u32::from(inputs));
    }

    pub fn trigger_edge(&self) -> u8 {
        self.port.trigger_edge
    }

    pub fn set_trigger_edge(&mut self, edges: u8) {
        self.port.trigger_edge = edges;
    }

    /// Samples the port and starts the schedule if an armed pin saw its edge.
    pub fn poll_port(&mut self) -> Result<PortSample, LinkError> {
        let sample = self
            .port
            .sample(self.read_port_state(), port_byte(self.reserved));
        if sample.triggered {
            self.start()?;
        }
        Ok(sample)
    }

    fn send_control(&mut self, signal: ControlSignal) -> Result<(), LinkError> {
        self.controls
            .try_send(signal.to_byte())
            .map_err(|_| LinkError::QueueFull)
    }
}

fn port_byte(bits: u32) -> u8 {
    u8::try_from(bits & PORT_MASK).unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ControlQueue, ErrorQueue, SpecQueue};
    use crate::config::SPEC_QUEUE_DEPTH;

    #[derive(Default)]
    struct MockPort {
        outputs: u32,
        releases: u8,
        levels: u32,
    }

    impl PortIo for &mut MockPort {
        fn reserve_outputs(&mut self, port_mask: u32) {
            self.outputs |= port_mask;
        }

        fn release(&mut self, port_mask: u32) {
            self.outputs &= !port_mask;
            self.releases += 1;
        }

        fn read_levels(&self) -> u32 {
            self.levels
        }

        fn write_levels(&mut self, port_mask: u32, value: u32) {
            self.levels = (self.levels & !port_mask) | (value & port_mask);
        }
    }

    struct Fixture {
        specs: SpecQueue,
        controls: ControlQueue,
        errors: ErrorQueue,
        latch: ErrorLatch,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                specs: SpecQueue::new(),
                controls: ControlQueue::new(),
                errors: ErrorQueue::new(),
                latch: ErrorLatch::new(),
            }
        }

        fn link<'a>(&'a self, port: &'a mut MockPort) -> TimingLink<'a, &'a mut MockPort> {
            TimingLink::new(
                self.specs.sender(),
                self.controls.sender(),
                self.errors.receiver(),
                &self.latch,
                port,
            )
        }
    }

    #[test]
    fn submit_reserves_pins_and_queues_record() {
        let fixture = Fixture::new();
        let mut port = MockPort::default();
        let mut link = fixture.link(&mut port);

        let record = TaskSpec::new(0, 5, 10, 0x05, 0).encode();
        link.submit_task(&record).unwrap();
        assert_eq!(link.reserved(), 0x05);
        assert_eq!(link.start(), Ok(()));
        drop(link);

        assert_eq!(port.outputs, 0x05);
        assert_eq!(
            fixture.specs.try_receive().ok().map(|spec| spec.port_mask),
            Some(0x05)
        );
        assert_eq!(
            fixture.controls.try_receive().ok(),
            Some(ControlSignal::Start.to_byte())
        );
    }

    #[test]
    fn malformed_record_latches_invalid_specification() {
        let fixture = Fixture::new();
        let mut port = MockPort::default();
        let mut link = fixture.link(&mut port);

        assert!(matches!(
            link.submit_task(&[0u8; 7]),
            Err(LinkError::Decode(DecodeError::Length { .. }))
        ));
        assert!(ErrorCode::InvalidSpecification.is_set_in(link.error_state()));
        assert_eq!(link.reserved(), 0);
    }

    #[test]
    fn impossible_waveform_is_rejected_before_reserving() {
        let fixture = Fixture::new();
        let mut port = MockPort::default();
        let mut link = fixture.link(&mut port);

        let record = TaskSpec::new(0, 20, 10, 0x01, 0).encode();
        assert!(matches!(
            link.submit_task(&record),
            Err(LinkError::Invalid(SpecError::OnTimeExceedsPeriod { .. }))
        ));
        assert_eq!(link.reserved(), 0);
        drop(link);
        assert_eq!(port.outputs, 0);
        assert!(fixture.specs.try_receive().is_err());
    }

    #[test]
    fn full_queue_leaves_pins_unreserved() {
        let fixture = Fixture::new();
        let mut port = MockPort::default();
        let mut link = fixture.link(&mut port);

        let record = TaskSpec::new(0, 5, 10, 0x01, 0).encode();
        for _ in 0..SPEC_QUEUE_DEPTH {
            link.submit_task(&record).unwrap();
        }
        let overflow = TaskSpec::new(0, 5, 10, 0x80, 0).encode();
        assert_eq!(link.submit_task(&overflow), Err(LinkError::QueueFull));
        assert_eq!(link.reserved(), 0x01);
        drop(link);
        assert_eq!(port.outputs, 0x01);
    }

    #[test]
    fn abort_releases_reserved_pins() {
        let fixture = Fixture::new();
        let mut port = MockPort::default();
        let mut link = fixture.link(&mut port);

        link.write_port_dir(0x0F);
        link.submit_task(&TaskSpec::new(0, 5, 10, 0x03, 0).encode())
            .unwrap();
        link.abort().unwrap();
        assert_eq!(link.reserved(), 0);
        assert_eq!(link.port_dir(), 0x0C);
        drop(link);

        assert_eq!(port.outputs, 0x0C);
        assert_eq!(
            fixture.controls.try_receive().ok(),
            Some(ControlSignal::Abort.to_byte())
        );
    }

    #[test]
    fn port_writes_skip_pulse_train_pins() {
        let fixture = Fixture::new();
        let mut port = MockPort::default();
        let mut link = fixture.link(&mut port);

        link.submit_task(&TaskSpec::new(0, 5, 10, 0x01, 0).encode()).unwrap();
        link.write_port_dir(0xF0);
        assert_eq!(link.port_dir(), 0xF0);
        assert_eq!(link.write_port_state(0xFF), 0xF0);
        drop(link);

        // The pulse-train pin stays an output; the rest follow the register.
        assert_eq!(port.outputs, 0xF1);
        assert_eq!(port.levels, 0xF0);
    }

    #[test]
    fn armed_trigger_pins_become_inputs() {
        let fixture = Fixture::new();
        let mut port = MockPort::default();
        let mut link = fixture.link(&mut port);

        link.write_port_dir(0xFF);
        link.arm_trigger(0x04);
        assert_eq!(link.trigger_arm(), 0x04);
        assert_eq!(link.trigger_edge(), 0xFF);
        assert_eq!(link.port_dir(), 0xFB);
        drop(link);
        assert_eq!(port.outputs, 0xFB);
    }

    #[test]
    fn trigger_fires_once_per_edge() {
        let fixture = Fixture::new();
        let mut port = MockPort::default();
        let mut link = fixture.link(&mut port);
        link.arm_trigger(0x01);

        link.io.levels = 0x01;
        let sample = link.poll_port().unwrap();
        assert!(sample.triggered);
        assert_eq!(sample.changed_inputs, 0x01);
        assert!(!link.poll_port().unwrap().triggered);

        assert_eq!(
            fixture.controls.try_receive().ok(),
            Some(ControlSignal::Start.to_byte())
        );
        assert!(fixture.controls.try_receive().is_err());
    }

    #[test]
    fn falling_edge_trigger_ignores_rise() {
        let fixture = Fixture::new();
        let mut port = MockPort::default();
        let mut link = fixture.link(&mut port);
        link.arm_trigger(0x02);
        link.set_trigger_edge(0xFD);

        link.io.levels = 0x02;
        assert!(!link.poll_port().unwrap().triggered);
        link.io.levels = 0x00;
        assert!(link.poll_port().unwrap().triggered);
    }

    #[test]
    fn pulse_train_edges_on_an_armed_pin_do_not_trigger() {
        let fixture = Fixture::new();
        let mut port = MockPort::default();
        let mut link = fixture.link(&mut port);
        link.arm_trigger(0x01);
        link.submit_task(&TaskSpec::new(0, 5, 10, 0x01, 0).encode()).unwrap();

        link.io.levels = 0x01;
        let sample = link.poll_port().unwrap();
        assert!(!sample.triggered);
        assert_eq!(sample.changed_inputs, 0);
        assert!(fixture.controls.try_receive().is_err());
    }

    #[test]
    fn software_trigger_ignores_zero() {
        let fixture = Fixture::new();
        let mut port = MockPort::default();
        let mut link = fixture.link(&mut port);

        link.software_trigger(0).unwrap();
        assert!(fixture.controls.try_receive().is_err());
        link.software_trigger(1).unwrap();
        assert_eq!(
            fixture.controls.try_receive().ok(),
            Some(ControlSignal::Start.to_byte())
        );
    }

    #[test]
    fn poll_errors_reports_only_new_bits() {
        let fixture = Fixture::new();
        let mut port = MockPort::default();
        let mut link = fixture.link(&mut port);

        fixture.errors.try_send(ErrorCode::MissedDeadline).unwrap();
        assert!(link.poll_errors());
        fixture.errors.try_send(ErrorCode::MissedDeadline).unwrap();
        assert!(!link.poll_errors());
        assert_eq!(link.error_state(), ErrorCode::MissedDeadline.bits());
    }
}
