//! Register protocol spoken by the host over the control UART.
//!
//! Requests are `[access, address, length, payload..]` and every request gets
//! exactly one reply `[access, address, status, length, payload..]`. Event
//! frames use the reply layout and are sent unprompted. The decoder is fed
//! one byte at a time so it can sit directly behind a UART read loop.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt;

use heapless::Vec;
use pulse_core::spec::TASK_SPEC_LEN;

use crate::link::{LinkError, TimingLink};
use crate::port::PortIo;
use crate::status;

/// Direction of the general-purpose port pins; a one is an output.
pub const REG_PORT_DIR: u8 = 32;
/// Port pin levels. Writes drive general-purpose outputs only.
pub const REG_PORT_STATE: u8 = 33;
/// Packed task-definition record; each write queues one pulse train.
pub const REG_PWM_TASK: u8 = 34;
/// Pins armed as external start triggers.
pub const REG_ARM_EXT_TRIGGER: u8 = 35;
/// Trigger edge per pin: one for rising, zero for falling.
pub const REG_EXT_TRIGGER_EDGE: u8 = 36;
/// Any non-zero write starts the schedule.
pub const REG_SW_TRIGGER: u8 = 39;
/// Schedule control; bit 0 resets the schedule.
pub const REG_SCHEDULE_CTRL: u8 = 41;
/// Last state published by the timing core.
pub const REG_STATUS: u8 = 42;
/// Sticky error bits. Reads return the register, writes clear it.
pub const REG_ERROR_STATE: u8 = 43;
/// Port bits currently reserved for pulse output.
pub const REG_RESERVED_PINS: u8 = 44;

const SCHEDULE_RESET: u8 = 1 << 0;

pub const HEADER_LEN: usize = 3;
pub const MAX_PAYLOAD: usize = TASK_SPEC_LEN;
pub const MAX_REPLY_PAYLOAD: usize = 1;
pub const MAX_REPLY_LEN: usize = 4 + MAX_REPLY_PAYLOAD;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Access {
    Read,
    Write,
    /// Unsolicited notification from the device.
    Event,
}

impl Access {
    const READ: u8 = 0x01;
    const WRITE: u8 = 0x02;
    const EVENT: u8 = 0x03;

    /// Decodes the access byte of a host request. Hosts never send events.
    pub const fn from_request_byte(byte: u8) -> Option<Self> {
        match byte {
            Self::READ => Some(Access::Read),
            Self::WRITE => Some(Access::Write),
            _ => None,
        }
    }

    pub const fn to_byte(self) -> u8 {
        match self {
            Access::Read => Self::READ,
            Access::Write => Self::WRITE,
            Access::Event => Self::EVENT,
        }
    }
}

/// Framing failure. The decoder resynchronizes on the next byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameError {
    UnknownAccess(u8),
    PayloadTooLong(u8),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::UnknownAccess(byte) => write!(f, "unknown access byte {byte:#04x}"),
            FrameError::PayloadTooLong(len) => write!(f, "payload length {len} exceeds {MAX_PAYLOAD}"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    pub access: Access,
    pub address: u8,
    pub payload: Vec<u8, MAX_PAYLOAD>,
}

/// Incremental request decoder.
#[derive(Default)]
pub struct FrameDecoder {
    buffer: Vec<u8, { HEADER_LEN + MAX_PAYLOAD }>,
}

impl FrameDecoder {
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feeds one byte. Returns a request once a frame is complete.
    pub fn push(&mut self, byte: u8) -> Option<Result<Request, FrameError>> {
        if self.buffer.is_empty() && Access::from_request_byte(byte).is_none() {
            return Some(Err(FrameError::UnknownAccess(byte)));
        }
        // Capacity covers the longest valid frame; the length check below
        // resets the buffer before it can fill.
        let _ = self.buffer.push(byte);
        if self.buffer.len() < HEADER_LEN {
            return None;
        }

        let declared = self.buffer[2];
        let length = usize::from(declared);
        if length > MAX_PAYLOAD {
            self.buffer.clear();
            return Some(Err(FrameError::PayloadTooLong(declared)));
        }
        if self.buffer.len() < HEADER_LEN + length {
            return None;
        }

        let access = Access::from_request_byte(self.buffer[0])?;
        let request = Request {
            access,
            address: self.buffer[1],
            payload: Vec::from_slice(&self.buffer[HEADER_LEN..]).unwrap_or_default(),
        };
        self.buffer.clear();
        Some(Ok(request))
    }

    /// Bytes buffered towards the next frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Reply status byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    UnknownRegister = 0x01,
    BadLength = 0x02,
    Rejected = 0x03,
    Busy = 0x04,
}

impl From<LinkError> for Status {
    fn from(value: LinkError) -> Self {
        match value {
            LinkError::Decode(_) | LinkError::PortOutOfRange(_) | LinkError::Invalid(_) => {
                Status::Rejected
            }
            LinkError::QueueFull => Status::Busy,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reply {
    pub access: Access,
    pub address: u8,
    pub status: Status,
    pub payload: Vec<u8, MAX_REPLY_PAYLOAD>,
}

impl Reply {
    fn to(request: &Request, status: Status) -> Self {
        Self {
            access: request.access,
            address: request.address,
            status,
            payload: Vec::new(),
        }
    }

    /// Unprompted frame reporting the new value of `address`.
    pub fn event(address: u8, value: u8) -> Self {
        Self {
            access: Access::Event,
            address,
            status: Status::Ok,
            payload: Vec::new(),
        }
        .with_byte(value)
    }

    fn with_byte(mut self, byte: u8) -> Self {
        self.payload.clear();
        let _ = self.payload.push(byte);
        self
    }

    pub fn encode(&self) -> Vec<u8, MAX_REPLY_LEN> {
        let mut out = Vec::new();
        let length = u8::try_from(self.payload.len()).unwrap_or(u8::MAX);
        for byte in [self.access.to_byte(), self.address, self.status as u8, length] {
            let _ = out.push(byte);
        }
        let _ = out.extend_from_slice(&self.payload);
        out
    }
}

/// Applies one request to the timing link and builds the reply.
pub fn dispatch<D: PortIo>(link: &mut TimingLink<'_, D>, request: &Request) -> Reply {
    let payload = request.payload.as_slice();
    let ok = |value: u8| Reply::to(request, Status::Ok).with_byte(value);

    match (request.access, request.address) {
        (Access::Read, REG_PORT_DIR) => ok(link.port_dir()),
        (Access::Read, REG_PORT_STATE) => ok(link.read_port_state()),
        (Access::Read, REG_ARM_EXT_TRIGGER) => ok(link.trigger_arm()),
        (Access::Read, REG_EXT_TRIGGER_EDGE) => ok(link.trigger_edge()),
        (Access::Read, REG_STATUS) => ok(status::state_code(status::runner_state())),
        (Access::Read, REG_ERROR_STATE) => {
            link.poll_errors();
            ok(link.error_state())
        }
        (Access::Read, REG_RESERVED_PINS) => {
            ok(u8::try_from(link.reserved()).unwrap_or(u8::MAX))
        }
        (Access::Write, REG_PWM_TASK) => {
            let status = match link.submit_task(payload) {
                Ok(()) => Status::Ok,
                Err(err) => {
                    #[cfg(target_os = "none")]
                    defmt::warn!("pwm task rejected: {}", defmt::Display2Format(&err));
                    Status::from(err)
                }
            };
            Reply::to(request, status)
        }
        (Access::Write, REG_ERROR_STATE) => {
            link.poll_errors();
            ok(link.clear_errors())
        }
        (Access::Write, address) => {
            let [value] = payload else {
                return Reply::to(request, Status::BadLength);
            };
            write_byte(link, request, address, *value)
        }
        _ => Reply::to(request, Status::UnknownRegister),
    }
}

fn write_byte<D: PortIo>(
    link: &mut TimingLink<'_, D>,
    request: &Request,
    address: u8,
    value: u8,
) -> Reply {
    let ok = |echo: u8| Reply::to(request, Status::Ok).with_byte(echo);
    let sent = |result: Result<(), LinkError>| {
        Reply::to(request, result.map_or_else(Status::from, |()| Status::Ok))
    };

    match address {
        REG_PORT_DIR => {
            link.write_port_dir(value);
            ok(link.port_dir())
        }
        REG_PORT_STATE => ok(link.write_port_state(value)),
        REG_ARM_EXT_TRIGGER => {
            link.arm_trigger(value);
            ok(link.trigger_arm())
        }
        REG_EXT_TRIGGER_EDGE => {
            link.set_trigger_edge(value);
            ok(link.trigger_edge())
        }
        REG_SW_TRIGGER => sent(link.software_trigger(value)),
        REG_SCHEDULE_CTRL if value & SCHEDULE_RESET != 0 => sent(link.abort()),
        REG_SCHEDULE_CTRL => Reply::to(request, Status::Ok),
        _ => Reply::to(request, Status::UnknownRegister),
    }
}
