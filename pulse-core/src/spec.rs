//! Records exchanged with the protocol core.
//!
//! Task definitions cross the core boundary as fixed-size [`TaskSpec`]
//! records. Their wire form is the packed little-endian payload carried by the
//! task-definition register: five `u32` fields followed by a one-byte bool.

use core::fmt;

use winnow::ModalResult;
use winnow::binary::{le_u8, le_u32};
use winnow::prelude::*;

use crate::error::{DecodeError, SpecError};
use crate::task::{PulseParams, PulseTask};

/// Size of an encoded [`TaskSpec`] in bytes.
pub const TASK_SPEC_LEN: usize = 21;

/// Task definition as received from the protocol core.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TaskSpec {
    pub offset_us: u32,
    pub on_time_us: u32,
    pub period_us: u32,
    /// Port-relative output bits; shifted by the board port base.
    pub port_mask: u32,
    /// Number of periods; `0` repeats forever.
    pub cycles: u32,
    pub invert: bool,
}

impl TaskSpec {
    pub const fn new(
        offset_us: u32,
        on_time_us: u32,
        period_us: u32,
        port_mask: u32,
        cycles: u32,
    ) -> Self {
        Self {
            offset_us,
            on_time_us,
            period_us,
            port_mask,
            cycles,
            invert: false,
        }
    }

    #[must_use]
    pub const fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    /// Decodes a packed wire record.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != TASK_SPEC_LEN {
            return Err(DecodeError::Length {
                expected: TASK_SPEC_LEN,
                actual: bytes.len(),
            });
        }
        let mut input = bytes;
        task_spec_record
            .parse_next(&mut input)
            .map_err(|_| DecodeError::Malformed)
    }

    /// Encodes the record into its packed wire form.
    pub fn encode(&self) -> [u8; TASK_SPEC_LEN] {
        let mut out = [0u8; TASK_SPEC_LEN];
        let fields = [
            self.offset_us,
            self.on_time_us,
            self.period_us,
            self.port_mask,
            self.cycles,
        ];
        for (chunk, field) in out.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }
        out[TASK_SPEC_LEN - 1] = u8::from(self.invert);
        out
    }

    /// Absolute pin mask once the port mask is shifted to `port_base`.
    pub fn pin_mask(&self, port_base: u8) -> Result<u32, SpecError> {
        let out_of_range = SpecError::PortMaskOutOfRange {
            port_mask: self.port_mask,
        };
        let shifted = self
            .port_mask
            .checked_shl(u32::from(port_base))
            .ok_or(out_of_range)?;
        if shifted >> port_base != self.port_mask {
            return Err(out_of_range);
        }
        Ok(shifted)
    }

    /// Converts the record into validated waveform parameters.
    pub fn to_params(&self, port_base: u8) -> Result<PulseParams, SpecError> {
        let params = PulseParams::new(
            self.offset_us,
            self.on_time_us,
            self.period_us,
            self.pin_mask(port_base)?,
        )
        .with_repeat_count(self.cycles)
        .with_invert(self.invert);
        params.validate()?;
        Ok(params)
    }

    /// Builds the pulse task described by the record.
    pub fn to_task(&self, port_base: u8) -> Result<PulseTask, SpecError> {
        PulseTask::new(self.to_params(port_base)?)
    }
}

fn task_spec_record(input: &mut &[u8]) -> ModalResult<TaskSpec> {
    let (offset_us, on_time_us, period_us, port_mask, cycles, invert) =
        (le_u32, le_u32, le_u32, le_u32, le_u32, le_u8).parse_next(input)?;
    Ok(TaskSpec {
        offset_us,
        on_time_us,
        period_us,
        port_mask,
        cycles,
        invert: invert != 0,
    })
}

/// Single-byte control message sent to the timing core.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControlSignal {
    /// No-op.
    Idle,
    /// Begin the armed schedule.
    Start,
    /// Tear the schedule down and return pins to their defaults.
    Abort,
}

impl ControlSignal {
    const START_BYTE: u8 = 1 << 0;
    const ABORT_BIT: u8 = 1 << 1;

    /// Decodes a control byte. The abort bit takes precedence over start.
    pub const fn from_byte(byte: u8) -> Self {
        if byte == 0 {
            ControlSignal::Idle
        } else if byte & Self::ABORT_BIT != 0 {
            ControlSignal::Abort
        } else {
            ControlSignal::Start
        }
    }

    /// Canonical byte for the signal.
    pub const fn to_byte(self) -> u8 {
        match self {
            ControlSignal::Idle => 0,
            ControlSignal::Start => Self::START_BYTE,
            ControlSignal::Abort => Self::ABORT_BIT,
        }
    }
}

impl From<u8> for ControlSignal {
    fn from(value: u8) -> Self {
        Self::from_byte(value)
    }
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlSignal::Idle => f.write_str("idle"),
            ControlSignal::Start => f.write_str("start"),
            ControlSignal::Abort => f.write_str("abort"),
        }
    }
}
