//! Error taxonomy for the timing engine.
//!
//! No error raised here is fatal. Each kind is either recovered locally
//! (dropping a rejected spec, forcing an immediate service pass) or escalated
//! to the protocol core as a single-byte [`ErrorCode`] that is ORed into the
//! host-visible error-state register.

use core::fmt;

/// Reasons a task specification is rejected before it touches the scheduler.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SpecError {
    /// The specification selects no output pins.
    EmptyPinMask,
    /// The on-time exceeds the period.
    OnTimeExceedsPeriod { on_us: u32, period_us: u32 },
    /// A zero-length period would never advance the deadline.
    ZeroPeriod,
    /// A delay or period is too long to order under 32-bit wraparound.
    DurationOutOfRange { micros: u32 },
    /// The port mask does not fit the pin bank after shifting to the port base.
    PortMaskOutOfRange { port_mask: u32 },
}

impl fmt::Display for SpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecError::EmptyPinMask => f.write_str("pin mask is empty"),
            SpecError::OnTimeExceedsPeriod { on_us, period_us } => {
                write!(f, "on time {on_us}us exceeds period {period_us}us")
            }
            SpecError::ZeroPeriod => f.write_str("period is zero"),
            SpecError::DurationOutOfRange { micros } => {
                write!(f, "duration {micros}us exceeds wraparound range")
            }
            SpecError::PortMaskOutOfRange { port_mask } => {
                write!(f, "port mask {port_mask:#x} exceeds the pin bank")
            }
        }
    }
}

/// Failure reported when a wire record cannot be decoded.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// The payload length does not match the fixed record size.
    Length { expected: usize, actual: usize },
    /// The payload bytes could not be parsed.
    Malformed,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Length { expected, actual } => {
                write!(f, "expected {expected} bytes, got {actual}")
            }
            DecodeError::Malformed => f.write_str("malformed record"),
        }
    }
}

/// Errors surfaced by the deadline scheduler.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScheduleError {
    /// The fixed-size task store is full.
    CapacityExceeded,
    /// Deadlines kept passing faster than they could be serviced; a recovery
    /// alarm has been armed and draining continues.
    MissedDeadline { late_by_us: u32 },
    /// The task specification was rejected.
    InvalidSpecification(SpecError),
    /// Tasks cannot be added while a schedule is running.
    Busy,
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::CapacityExceeded => f.write_str("task capacity exceeded"),
            ScheduleError::MissedDeadline { late_by_us } => {
                write!(f, "missed deadline backlog ({late_by_us}us late)")
            }
            ScheduleError::InvalidSpecification(err) => write!(f, "invalid specification: {err}"),
            ScheduleError::Busy => f.write_str("schedule is running"),
        }
    }
}

impl From<SpecError> for ScheduleError {
    fn from(value: SpecError) -> Self {
        ScheduleError::InvalidSpecification(value)
    }
}

/// Producer-side failure on a bounded channel. The rejected item is handed
/// back so the caller can decide between dropping and retrying.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChannelFull<T>(pub T);

impl<T> ChannelFull<T> {
    /// Returns the item that could not be sent.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for ChannelFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("channel full")
    }
}

/// Single-byte status code escalated to the protocol core.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    CapacityExceeded,
    MissedDeadline,
    InvalidSpecification,
}

impl ErrorCode {
    const CAPACITY_EXCEEDED_BIT: u8 = 1 << 0;
    const MISSED_DEADLINE_BIT: u8 = 1 << 1;
    const INVALID_SPECIFICATION_BIT: u8 = 1 << 2;

    /// Every code, in bit order.
    pub const ALL: [ErrorCode; 3] = [
        ErrorCode::CapacityExceeded,
        ErrorCode::MissedDeadline,
        ErrorCode::InvalidSpecification,
    ];

    /// Encodes the code as an error-state register bit.
    pub const fn bits(self) -> u8 {
        match self {
            ErrorCode::CapacityExceeded => Self::CAPACITY_EXCEEDED_BIT,
            ErrorCode::MissedDeadline => Self::MISSED_DEADLINE_BIT,
            ErrorCode::InvalidSpecification => Self::INVALID_SPECIFICATION_BIT,
        }
    }

    /// Decodes a single-bit code.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            Self::CAPACITY_EXCEEDED_BIT => Some(ErrorCode::CapacityExceeded),
            Self::MISSED_DEADLINE_BIT => Some(ErrorCode::MissedDeadline),
            Self::INVALID_SPECIFICATION_BIT => Some(ErrorCode::InvalidSpecification),
            _ => None,
        }
    }

    /// Returns `true` when the code's bit is set in an error-state byte.
    pub const fn is_set_in(self, error_state: u8) -> bool {
        error_state & self.bits() != 0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::CapacityExceeded => f.write_str("capacity-exceeded"),
            ErrorCode::MissedDeadline => f.write_str("missed-deadline"),
            ErrorCode::InvalidSpecification => f.write_str("invalid-specification"),
        }
    }
}

impl From<ScheduleError> for ErrorCode {
    fn from(value: ScheduleError) -> Self {
        match value {
            ScheduleError::CapacityExceeded => ErrorCode::CapacityExceeded,
            ScheduleError::MissedDeadline { .. } => ErrorCode::MissedDeadline,
            ScheduleError::InvalidSpecification(_) | ScheduleError::Busy => {
                ErrorCode::InvalidSpecification
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_register_bits() {
        let combined = ErrorCode::ALL
            .iter()
            .fold(0u8, |acc, code| acc | code.bits());
        assert_eq!(combined.count_ones(), 3);

        for code in ErrorCode::ALL {
            assert_eq!(ErrorCode::from_bits(code.bits()), Some(code));
            assert!(code.is_set_in(combined));
        }
        assert_eq!(ErrorCode::from_bits(0), None);
    }

    #[test]
    fn schedule_errors_map_to_codes() {
        assert_eq!(
            ErrorCode::from(ScheduleError::CapacityExceeded),
            ErrorCode::CapacityExceeded
        );
        assert_eq!(
            ErrorCode::from(ScheduleError::MissedDeadline { late_by_us: 7 }),
            ErrorCode::MissedDeadline
        );
        assert_eq!(
            ErrorCode::from(ScheduleError::from(SpecError::ZeroPeriod)),
            ErrorCode::InvalidSpecification
        );
    }
}
