//! Wrapping 32-bit microsecond timestamps.
//!
//! The hardware timer exposes a free-running microsecond counter whose low
//! word wraps every 2^32 µs (~71.6 minutes). All deadline arithmetic in the
//! engine works on that low word, so ordering must be computed from the signed
//! difference between two values rather than a plain `<`: two timestamps are
//! comparable as long as they sit within 2^31 µs of each other.

use core::{cmp::Ordering, fmt, ops::Add};

/// Largest span (µs) that can separate two comparable timestamps.
pub const MAX_COMPARABLE_SPAN_US: u32 = i32::MAX as u32;

/// Absolute reading of the 32-bit microsecond counter.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Timestamp(u32);

impl Timestamp {
    /// Counter value zero.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw counter reading.
    pub const fn from_micros(micros: u32) -> Self {
        Self(micros)
    }

    /// Returns the raw counter reading.
    pub const fn as_micros(self) -> u32 {
        self.0
    }

    /// Signed distance from `earlier` to `self` in microseconds.
    ///
    /// Positive when `self` lies after `earlier`, negative when before.
    #[allow(clippy::cast_possible_wrap)]
    pub const fn signed_micros_since(self, earlier: Self) -> i32 {
        self.0.wrapping_sub(earlier.0) as i32
    }

    /// Returns `true` once `self` (read as "now") is at or past `deadline`.
    ///
    /// Remains correct across wraparound: a deadline set just below
    /// `u32::MAX` is still reported as reached after the counter wraps to a
    /// small value.
    pub const fn has_reached(self, deadline: Self) -> bool {
        self.signed_micros_since(deadline) >= 0
    }

    /// Wraparound-safe ordering of two deadlines (earlier sorts first).
    pub const fn deadline_cmp(self, other: Self) -> Ordering {
        let delta = self.signed_micros_since(other);
        if delta < 0 {
            Ordering::Less
        } else if delta > 0 {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }

    /// Returns `true` when `self` is strictly earlier than `other`.
    pub const fn precedes(self, other: Self) -> bool {
        self.signed_micros_since(other) < 0
    }

    /// Adds a microsecond offset, wrapping at 2^32.
    #[must_use]
    pub const fn wrapping_add_micros(self, micros: u32) -> Self {
        Self(self.0.wrapping_add(micros))
    }

    /// Returns the earlier of two deadlines under wraparound ordering.
    #[must_use]
    pub const fn earliest(self, other: Self) -> Self {
        if other.precedes(self) { other } else { self }
    }
}

impl Add<u32> for Timestamp {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        self.wrapping_add_micros(rhs)
    }
}

impl From<u32> for Timestamp {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reached_at_and_after_deadline() {
        let deadline = Timestamp::from_micros(1_000);
        assert!(!Timestamp::from_micros(999).has_reached(deadline));
        assert!(Timestamp::from_micros(1_000).has_reached(deadline));
        assert!(Timestamp::from_micros(1_001).has_reached(deadline));
    }

    #[test]
    fn reached_survives_counter_wrap() {
        let deadline = Timestamp::from_micros(u32::MAX - 10);
        let wrapped_now = Timestamp::from_micros(5);
        assert!(wrapped_now.has_reached(deadline));
        assert!(!deadline.has_reached(wrapped_now));
        assert_eq!(wrapped_now.signed_micros_since(deadline), 16);
    }

    #[test]
    fn deadline_ordering_is_wrap_aware() {
        let late_before_wrap = Timestamp::from_micros(u32::MAX - 1);
        let early_after_wrap = late_before_wrap + 4;
        assert_eq!(early_after_wrap.as_micros(), 2);
        assert_eq!(
            late_before_wrap.deadline_cmp(early_after_wrap),
            Ordering::Less
        );
        assert!(late_before_wrap.precedes(early_after_wrap));
        assert_eq!(
            late_before_wrap.earliest(early_after_wrap),
            late_before_wrap
        );
        assert_eq!(
            early_after_wrap.deadline_cmp(early_after_wrap),
            Ordering::Equal
        );
    }
}
