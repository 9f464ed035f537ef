//! Hardware alarm abstraction.

use crate::time::Timestamp;

/// Single-shot alarm on the free-running microsecond counter.
///
/// Implementations own exactly one alarm slot. The scheduler guarantees that
/// `arm` is only ever called while the slot is disarmed.
pub trait AlarmTimer {
    /// Current low word of the microsecond counter.
    fn now(&self) -> Timestamp;

    /// Arms the alarm to fire when the counter reaches `deadline`.
    fn arm(&mut self, deadline: Timestamp);

    /// Cancels a pending alarm. Harmless when nothing is armed.
    fn disarm(&mut self);

    /// Spins until `deadline` is reached. Used for deadlines too close to
    /// trust to the alarm.
    fn wait_until(&mut self, deadline: Timestamp) {
        while !self.now().has_reached(deadline) {
            core::hint::spin_loop();
        }
    }
}
