//! Masked GPIO boundary.
//!
//! Pins are never touched individually. Every output action is a
//! `(mask, value)` pair applied with a single masked read/modify/write so that
//! edges belonging to the same batch become visible at the same instant.

/// Logical level driven onto a set of pins.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Converts a boolean into a level (`true` is high).
    pub const fn from_high(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }

    /// Returns `true` for [`Level::High`].
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

/// A single masked output action: bits in `mask` take the value of the
/// matching bits in `value`; all other pins keep their state.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PinUpdate {
    pub mask: u32,
    pub value: u32,
}

impl PinUpdate {
    /// Drives every pin in `mask` to `level`.
    pub const fn drive(mask: u32, level: Level) -> Self {
        Self {
            mask,
            value: if level.is_high() { mask } else { 0 },
        }
    }

    /// Returns `true` when the update touches no pins.
    pub const fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// Level the update drives onto the pins in `mask`, if they agree.
    pub const fn uniform_level(&self) -> Option<Level> {
        if self.value & self.mask == self.mask {
            Some(Level::High)
        } else if self.value & self.mask == 0 {
            Some(Level::Low)
        } else {
            None
        }
    }

    /// Applies the update to a snapshot of the output register.
    pub const fn apply_to(&self, current: u32) -> u32 {
        (current & !self.mask) | (self.value & self.mask)
    }
}

/// Accumulates several [`PinUpdate`]s into one masked write.
///
/// Later merges win on overlapping bits, matching the order in which the
/// transitions were computed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PinBatch {
    update: PinUpdate,
}

impl PinBatch {
    /// Creates an empty batch.
    pub const fn new() -> Self {
        Self {
            update: PinUpdate { mask: 0, value: 0 },
        }
    }

    /// Folds `update` into the batch.
    pub fn merge(&mut self, update: PinUpdate) {
        self.update.value = update.apply_to(self.update.value);
        self.update.mask |= update.mask;
    }

    /// Returns `true` when nothing has been merged.
    pub const fn is_empty(&self) -> bool {
        self.update.is_empty()
    }

    /// Returns the combined update.
    pub const fn as_update(&self) -> PinUpdate {
        self.update
    }

    /// Empties the batch, returning its previous contents.
    pub fn take(&mut self) -> PinUpdate {
        core::mem::take(&mut self.update)
    }

    /// Writes the batch through `pins` (one masked write) and empties it.
    ///
    /// Returns the applied update, or `None` when the batch was empty and no
    /// write happened.
    pub fn flush<P: PinBank>(&mut self, pins: &mut P) -> Option<PinUpdate> {
        if self.is_empty() {
            return None;
        }
        let update = self.take();
        pins.put_masked(update.mask, update.value);
        Some(update)
    }
}

/// Masked access to the output register of a GPIO bank.
pub trait PinBank {
    /// Sets the pins selected by `mask` to the matching bits of `value` in a
    /// single operation.
    fn put_masked(&mut self, mask: u32, value: u32);

    /// Convenience wrapper around [`PinBank::put_masked`].
    fn apply(&mut self, update: PinUpdate) {
        if !update.is_empty() {
            self.put_masked(update.mask, update.value);
        }
    }
}

/// Pin bank that performs no hardware interaction.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopPinBank;

impl NoopPinBank {
    /// Creates a new no-op pin bank.
    pub const fn new() -> Self {
        Self
    }
}

impl PinBank for NoopPinBank {
    fn put_masked(&mut self, _: u32, _: u32) {}
}
