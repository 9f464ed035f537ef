//! Bounded cross-core channel capabilities.
//!
//! The timing core consumes task specs and control bytes and produces error
//! codes. Concrete transports (Embassy channels on the target, deques in the
//! simulation) adapt to these traits so the run loop stays transport-agnostic.

use crate::error::ChannelFull;

/// Consumer half of a bounded channel.
pub trait Inbox<T> {
    /// Removes the oldest item without blocking, or returns `None` when the
    /// channel is empty.
    fn try_receive(&mut self) -> Option<T>;

    /// Discards every queued item, returning how many were dropped.
    fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while self.try_receive().is_some() {
            dropped += 1;
        }
        dropped
    }
}

/// Producer half of a bounded channel.
pub trait Outbox<T> {
    /// Attempts to enqueue `item` without blocking, handing it back when the
    /// channel is full.
    fn try_send(&mut self, item: T) -> Result<(), ChannelFull<T>>;

    /// Returns the channel capacity if it is known.
    fn capacity(&self) -> Option<usize> {
        None
    }
}

impl<T, I> Inbox<T> for &mut I
where
    I: Inbox<T> + ?Sized,
{
    fn try_receive(&mut self) -> Option<T> {
        (**self).try_receive()
    }
}

impl<T, O> Outbox<T> for &mut O
where
    O: Outbox<T> + ?Sized,
{
    fn try_send(&mut self, item: T) -> Result<(), ChannelFull<T>> {
        (**self).try_send(item)
    }

    fn capacity(&self) -> Option<usize> {
        (**self).capacity()
    }
}
