//! Cross-core queues and their `pulse-core` adapters.
//!
//! The protocol core owns the senders for spec and control records and the
//! receiver for error codes; the timing core owns the opposite ends, wrapped
//! so they satisfy the `Inbox`/`Outbox` capabilities the run loop expects.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender, TrySendError};
use pulse_core::channel::{Inbox, Outbox};
use pulse_core::error::{ChannelFull, ErrorCode};
use pulse_core::spec::TaskSpec;

use crate::config::{CONTROL_QUEUE_DEPTH, ERROR_QUEUE_DEPTH, SPEC_QUEUE_DEPTH};

// Both cores touch every queue, so the target needs a lock that spans cores.
#[cfg(target_os = "none")]
pub type LinkMutex = CriticalSectionRawMutex;
#[cfg(not(target_os = "none"))]
pub type LinkMutex = NoopRawMutex;

pub type SpecQueue = Channel<LinkMutex, TaskSpec, SPEC_QUEUE_DEPTH>;
pub type ControlQueue = Channel<LinkMutex, u8, CONTROL_QUEUE_DEPTH>;
pub type ErrorQueue = Channel<LinkMutex, ErrorCode, ERROR_QUEUE_DEPTH>;

pub type SpecSender<'a> = Sender<'a, LinkMutex, TaskSpec, SPEC_QUEUE_DEPTH>;
pub type ControlSender<'a> = Sender<'a, LinkMutex, u8, CONTROL_QUEUE_DEPTH>;
pub type ErrorReceiver<'a> = Receiver<'a, LinkMutex, ErrorCode, ERROR_QUEUE_DEPTH>;

/// Timing-core end of the spec queue.
pub struct SpecInbox<'a> {
    receiver: Receiver<'a, LinkMutex, TaskSpec, SPEC_QUEUE_DEPTH>,
}

impl<'a> SpecInbox<'a> {
    pub fn new(queue: &'a SpecQueue) -> Self {
        Self {
            receiver: queue.receiver(),
        }
    }
}

impl Inbox<TaskSpec> for SpecInbox<'_> {
    fn try_receive(&mut self) -> Option<TaskSpec> {
        self.receiver.try_receive().ok()
    }
}

/// Timing-core end of the control queue.
pub struct ControlInbox<'a> {
    receiver: Receiver<'a, LinkMutex, u8, CONTROL_QUEUE_DEPTH>,
}

impl<'a> ControlInbox<'a> {
    pub fn new(queue: &'a ControlQueue) -> Self {
        Self {
            receiver: queue.receiver(),
        }
    }
}

impl Inbox<u8> for ControlInbox<'_> {
    fn try_receive(&mut self) -> Option<u8> {
        self.receiver.try_receive().ok()
    }
}

/// Timing-core end of the error queue.
pub struct ErrorOutbox<'a> {
    sender: Sender<'a, LinkMutex, ErrorCode, ERROR_QUEUE_DEPTH>,
}

impl<'a> ErrorOutbox<'a> {
    pub fn new(queue: &'a ErrorQueue) -> Self {
        Self {
            sender: queue.sender(),
        }
    }
}

impl Outbox<ErrorCode> for ErrorOutbox<'_> {
    fn try_send(&mut self, item: ErrorCode) -> Result<(), ChannelFull<ErrorCode>> {
        self.sender.try_send(item).map_err(|TrySendError::Full(code)| ChannelFull(code))
    }

    fn capacity(&self) -> Option<usize> {
        Some(ERROR_QUEUE_DEPTH)
    }
}
