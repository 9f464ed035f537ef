//! Deadline-ordered scheduler multiplexing pulse tasks onto one alarm.
//!
//! Tasks live in a fixed arena and are ordered by an index heap keyed on
//! their next deadline. Every service pass collects all transitions due at
//! the current instant (plus the pending start batch) into a single masked
//! GPIO write, re-queues the tasks that still need updates, and arms the one
//! hardware alarm for the next earliest deadline.
//!
//! A deadline that is already inside the arming margin is never handed to the
//! alarm. The scheduler waits for it and services it inline instead. Only a
//! deadline that has already passed counts as missed; too many consecutive
//! missed rounds escalate to [`ScheduleError::MissedDeadline`], leaving a
//! recovery alarm armed so draining always continues.
//!
//! The scheduler is a single owned value. Callers that service it from an
//! interrupt as well as a polling loop must wrap it in a critical section;
//! nothing in here is re-entrant.

mod alarm;
mod queue;

pub use alarm::AlarmTimer;
pub use queue::DeadlineQueue;

use heapless::Vec;

use crate::config::{MAX_TASKS, SchedulerConfig};
use crate::error::ScheduleError;
use crate::gpio::{PinBank, PinBatch, PinUpdate};
use crate::task::PulseTask;
use crate::time::Timestamp;

/// Stable arena index of a scheduled task.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TaskSlot(usize);

impl TaskSlot {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Lifecycle of the scheduler between resets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SchedulerPhase {
    /// Accepting tasks; no alarm armed.
    Idle,
    /// Started; the alarm drives the tasks.
    Running,
    /// Every finite task finished; no alarm armed.
    Complete,
}

/// Result of a successful service pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ServiceOutcome {
    /// The scheduler is not running.
    Idle,
    /// Nothing is due yet; the alarm stays armed for the contained time.
    Waiting(Timestamp),
    /// Due work was processed and the alarm re-armed for the contained time.
    Armed(Timestamp),
    /// No task requires further updates.
    Complete,
}

/// Counters accumulated since the last reset.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SchedulerStats {
    pub batches_written: u32,
    pub transitions: u32,
    pub alarms_armed: u32,
    pub missed_deadlines: u32,
    pub backlogs: u32,
}

struct Round {
    truncated: bool,
}

/// Scheduler owning the pin bank, the alarm, and up to `N` pulse tasks.
pub struct DeadlineScheduler<P, A, const N: usize = MAX_TASKS> {
    pins: P,
    alarm: A,
    config: SchedulerConfig,
    tasks: Vec<PulseTask, N>,
    queue: DeadlineQueue<N>,
    /// Start-of-schedule pin state, written when `pending_at` is reached.
    pending: PinBatch,
    pending_at: Option<Timestamp>,
    alarm_queued: bool,
    next_service_at: Option<Timestamp>,
    phase: SchedulerPhase,
    stats: SchedulerStats,
}

impl<P, A, const N: usize> DeadlineScheduler<P, A, N>
where
    P: PinBank,
    A: AlarmTimer,
{
    /// Creates a scheduler with the default timing policy.
    #[must_use]
    pub fn new(pins: P, alarm: A) -> Self {
        Self::with_config(pins, alarm, SchedulerConfig::default())
    }

    /// Creates a scheduler with an explicit timing policy.
    #[must_use]
    pub fn with_config(pins: P, alarm: A, config: SchedulerConfig) -> Self {
        Self {
            pins,
            alarm,
            config,
            tasks: Vec::new(),
            queue: DeadlineQueue::new(),
            pending: PinBatch::new(),
            pending_at: None,
            alarm_queued: false,
            next_service_at: None,
            phase: SchedulerPhase::Idle,
            stats: SchedulerStats::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[must_use]
    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn pins(&self) -> &P {
        &self.pins
    }

    pub fn pins_mut(&mut self) -> &mut P {
        &mut self.pins
    }

    pub fn alarm(&self) -> &A {
        &self.alarm
    }

    pub fn alarm_mut(&mut self) -> &mut A {
        &mut self.alarm
    }

    /// Number of tasks held in the arena, finished ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of tasks still waiting on a future deadline.
    #[must_use]
    pub fn live_tasks(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn tasks(&self) -> &[PulseTask] {
        &self.tasks
    }

    #[must_use]
    pub fn task(&self, slot: TaskSlot) -> Option<&PulseTask> {
        self.tasks.get(slot.index())
    }

    /// Returns `true` while a hardware alarm is armed.
    #[must_use]
    pub fn is_alarm_queued(&self) -> bool {
        self.alarm_queued
    }

    /// Time by which the next service pass must run, if one is pending.
    #[must_use]
    pub fn next_service_at(&self) -> Option<Timestamp> {
        self.next_service_at
    }

    /// Pin state that will be written at the start epoch.
    #[must_use]
    pub fn pending_update(&self) -> PinUpdate {
        self.pending.as_update()
    }

    /// Union of every managed pin.
    #[must_use]
    pub fn managed_mask(&self) -> u32 {
        self.tasks.iter().fold(0, |mask, task| mask | task.pin_mask())
    }

    /// Adds a task to the arena and folds its initial pin state into the
    /// pending start batch.
    pub fn schedule(&mut self, task: PulseTask) -> Result<TaskSlot, ScheduleError> {
        match self.phase {
            SchedulerPhase::Running => return Err(ScheduleError::Busy),
            SchedulerPhase::Complete => {
                self.clear_tasks();
                self.phase = SchedulerPhase::Idle;
            }
            SchedulerPhase::Idle => {}
        }

        let initial = task.initial_update();
        let slot = self.tasks.len();
        self.tasks
            .push(task)
            .map_err(|_| ScheduleError::CapacityExceeded)?;
        self.pending.merge(initial);
        Ok(TaskSlot(slot))
    }

    /// Starts every scheduled task at a common epoch and arms the first alarm.
    ///
    /// A no-op returning [`ServiceOutcome::Idle`] when no tasks are scheduled.
    pub fn start(&mut self) -> Result<ServiceOutcome, ScheduleError> {
        match self.phase {
            SchedulerPhase::Running => return Err(ScheduleError::Busy),
            SchedulerPhase::Complete => {
                self.rebuild_pending();
                self.phase = SchedulerPhase::Idle;
            }
            SchedulerPhase::Idle => {}
        }
        if self.tasks.is_empty() {
            return Ok(ServiceOutcome::Idle);
        }

        let epoch = self.alarm.now() + self.config.start_lead_us();
        self.queue.clear();
        for slot in 0..self.tasks.len() {
            self.tasks[slot].start_at_time(epoch);
            self.enqueue(slot);
        }
        self.pending_at = Some(epoch);
        self.next_service_at = None;
        self.phase = SchedulerPhase::Running;
        self.service()
    }

    /// Processes everything due now, writes one batch, and re-arms.
    ///
    /// Safe to call spuriously: returns [`ServiceOutcome::Waiting`] without
    /// side effects until the armed deadline is reached.
    pub fn service(&mut self) -> Result<ServiceOutcome, ScheduleError> {
        if self.phase != SchedulerPhase::Running {
            return Ok(ServiceOutcome::Idle);
        }
        let mut now = self.alarm.now();
        if let Some(at) = self.next_service_at
            && !now.has_reached(at)
        {
            return Ok(ServiceOutcome::Waiting(at));
        }
        self.release_alarm();

        let margin = self.config.arming_margin_us();
        let mut missed_rounds: u8 = 0;
        let mut inline_rounds = 0usize;
        loop {
            let round = self.run_round(now);

            let Some(next) = self.next_deadline() else {
                self.phase = SchedulerPhase::Complete;
                return Ok(ServiceOutcome::Complete);
            };

            now = self.alarm.now();
            let lead = next.signed_micros_since(now);
            if !round.truncated && i64::from(lead) >= i64::from(margin) {
                self.arm(next);
                return Ok(ServiceOutcome::Armed(next));
            }

            // Only a deadline already in the past counts as missed; one
            // inside the margin is waited for and still lands on time.
            if lead < 0 {
                self.stats.missed_deadlines = self.stats.missed_deadlines.saturating_add(1);
                missed_rounds = missed_rounds.saturating_add(1);
            }
            if round.truncated || missed_rounds > self.config.max_catchup_rounds() {
                self.stats.backlogs = self.stats.backlogs.saturating_add(1);
                self.arm(now + margin);
                let late_by_us = if lead < 0 { lead.unsigned_abs() } else { 0 };
                return Err(ScheduleError::MissedDeadline { late_by_us });
            }

            // A schedule that keeps every deadline inside the margin still
            // hands control back to the run loop once per transition budget.
            inline_rounds += 1;
            if inline_rounds > self.config.max_transitions_per_round() {
                let resume = now + margin;
                self.arm(resume);
                return Ok(ServiceOutcome::Armed(resume));
            }

            if lead > 0 {
                self.alarm.wait_until(next);
                now = self.alarm.now();
            }
        }
    }

    /// Disarms the alarm, parks every managed pin at its inactive level in
    /// one write, and drops all tasks.
    pub fn reset(&mut self) -> Option<PinUpdate> {
        self.reset_with(|_| {})
    }

    /// Same as [`DeadlineScheduler::reset`]; `on_retired` observes each task
    /// after it has been retired and before it is dropped.
    pub fn reset_with<F>(&mut self, mut on_retired: F) -> Option<PinUpdate>
    where
        F: FnMut(&PulseTask),
    {
        self.release_alarm();
        let mut park = PinBatch::new();
        for task in &mut self.tasks {
            park.merge(task.retire());
            on_retired(task);
        }
        let written = park.flush(&mut self.pins);
        if written.is_some() {
            self.stats.batches_written = self.stats.batches_written.saturating_add(1);
        }
        self.clear_tasks();
        self.phase = SchedulerPhase::Idle;
        written
    }

    /// Alias for [`DeadlineScheduler::reset`].
    pub fn clear(&mut self) -> Option<PinUpdate> {
        self.reset()
    }

    fn run_round(&mut self, now: Timestamp) -> Round {
        let mut batch = PinBatch::new();
        if let Some(at) = self.pending_at
            && now.has_reached(at)
        {
            batch.merge(self.pending.take());
            self.pending_at = None;
        }

        let budget = self.config.max_transitions_per_round();
        let mut transitions = 0usize;
        let mut truncated = false;
        while let Some(slot) = self.queue.peek() {
            if !self.tasks[slot].is_due(now) {
                break;
            }
            if transitions >= budget {
                truncated = true;
                break;
            }
            let tasks = &self.tasks;
            self.queue.pop(|index| tasks[index].next_deadline());

            batch.merge(self.tasks[slot].update());
            transitions += 1;
            if self.tasks[slot].requires_future_update() {
                self.enqueue(slot);
            }
        }

        if batch.flush(&mut self.pins).is_some() {
            self.stats.batches_written = self.stats.batches_written.saturating_add(1);
        }
        let transitions = u32::try_from(transitions).unwrap_or(u32::MAX);
        self.stats.transitions = self.stats.transitions.saturating_add(transitions);
        Round { truncated }
    }

    fn next_deadline(&self) -> Option<Timestamp> {
        let task_deadline = self
            .queue
            .peek()
            .map(|slot| self.tasks[slot].next_deadline());
        match (self.pending_at, task_deadline) {
            (Some(pending), Some(task)) => Some(pending.earliest(task)),
            (pending, task) => pending.or(task),
        }
    }

    fn enqueue(&mut self, slot: usize) {
        let tasks = &self.tasks;
        // The heap shares the arena's capacity and holds each slot at most
        // once, so a push can never overflow.
        let _ = self.queue.push(slot, |index| tasks[index].next_deadline());
    }

    fn arm(&mut self, deadline: Timestamp) {
        if self.alarm_queued {
            self.alarm.disarm();
        }
        self.alarm.arm(deadline);
        self.alarm_queued = true;
        self.next_service_at = Some(deadline);
        self.stats.alarms_armed = self.stats.alarms_armed.saturating_add(1);
    }

    fn release_alarm(&mut self) {
        if self.alarm_queued {
            self.alarm.disarm();
            self.alarm_queued = false;
        }
        self.next_service_at = None;
    }

    fn rebuild_pending(&mut self) {
        self.pending = PinBatch::new();
        for task in &self.tasks {
            self.pending.merge(task.initial_update());
        }
    }

    fn clear_tasks(&mut self) {
        self.tasks.clear();
        self.queue.clear();
        self.pending = PinBatch::new();
        self.pending_at = None;
        self.next_service_at = None;
    }
}
