//! Timing-core run loop.
//!
//! [`TimingCore`] owns the scheduler and the consumer/producer ends of the
//! three cross-core channels. The dedicated core calls [`TimingCore::poll`]
//! in a tight loop; the alarm interrupt calls [`TimingCore::on_alarm`]. Both
//! must run under the same critical section.

use core::fmt;

use crate::channel::{Inbox, Outbox};
use crate::config::{MAX_TASKS, TimingConfig};
use crate::error::{ErrorCode, ScheduleError};
use crate::gpio::PinBank;
use crate::scheduler::{AlarmTimer, DeadlineScheduler, ServiceOutcome};
use crate::spec::{ControlSignal, TaskSpec};
use crate::telemetry::{EventLog, TimingEvent, TimingPayload};
use crate::time::Timestamp;

/// Lifecycle of one batch of pulse trains.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunnerState {
    AwaitingTasks,
    AwaitingStart,
    Running,
    Complete,
    Aborted,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerState::AwaitingTasks => f.write_str("awaiting-tasks"),
            RunnerState::AwaitingStart => f.write_str("awaiting-start"),
            RunnerState::Running => f.write_str("running"),
            RunnerState::Complete => f.write_str("complete"),
            RunnerState::Aborted => f.write_str("aborted"),
        }
    }
}

/// Scheduler plus channel plumbing driven by the dedicated timing core.
pub struct TimingCore<P, A, S, C, E, const N: usize = MAX_TASKS> {
    scheduler: DeadlineScheduler<P, A, N>,
    specs: S,
    controls: C,
    errors: E,
    port_base: u8,
    state: RunnerState,
    started_at: Option<Timestamp>,
    dropped_errors: u32,
    events: EventLog,
}

impl<P, A, S, C, E, const N: usize> TimingCore<P, A, S, C, E, N>
where
    P: PinBank,
    A: AlarmTimer,
    S: Inbox<TaskSpec>,
    C: Inbox<u8>,
    E: Outbox<ErrorCode>,
{
    pub fn new(pins: P, alarm: A, specs: S, controls: C, errors: E, config: TimingConfig) -> Self {
        Self {
            scheduler: DeadlineScheduler::with_config(pins, alarm, config.scheduler),
            specs,
            controls,
            errors,
            port_base: config.port_base,
            state: RunnerState::AwaitingTasks,
            started_at: None,
            dropped_errors: 0,
            events: EventLog::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Error codes lost because the error channel was full.
    #[must_use]
    pub fn dropped_errors(&self) -> u32 {
        self.dropped_errors
    }

    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    #[must_use]
    pub fn scheduler(&self) -> &DeadlineScheduler<P, A, N> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut DeadlineScheduler<P, A, N> {
        &mut self.scheduler
    }

    pub fn specs_mut(&mut self) -> &mut S {
        &mut self.specs
    }

    pub fn controls_mut(&mut self) -> &mut C {
        &mut self.controls
    }

    pub fn errors_mut(&mut self) -> &mut E {
        &mut self.errors
    }

    /// Runs one iteration of the loop and returns the resulting state.
    ///
    /// Spec records are only consumed between schedules; while running they
    /// stay queued for the next batch.
    pub fn poll(&mut self) -> RunnerState {
        if matches!(self.state, RunnerState::Complete | RunnerState::Aborted) {
            self.state = RunnerState::AwaitingTasks;
        }
        if self.state != RunnerState::Running {
            self.register_pending();
        }

        match self.controls.try_receive().map(ControlSignal::from_byte) {
            Some(ControlSignal::Abort) => {
                self.abort();
                return self.state;
            }
            Some(ControlSignal::Start) => self.start(),
            Some(ControlSignal::Idle) | None => {}
        }

        if self.state == RunnerState::Running {
            self.service();
        }
        self.state
    }

    /// Alarm interrupt entry point.
    pub fn on_alarm(&mut self) {
        if self.state == RunnerState::Running {
            self.service();
        }
    }

    /// Stops every task, parks the pins, and discards queued spec records.
    pub fn abort(&mut self) {
        let elapsed = self.elapsed_micros();
        self.scheduler.reset();
        self.specs.drain();
        self.started_at = None;
        self.state = RunnerState::Aborted;
        self.log(
            TimingEvent::ScheduleAborted,
            elapsed.map_or(TimingPayload::None, |micros| TimingPayload::Elapsed {
                micros,
            }),
        );
    }

    fn register_pending(&mut self) {
        while let Some(spec) = self.specs.try_receive() {
            let registered = spec
                .to_task(self.port_base)
                .map_err(ScheduleError::from)
                .and_then(|task| self.scheduler.schedule(task));
            match registered {
                Ok(slot) => {
                    let pin_mask = self
                        .scheduler
                        .task(slot)
                        .map_or(0, crate::task::PulseTask::pin_mask);
                    let slot = u8::try_from(slot.index()).unwrap_or(u8::MAX);
                    self.log(
                        TimingEvent::TaskRegistered,
                        TimingPayload::Task { slot, pin_mask },
                    );
                    self.state = RunnerState::AwaitingStart;
                }
                Err(err) => {
                    let code = ErrorCode::from(err);
                    self.log(TimingEvent::TaskRejected(code), TimingPayload::None);
                    self.report(code);
                }
            }
        }
    }

    fn start(&mut self) {
        match self.state {
            RunnerState::Running => {}
            RunnerState::AwaitingTasks => {
                self.log(TimingEvent::ScheduleComplete, TimingPayload::None);
                self.state = RunnerState::Complete;
            }
            _ => {
                let tasks = u8::try_from(self.scheduler.len()).unwrap_or(u8::MAX);
                self.started_at = Some(self.now());
                self.log(
                    TimingEvent::ScheduleStarted,
                    TimingPayload::Schedule { tasks },
                );
                self.state = RunnerState::Running;
                let outcome = self.scheduler.start();
                self.handle(outcome);
            }
        }
    }

    fn service(&mut self) {
        let outcome = self.scheduler.service();
        self.handle(outcome);
    }

    fn handle(&mut self, outcome: Result<ServiceOutcome, ScheduleError>) {
        match outcome {
            Ok(ServiceOutcome::Complete) => {
                let elapsed = self.elapsed_micros().unwrap_or(0);
                self.started_at = None;
                self.state = RunnerState::Complete;
                self.log(
                    TimingEvent::ScheduleComplete,
                    TimingPayload::Elapsed { micros: elapsed },
                );
            }
            Ok(ServiceOutcome::Idle | ServiceOutcome::Waiting(_) | ServiceOutcome::Armed(_)) => {}
            Err(ScheduleError::MissedDeadline { late_by_us }) => {
                self.log(
                    TimingEvent::DeadlineBacklog,
                    TimingPayload::Late { micros: late_by_us },
                );
                self.report(ErrorCode::MissedDeadline);
            }
            Err(err) => self.report(ErrorCode::from(err)),
        }
    }

    fn report(&mut self, code: ErrorCode) {
        match self.errors.try_send(code) {
            Ok(()) => self.log(TimingEvent::ErrorReported(code), TimingPayload::None),
            Err(_) => {
                self.dropped_errors = self.dropped_errors.saturating_add(1);
                self.log(TimingEvent::ErrorDropped(code), TimingPayload::None);
            }
        }
    }

    fn log(&mut self, event: TimingEvent, payload: TimingPayload) {
        let now = self.now();
        self.events.record(event, payload, now);
    }

    fn now(&self) -> Timestamp {
        self.scheduler.alarm().now()
    }

    fn elapsed_micros(&self) -> Option<u32> {
        let started = self.started_at?;
        u32::try_from(self.now().signed_micros_since(started)).ok()
    }
}
