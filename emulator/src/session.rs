use pulse_core::channel::{Inbox, Outbox};
use pulse_core::config::TimingConfig;
use pulse_core::error::ErrorCode;
use pulse_core::runner::{RunnerState, TimingCore};
use pulse_core::sim::{RecordingPins, SimAlarm, SimQueue};
use pulse_core::spec::{ControlSignal, TaskSpec};
use pulse_core::telemetry::EventId;
use pulse_core::time::{MAX_COMPARABLE_SPAN_US, Timestamp};

use crate::command::{Command, parse_command};

const SPEC_QUEUE_DEPTH: usize = 16;
const CONTROL_QUEUE_DEPTH: usize = 4;
const ERROR_QUEUE_DEPTH: usize = 8;

type EmulatedCore = TimingCore<
    RecordingPins,
    SimAlarm,
    SimQueue<TaskSpec, SPEC_QUEUE_DEPTH>,
    SimQueue<u8, CONTROL_QUEUE_DEPTH>,
    SimQueue<ErrorCode, ERROR_QUEUE_DEPTH>,
>;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "task",
        "task offset=<us> on=<us> period=<us> mask=<bits> [cycles=<n>] [invert]  - queue a pulse train",
    ),
    ("start", "start        - start every queued pulse train"),
    ("abort", "abort        - stop all trains and park the pins"),
    ("run", "run <us>     - advance simulated time"),
    ("status", "status       - display run-loop and scheduler state"),
    ("help", "help [topic] - show help for a command"),
];

/// Console session around a simulated timing core.
///
/// Simulated time only moves on `run`. Between commands the core is polled
/// once so queued records and control bytes are consumed just as core 1
/// would.
pub struct Session {
    core: EmulatedCore,
    next_event: EventId,
    writes_seen: u32,
    level: u32,
    error_state: u8,
}

impl Session {
    #[must_use]
    pub fn new(start_at: Timestamp) -> Self {
        let core = TimingCore::new(
            RecordingPins::new(),
            SimAlarm::starting_at(start_at),
            SimQueue::new(),
            SimQueue::new(),
            SimQueue::new(),
            TimingConfig::default(),
        );
        Self {
            core,
            next_event: 0,
            writes_seen: 0,
            level: 0,
            error_state: 0,
        }
    }

    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.core.scheduler().alarm().peek_now()
    }

    #[must_use]
    pub fn state(&self) -> RunnerState {
        self.core.state()
    }

    /// Current output register of the simulated pin bank.
    #[must_use]
    pub fn level(&self) -> u32 {
        self.core.scheduler().pins().level()
    }

    /// Error bits reported by the timing core since the session began.
    #[must_use]
    pub fn error_state(&self) -> u8 {
        self.error_state
    }

    pub fn handle_command(&mut self, line: &str) -> Vec<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        match parse_command(trimmed) {
            Ok(Command::Task(spec)) => self.handle_task(spec),
            Ok(Command::Start) => self.handle_control(ControlSignal::Start),
            Ok(Command::Abort) => self.handle_control(ControlSignal::Abort),
            Ok(Command::Run(micros)) => self.handle_run(micros),
            Ok(Command::Status) => self.status_lines(),
            Ok(Command::Help(topic)) => help_lines(topic),
            Ok(Command::Exit) => vec!["OK bye".to_string()],
            Err(err) => vec![format!("ERR syntax {err}")],
        }
    }

    fn handle_task(&mut self, spec: TaskSpec) -> Vec<String> {
        let mut lines = Vec::new();
        if self.core.specs_mut().try_send(spec).is_err() {
            lines.push("ERR spec-queue-full".to_string());
            return lines;
        }
        lines.push(format!(
            "OK task queued offset={} on={} period={} mask={:#x} cycles={}{}",
            spec.offset_us,
            spec.on_time_us,
            spec.period_us,
            spec.port_mask,
            spec.cycles,
            if spec.invert { " invert" } else { "" },
        ));
        self.settle(&mut lines);
        lines
    }

    fn handle_control(&mut self, signal: ControlSignal) -> Vec<String> {
        let mut lines = Vec::new();
        if self.core.controls_mut().try_send(signal.to_byte()).is_err() {
            lines.push("ERR control-queue-full".to_string());
            return lines;
        }
        lines.push(format!("OK {signal}"));
        self.settle(&mut lines);
        lines
    }

    /// Advances the clock alarm to alarm until `micros` have elapsed.
    fn handle_run(&mut self, micros: u32) -> Vec<String> {
        let mut lines = Vec::new();
        if micros > MAX_COMPARABLE_SPAN_US {
            lines.push(format!("ERR run span exceeds {MAX_COMPARABLE_SPAN_US}us"));
            return lines;
        }

        let until = self.now() + micros;
        while let Some(deadline) = self.core.scheduler().alarm().armed_deadline() {
            if until.precedes(deadline) {
                break;
            }
            let alarm = self.core.scheduler_mut().alarm_mut();
            if !alarm.peek_now().has_reached(deadline) {
                alarm.set_now(deadline);
            }
            if alarm.take_fired() {
                self.core.on_alarm();
            }
            self.settle(&mut lines);
        }

        let alarm = self.core.scheduler_mut().alarm_mut();
        if !alarm.peek_now().has_reached(until) {
            alarm.set_now(until);
        }
        self.settle(&mut lines);
        lines.push(format!(
            "OK ran {micros}us now={} state={}",
            self.now(),
            self.state()
        ));
        lines
    }

    fn status_lines(&self) -> Vec<String> {
        let scheduler = self.core.scheduler();
        let stats = scheduler.stats();
        let next_alarm = scheduler
            .alarm()
            .armed_deadline()
            .map_or_else(|| "none".to_string(), |deadline| deadline.to_string());
        vec![
            format!(
                "state={} now={} tasks={} live={} next-alarm={next_alarm}",
                self.state(),
                self.now(),
                scheduler.len(),
                scheduler.live_tasks(),
            ),
            format!(
                "level={:#010x} managed={:#010x} error-state={:#04x} dropped-errors={}",
                self.level(),
                scheduler.managed_mask(),
                self.error_state,
                self.core.dropped_errors(),
            ),
            format!(
                "batches={} transitions={} alarms={} missed={} backlogs={}",
                stats.batches_written,
                stats.transitions,
                stats.alarms_armed,
                stats.missed_deadlines,
                stats.backlogs,
            ),
        ]
    }

    /// Polls the core once and reports everything it produced.
    fn settle(&mut self, lines: &mut Vec<String>) {
        self.core.poll();
        self.collect_writes(lines);
        self.collect_events(lines);
        self.collect_errors(lines);
    }

    fn collect_writes(&mut self, lines: &mut Vec<String>) {
        let now = self.now();
        let pins = self.core.scheduler().pins();
        let fresh = pins.write_count().wrapping_sub(self.writes_seen);
        self.writes_seen = pins.write_count();
        if fresh == 0 {
            return;
        }

        let retained = pins.writes().count();
        let fresh = usize::try_from(fresh).unwrap_or(usize::MAX);
        if fresh > retained {
            lines.push(format!(
                "t={now} ... {} writes not retained",
                fresh - retained
            ));
        }
        for update in pins.writes().skip(retained.saturating_sub(fresh)) {
            self.level = update.apply_to(self.level);
            lines.push(format!(
                "t={now} write mask={:#010x} value={:#010x} level={:#010x}",
                update.mask, update.value, self.level
            ));
        }
        self.level = pins.level();
    }

    fn collect_events(&mut self, lines: &mut Vec<String>) {
        let events = self.core.events();
        for record in events.since(self.next_event) {
            lines.push(format!("telemetry {record}"));
        }
        self.next_event = events.next_id();
    }

    fn collect_errors(&mut self, lines: &mut Vec<String>) {
        while let Some(code) = self.core.errors_mut().try_receive() {
            self.error_state |= code.bits();
            lines.push(format!("ERR timing {code}"));
        }
    }
}

fn help_lines(topic: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    match topic {
        Some(target) => {
            if let Some((_, detail)) = HELP_TOPICS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(target))
            {
                lines.push((*detail).to_string());
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        None => {
            lines.push("Available commands:".to_string());
            for (_, detail) in HELP_TOPICS {
                lines.push(format!("  {detail}"));
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
        }
    }
    lines
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORT_BIT0: u32 = 1 << 8;

    fn session() -> Session {
        Session::new(Timestamp::ZERO)
    }

    fn contains(lines: &[String], needle: &str) -> bool {
        lines.iter().any(|line| line.contains(needle))
    }

    #[test]
    fn square_wave_runs_to_completion() {
        let mut session = session();
        let queued = session.handle_command("task offset=0 on=50 period=100 mask=1 cycles=2");
        assert!(contains(&queued, "OK task queued"));
        assert!(contains(&queued, "task-registered"));
        assert_eq!(session.state(), RunnerState::AwaitingStart);

        let started = session.handle_command("start");
        assert!(contains(&started, "schedule-started"));
        assert_eq!(session.state(), RunnerState::Running);

        // Epoch is 50us after start; the second fall lands at 200us.
        let mut ran = session.handle_command("run 75");
        assert_eq!(session.level() & PORT_BIT0, PORT_BIT0);
        ran.extend(session.handle_command("run 200"));
        assert!(contains(&ran, "schedule-complete"));
        assert_eq!(session.state(), RunnerState::Complete);
        assert_eq!(session.level() & PORT_BIT0, 0);
        assert_eq!(session.now(), Timestamp::from_micros(275));
    }

    #[test]
    fn abort_parks_pins() {
        let mut session = session();
        session.handle_command("task offset=0 on=50 period=100 mask=0x3");
        session.handle_command("start");
        session.handle_command("run 60");
        assert_ne!(session.level(), 0);

        let aborted = session.handle_command("abort");
        assert!(contains(&aborted, "schedule-aborted"));
        assert_eq!(session.state(), RunnerState::Aborted);
        assert_eq!(session.level(), 0);
    }

    #[test]
    fn invalid_task_reports_error_code() {
        let mut session = session();
        let lines = session.handle_command("task offset=0 on=200 period=100 mask=1");
        assert!(contains(&lines, "ERR timing"));
        assert!(ErrorCode::InvalidSpecification.is_set_in(session.error_state()));
        assert_eq!(session.state(), RunnerState::AwaitingTasks);
    }

    #[test]
    fn run_crosses_counter_wrap() {
        let mut session = Session::new(Timestamp::from_micros(u32::MAX - 20));
        session.handle_command("task offset=0 on=10 period=20 mask=1 cycles=3");
        session.handle_command("start");
        session.handle_command("run 200");
        assert_eq!(session.state(), RunnerState::Complete);
        assert_eq!(session.now(), Timestamp::from_micros(179));
    }

    #[test]
    fn syntax_errors_are_reported() {
        let mut session = session();
        let lines = session.handle_command("task on=5");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ERR syntax"));
    }

    #[test]
    fn status_reports_state() {
        let mut session = session();
        let lines = session.handle_command("status");
        assert!(lines[0].starts_with("state=awaiting-tasks"));
    }

    #[test]
    fn help_lists_known_topics() {
        let lines = help_lines(Some("nope"));
        assert!(contains(&lines, "task, start"));
        assert_eq!(help_lines(Some("RUN")).len(), 1);
    }
}
