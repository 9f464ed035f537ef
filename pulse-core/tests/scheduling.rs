use pulse_core::config::{MAX_TASKS, SchedulerConfig};
use pulse_core::error::ScheduleError;
use pulse_core::gpio::PinUpdate;
use pulse_core::scheduler::{DeadlineScheduler, SchedulerPhase, ServiceOutcome};
use pulse_core::sim::{RecordingPins, SimAlarm};
use pulse_core::task::{PulseParams, PulseTask};
use pulse_core::time::Timestamp;

type Scheduler = DeadlineScheduler<RecordingPins, SimAlarm>;

const START_LEAD_US: u32 = 20;

fn scheduler_at(start: u32) -> Scheduler {
    DeadlineScheduler::with_config(
        RecordingPins::new(),
        SimAlarm::starting_at(Timestamp::from_micros(start)),
        SchedulerConfig::new().with_start_lead_us(START_LEAD_US),
    )
}

fn task(params: PulseParams) -> PulseTask {
    PulseTask::new(params).expect("parameters should validate")
}

/// Jumps to the armed deadline, services it, and returns the time it fired.
fn fire<const N: usize>(
    scheduler: &mut DeadlineScheduler<RecordingPins, SimAlarm, N>,
) -> (Timestamp, Result<ServiceOutcome, ScheduleError>) {
    let deadline = scheduler
        .alarm()
        .armed_deadline()
        .expect("an alarm should be armed while running");
    scheduler.alarm_mut().set_now(deadline);
    (deadline, scheduler.service())
}

#[test]
fn square_wave_toggles_every_half_period() {
    let mut scheduler = scheduler_at(1_000);
    scheduler
        .schedule(task(PulseParams::new(0, 5, 10, 0x1)))
        .unwrap();
    scheduler.start().unwrap();

    let epoch = Timestamp::from_micros(1_000 + START_LEAD_US);
    let mut expected_level = 0x1;
    for step in 0..20u32 {
        let (at, outcome) = fire(&mut scheduler);
        assert_eq!(at, epoch + step * 5);
        assert_eq!(outcome, Ok(ServiceOutcome::Armed(at + 5)));
        assert_eq!(scheduler.pins().level(), expected_level, "step {step}");
        expected_level ^= 0x1;
    }
    assert_eq!(scheduler.phase(), SchedulerPhase::Running);
}

#[test]
fn three_cycle_train_stops_after_third_fall() {
    let mut scheduler = scheduler_at(0);
    let slot = scheduler
        .schedule(task(PulseParams::new(0, 100, 200, 0x1).with_repeat_count(3)))
        .unwrap();
    scheduler.start().unwrap();
    let epoch = Timestamp::from_micros(START_LEAD_US);

    let mut edges = heapless::Vec::<(u32, u32), 8>::new();
    loop {
        let (at, outcome) = fire(&mut scheduler);
        edges
            .push((at.signed_micros_since(epoch).unsigned_abs(), scheduler.pins().level()))
            .unwrap();
        if outcome == Ok(ServiceOutcome::Complete) {
            break;
        }
    }

    assert_eq!(
        edges.as_slice(),
        &[(0, 1), (100, 0), (200, 1), (300, 0), (400, 1), (500, 0)]
    );
    let task = scheduler.task(slot).unwrap();
    assert_eq!(task.cycles_done(), 3);
    assert_eq!(task.next_deadline(), epoch + 600);
    assert!(!task.requires_future_update());
    assert!(!scheduler.alarm().is_armed());
}

#[test]
fn finite_task_emits_exactly_n_falls() {
    let mut scheduler = scheduler_at(0);
    scheduler
        .schedule(task(PulseParams::new(7, 5, 11, 0x4).with_repeat_count(5)))
        .unwrap();
    scheduler.start().unwrap();

    let mut falls = 0;
    loop {
        let before = scheduler.pins().level();
        let (_, outcome) = fire(&mut scheduler);
        if before & 0x4 != 0 && scheduler.pins().level() & 0x4 == 0 {
            falls += 1;
        }
        if outcome == Ok(ServiceOutcome::Complete) {
            break;
        }
    }
    assert_eq!(falls, 5);
    assert_eq!(scheduler.live_tasks(), 0);
}

#[test]
fn sixty_fifth_task_is_rejected_without_touching_the_rest() {
    let mut scheduler = scheduler_at(0);
    for index in 0..MAX_TASKS {
        let mask = 1u32 << (index % 32);
        scheduler
            .schedule(task(PulseParams::new(0, 5, 10, mask)))
            .unwrap();
    }
    let pending_before = scheduler.pending_update();

    assert_eq!(
        scheduler.schedule(task(PulseParams::new(0, 5, 10, 0x1))),
        Err(ScheduleError::CapacityExceeded)
    );
    assert_eq!(scheduler.len(), MAX_TASKS);
    assert_eq!(scheduler.pending_update(), pending_before);
    assert!(scheduler.tasks().iter().all(PulseTask::requires_future_update));
}

#[test]
fn coincident_edges_across_tasks_share_one_write() {
    let mut scheduler = scheduler_at(0);
    scheduler
        .schedule(task(PulseParams::new(0, 10, 20, 0x01)))
        .unwrap();
    scheduler
        .schedule(task(PulseParams::new(10, 10, 20, 0x02)))
        .unwrap();
    scheduler
        .schedule(task(PulseParams::new(0, 10, 40, 0x04)))
        .unwrap();
    scheduler.start().unwrap();

    fire(&mut scheduler);
    assert_eq!(scheduler.pins().level(), 0x05);
    let writes = scheduler.pins().write_count();

    // At epoch + 10 task 0 and 2 fall while task 1 rises.
    fire(&mut scheduler);
    assert_eq!(scheduler.pins().write_count(), writes + 1);
    assert_eq!(
        scheduler.pins().last_write(),
        Some(PinUpdate {
            mask: 0x07,
            value: 0x02
        })
    );
}

#[test]
fn delayed_task_idles_inactive_until_its_offset() {
    let mut scheduler = scheduler_at(0);
    scheduler
        .schedule(task(PulseParams::new(0, 5, 10, 0x1)))
        .unwrap();
    scheduler
        .schedule(task(PulseParams::new(15, 5, 10, 0x2).with_invert(true)))
        .unwrap();
    assert_eq!(
        scheduler.pending_update(),
        PinUpdate {
            mask: 0x3,
            value: 0x3
        }
    );
    scheduler.start().unwrap();
    let epoch = Timestamp::from_micros(START_LEAD_US);

    loop {
        let (at, _) = fire(&mut scheduler);
        if at.has_reached(epoch + 15) {
            break;
        }
        assert_eq!(scheduler.pins().level() & 0x2, 0x2, "idle at inactive high");
    }
    assert_eq!(scheduler.pins().level() & 0x2, 0, "active phase drives low");
}

#[test]
fn only_one_alarm_is_ever_armed() {
    let mut scheduler = scheduler_at(0);
    for (delay, mask) in [(0, 0x1), (3, 0x2), (6, 0x4), (9, 0x8)] {
        scheduler
            .schedule(task(PulseParams::new(delay, 4, 13, mask).with_repeat_count(6)))
            .unwrap();
    }
    scheduler.start().unwrap();

    let mut services = 0;
    while scheduler.phase() == SchedulerPhase::Running {
        assert!(scheduler.is_alarm_queued());
        let _ = fire(&mut scheduler);
        services += 1;
        assert!(services < 1_000, "schedule should finish");
    }
    assert_eq!(scheduler.alarm().overlapping_arms(), 0);
    assert!(!scheduler.is_alarm_queued());
    assert_eq!(scheduler.pins().level(), 0);
}

#[test]
fn schedule_runs_across_counter_wraparound() {
    let mut scheduler = scheduler_at(u32::MAX - 40);
    scheduler
        .schedule(task(PulseParams::new(0, 5, 10, 0x1)))
        .unwrap();
    scheduler.start().unwrap();

    let mut previous: Option<Timestamp> = None;
    for _ in 0..20 {
        let (at, outcome) = fire(&mut scheduler);
        assert!(matches!(outcome, Ok(ServiceOutcome::Armed(_))));
        if let Some(previous) = previous {
            assert_eq!(at.signed_micros_since(previous), 5);
        }
        previous = Some(at);
    }
    let last = previous.unwrap();
    assert!(last.as_micros() < 100, "clock should have wrapped");
}

#[test]
fn reset_parks_everything_and_allows_a_fresh_batch() {
    let mut scheduler = scheduler_at(0);
    scheduler
        .schedule(task(PulseParams::new(0, 5, 10, 0x1)))
        .unwrap();
    scheduler
        .schedule(task(PulseParams::new(0, 5, 10, 0x2).with_invert(true)))
        .unwrap();
    scheduler.start().unwrap();
    fire(&mut scheduler);

    let parked = scheduler.reset();
    assert_eq!(
        parked,
        Some(PinUpdate {
            mask: 0x3,
            value: 0x2
        })
    );
    assert_eq!(scheduler.pins().level(), 0x2);
    assert!(!scheduler.alarm().is_armed());
    assert_eq!(scheduler.live_tasks(), 0);

    scheduler
        .schedule(task(PulseParams::new(0, 5, 10, 0x4)))
        .unwrap();
    assert!(matches!(scheduler.start(), Ok(ServiceOutcome::Armed(_))));
    fire(&mut scheduler);
    assert_eq!(scheduler.pins().level() & 0x4, 0x4);
}

#[test]
fn slow_service_reports_backlog_but_keeps_draining() {
    let mut scheduler = DeadlineScheduler::<_, _, 4>::with_config(
        RecordingPins::new(),
        SimAlarm::new().with_read_cost_us(15),
        SchedulerConfig::new()
            .with_start_lead_us(100)
            .with_max_catchup_rounds(1),
    );
    scheduler
        .schedule(task(PulseParams::new(0, 3, 6, 0x1).with_repeat_count(200)))
        .unwrap();
    scheduler.start().unwrap();

    let mut backlogs = 0;
    for _ in 0..50 {
        if scheduler.phase() != SchedulerPhase::Running {
            break;
        }
        let (_, outcome) = fire(&mut scheduler);
        if let Err(ScheduleError::MissedDeadline { late_by_us }) = outcome {
            assert!(late_by_us > 0);
            backlogs += 1;
            assert!(scheduler.is_alarm_queued(), "recovery alarm must be armed");
        }
    }
    assert!(backlogs > 0);
    assert_eq!(scheduler.stats().backlogs, backlogs);
    assert!(scheduler.stats().missed_deadlines >= backlogs);
}

#[test]
fn staggered_phases_inside_margin_stay_on_time() {
    let mut scheduler = scheduler_at(0);
    for delay in 1..=12u32 {
        scheduler
            .schedule(task(PulseParams::new(delay, 50, 100, 1 << delay)))
            .unwrap();
    }
    scheduler.start().unwrap();
    let epoch = Timestamp::from_micros(START_LEAD_US);

    let mut last = epoch;
    while !last.has_reached(epoch + 300) {
        let (at, outcome) = fire(&mut scheduler);
        assert!(matches!(outcome, Ok(ServiceOutcome::Armed(_))), "{outcome:?}");
        last = at;
    }
    assert_eq!(scheduler.stats().missed_deadlines, 0);
    assert_eq!(scheduler.stats().backlogs, 0);
    assert_eq!(scheduler.alarm().overlapping_arms(), 0);
}

#[test]
fn round_over_transition_budget_escalates_and_recovers() {
    let mut scheduler = DeadlineScheduler::<_, _, 4>::with_config(
        RecordingPins::new(),
        SimAlarm::new(),
        SchedulerConfig::new()
            .with_start_lead_us(START_LEAD_US)
            .with_max_transitions_per_round(2),
    );
    for mask in [0x1, 0x2, 0x4] {
        scheduler
            .schedule(task(PulseParams::new(0, 5, 10, mask)))
            .unwrap();
    }
    scheduler.start().unwrap();
    let epoch = Timestamp::from_micros(START_LEAD_US);
    fire(&mut scheduler);
    assert_eq!(scheduler.pins().level(), 0x7);

    // Three falls are due at epoch + 5 but only two fit in the round.
    let (at, outcome) = fire(&mut scheduler);
    assert_eq!(at, epoch + 5);
    assert_eq!(outcome, Err(ScheduleError::MissedDeadline { late_by_us: 0 }));
    assert_eq!(scheduler.stats().backlogs, 1);
    assert_eq!(scheduler.pins().level().count_ones(), 1);
    assert_eq!(
        scheduler.alarm().armed_deadline(),
        Some(at + scheduler.config().arming_margin_us())
    );

    // The recovery pass writes the leftover fall on its own.
    let writes_before = scheduler.pins().write_count();
    let (recovered_at, _) = fire(&mut scheduler);
    assert_eq!(recovered_at, epoch + 9);
    let leftover = scheduler
        .pins()
        .writes()
        .nth(usize::try_from(writes_before).unwrap())
        .copied()
        .unwrap();
    assert_eq!(leftover.mask.count_ones(), 1);
    assert_eq!(leftover.value, 0);
}

#[test]
fn zero_on_time_holds_pins_inactive() {
    let mut scheduler = scheduler_at(0);
    scheduler
        .schedule(task(PulseParams::new(0, 0, 10, 0x1).with_repeat_count(3)))
        .unwrap();
    scheduler.start().unwrap();

    let mut services = 0;
    loop {
        let (_, outcome) = fire(&mut scheduler);
        assert_eq!(scheduler.pins().level(), 0);
        services += 1;
        if outcome == Ok(ServiceOutcome::Complete) {
            break;
        }
        assert!(services < 10, "train should finish");
    }
    assert!(scheduler.pins().writes().all(|write| write.value == 0));
}

#[test]
fn full_on_time_holds_pins_active_until_the_last_cycle() {
    let mut scheduler = scheduler_at(0);
    scheduler
        .schedule(task(PulseParams::new(0, 10, 10, 0x1).with_repeat_count(3)))
        .unwrap();
    scheduler.start().unwrap();
    let epoch = Timestamp::from_micros(START_LEAD_US);

    loop {
        let (at, outcome) = fire(&mut scheduler);
        if outcome == Ok(ServiceOutcome::Complete) {
            assert_eq!(at, epoch + 30);
            break;
        }
        assert_eq!(scheduler.pins().level(), 0x1, "at {at}");
    }
    assert_eq!(scheduler.pins().level(), 0);
}
