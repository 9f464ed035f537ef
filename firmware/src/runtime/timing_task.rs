//! Core 1: the timing core.
//!
//! Core 1 runs no executor. It polls the run loop and takes the TIMER alarm
//! interrupt; both paths reach the run loop with interrupts masked on core 1
//! only, so a poll and an alarm service never interleave and core 0 never
//! waits on the timing core. Telemetry is emitted after the section ends.

use core::cell::RefCell;

use cortex_m::interrupt::{self as cpu, Mutex};
use embassy_rp::Peri;
use embassy_rp::interrupt;
use embassy_rp::interrupt::InterruptExt;
use embassy_rp::multicore::{Stack, spawn_core1};
use embassy_rp::peripherals::CORE1;
use pulse_core::runner::TimingCore;

use crate::channels::{ControlInbox, ErrorOutbox, SpecInbox};
use crate::config::{self, CORE1_POLL_GAP_CYCLES, CORE1_STACK_SIZE, MAX_TASKS};
use crate::hw::{SioPins, TimerAlarm};
use crate::status;
use crate::telemetry::{self, TelemetryMirror};

type FirmwareCore = TimingCore<
    SioPins,
    TimerAlarm,
    SpecInbox<'static>,
    ControlInbox<'static>,
    ErrorOutbox<'static>,
    MAX_TASKS,
>;

static mut CORE1_STACK: Stack<CORE1_STACK_SIZE> = Stack::new();

// Only ever touched from core 1.
static TIMING_CORE: Mutex<RefCell<Option<FirmwareCore>>> = Mutex::new(RefCell::new(None));

/// Channel ends handed to the timing core.
pub struct TimingChannels {
    pub specs: SpecInbox<'static>,
    pub controls: ControlInbox<'static>,
    pub errors: ErrorOutbox<'static>,
}

/// Starts core 1 with exclusive ownership of the port pins.
#[allow(static_mut_refs)]
pub fn spawn(core1: Peri<'static, CORE1>, pins: SioPins, channels: TimingChannels) {
    spawn_core1(core1, unsafe { &mut CORE1_STACK }, move || {
        let core = TimingCore::new(
            pins,
            TimerAlarm::new(),
            channels.specs,
            channels.controls,
            channels.errors,
            config::timing_config(),
        );
        cpu::free(|cs| *TIMING_CORE.borrow(cs).borrow_mut() = Some(core));

        // NVIC lines are per core; enabling here routes the alarm to core 1.
        interrupt::TIMER_IRQ_1.unpend();
        unsafe { interrupt::TIMER_IRQ_1.enable() };

        defmt::info!("timing core online");
        run()
    });
}

fn run() -> ! {
    let mut mirror = TelemetryMirror::new();
    loop {
        let records = cpu::free(|cs| {
            let mut cell = TIMING_CORE.borrow(cs).borrow_mut();
            let core = cell.as_mut()?;
            let state = core.poll();
            status::record_runner(state, core.dropped_errors());
            Some(mirror.collect(core.events()))
        });
        if let Some(records) = records {
            telemetry::emit_all(&records);
        }
        cortex_m::asm::delay(CORE1_POLL_GAP_CYCLES);
    }
}

#[interrupt]
fn TIMER_IRQ_1() {
    TimerAlarm::acknowledge();
    cpu::free(|cs| {
        if let Some(core) = TIMING_CORE.borrow(cs).borrow_mut().as_mut() {
            core.on_alarm();
        }
    });
}
