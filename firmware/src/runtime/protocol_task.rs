//! Core 0: serves the register protocol and watches the port and the timing
//! core.

use embassy_futures::select::{Either, select};
use embassy_rp::gpio::Output;
use embassy_time::{Duration, Ticker};
use embedded_io_async::{Read, Write};
use pulse_core::runner::RunnerState;

use crate::config::{HOST_READ_CHUNK, PORT_POLL_INTERVAL_US};
use crate::link::TimingLink;
use crate::port::PortIo;
use crate::registers::{self, FrameDecoder, REG_ERROR_STATE, REG_PORT_STATE, Reply};
use crate::status;

/// Heartbeat period expressed in poll ticks.
const HEARTBEAT_TICKS: u32 = 5_000;

/// Runs forever, alternating between host requests and port polling.
pub async fn run<D, R, W>(
    mut link: TimingLink<'static, D>,
    mut led: Output<'static>,
    mut rx: R,
    mut tx: W,
) -> !
where
    D: PortIo,
    R: Read,
    W: Write,
{
    let mut ticker = Ticker::every(Duration::from_micros(PORT_POLL_INTERVAL_US));
    let mut decoder = FrameDecoder::new();
    let mut chunk = [0u8; HOST_READ_CHUNK];
    let mut last_state = RunnerState::AwaitingTasks;
    let mut ticks: u32 = 0;

    loop {
        match select(rx.read(&mut chunk), ticker.next()).await {
            Either::First(Ok(count)) => {
                for &byte in &chunk[..count] {
                    match decoder.push(byte) {
                        Some(Ok(request)) => {
                            let reply = registers::dispatch(&mut link, &request);
                            send(&mut tx, &reply).await;
                        }
                        Some(Err(err)) => {
                            defmt::warn!("host: {}", defmt::Display2Format(&err));
                        }
                        None => {}
                    }
                }
                flush(&mut tx).await;
            }
            Either::First(Err(_)) => defmt::warn!("host: UART read error"),
            Either::Second(()) => {
                let mut notified = false;
                match link.poll_port() {
                    Ok(sample) => {
                        if sample.triggered {
                            defmt::info!("external trigger on {=u8:#04x}", sample.levels);
                        }
                        if sample.changed_inputs != 0 {
                            send(&mut tx, &Reply::event(REG_PORT_STATE, sample.levels)).await;
                            notified = true;
                        }
                    }
                    Err(err) => {
                        defmt::warn!("trigger dropped: {}", defmt::Display2Format(&err));
                    }
                }

                if link.poll_errors() {
                    defmt::warn!(
                        "timing error-state {=u8:#04x} (dropped {=u32})",
                        link.error_state(),
                        status::dropped_errors()
                    );
                    send(&mut tx, &Reply::event(REG_ERROR_STATE, link.error_state())).await;
                    notified = true;
                }
                if notified {
                    flush(&mut tx).await;
                }

                let state = status::runner_state();
                if state != last_state {
                    defmt::info!(
                        "timing core {} reserved={=u32:#06x}",
                        defmt::Display2Format(&state),
                        status::reserved_pins()
                    );
                    last_state = state;
                }

                ticks = ticks.wrapping_add(1);
                if ticks % HEARTBEAT_TICKS == 0 {
                    led.toggle();
                }
            }
        }
    }
}

async fn send<W: Write>(tx: &mut W, reply: &Reply) {
    if tx.write_all(&reply.encode()).await.is_err() {
        defmt::warn!("host: reply write failed");
    }
}

async fn flush<W: Write>(tx: &mut W) {
    if tx.flush().await.is_err() {
        defmt::warn!("host: flush failed");
    }
}
