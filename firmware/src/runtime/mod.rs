use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::UART0;
use embassy_rp::uart::{BufferedInterruptHandler, BufferedUart, Config as UartConfig};
use embassy_sync::channel::Channel;
use static_cell::StaticCell;

use crate::channels::{
    ControlInbox, ControlQueue, ErrorOutbox, ErrorQueue, SpecInbox, SpecQueue,
};
use crate::config::{HOST_BAUD, HOST_UART_BUFFER};
use crate::hw::{self, SioPins, SioPort};
use crate::link::TimingLink;
use crate::status;

mod protocol_task;
mod timing_task;

pub(super) static SPEC_QUEUE: SpecQueue = Channel::new();
pub(super) static CONTROL_QUEUE: ControlQueue = Channel::new();
pub(super) static ERROR_QUEUE: ErrorQueue = Channel::new();

static UART_TX_BUFFER: StaticCell<[u8; HOST_UART_BUFFER]> = StaticCell::new();
static UART_RX_BUFFER: StaticCell<[u8; HOST_UART_BUFFER]> = StaticCell::new();

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

#[embassy_executor::main]
pub async fn main(_spawner: Spawner) {
    let p = embassy_rp::init(embassy_rp::config::Config::default());

    // Port pins GPIO8..15, direction pins GPIO16..23.
    let port = SioPins::new([
        hw::output(p.PIN_8),
        hw::output(p.PIN_9),
        hw::output(p.PIN_10),
        hw::output(p.PIN_11),
        hw::output(p.PIN_12),
        hw::output(p.PIN_13),
        hw::output(p.PIN_14),
        hw::output(p.PIN_15),
    ]);
    let port_io = SioPort::new([
        hw::output(p.PIN_16),
        hw::output(p.PIN_17),
        hw::output(p.PIN_18),
        hw::output(p.PIN_19),
        hw::output(p.PIN_20),
        hw::output(p.PIN_21),
        hw::output(p.PIN_22),
        hw::output(p.PIN_23),
    ]);
    let led = Output::new(p.PIN_25, Level::Low);

    timing_task::spawn(
        p.CORE1,
        port,
        timing_task::TimingChannels {
            specs: SpecInbox::new(&SPEC_QUEUE),
            controls: ControlInbox::new(&CONTROL_QUEUE),
            errors: ErrorOutbox::new(&ERROR_QUEUE),
        },
    );

    let link = TimingLink::new(
        SPEC_QUEUE.sender(),
        CONTROL_QUEUE.sender(),
        ERROR_QUEUE.receiver(),
        &status::ERROR_STATE,
        port_io,
    );

    let mut uart_config = UartConfig::default();
    uart_config.baudrate = HOST_BAUD;
    let uart = BufferedUart::new(
        p.UART0,
        p.PIN_0,
        p.PIN_1,
        Irqs,
        &mut UART_TX_BUFFER.init([0; HOST_UART_BUFFER])[..],
        &mut UART_RX_BUFFER.init([0; HOST_UART_BUFFER])[..],
        uart_config,
    );
    let (tx, rx) = uart.split();

    defmt::info!("pulse expander ready");
    protocol_task::run(link, led, rx, tx).await
}
