//! Sends more than one buffer's worth of text, so the transmit queue fills up and the writer
//! has to wait for the interrupt handler.

#![no_std]
#![no_main]

use core::fmt::Write;

use testsuite::{entry, exit_success, uart};

#[entry]
fn main() -> ! {
    let mut port = uart::take_uart0();

    port.write_bytes(b"interrupt-driven transmit\r\n");
    for i in 0..3 {
        let _ = write!(port, "line {}: {}\r\n", i, "0123456789abcdef");
    }
    port.flush();

    defmt::info!("tx drained: {}", uart::UART0.tx_state());
    exit_success();
}
