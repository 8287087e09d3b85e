//! Upper-cases input until a carriage return, waiting on the receive interrupt instead of
//! spinning on the buffer.

#![no_std]
#![no_main]

use testsuite::{block_on, entry, exit_success, uart};

#[entry]
fn main() -> ! {
    let mut port = uart::take_uart0();

    block_on(async {
        loop {
            let byte = port.read_byte_async().await;
            if byte == b'\r' {
                break;
            }
            port.write_byte(byte.to_ascii_uppercase());
        }
        port.write_bytes(b"\r\n");
        port.flush_async().await;
    });

    defmt::info!("rx state: {}", uart::UART0.rx_state());
    exit_success();
}
