//! Reads two lines with local echo and prints each back.

#![no_std]
#![no_main]

use testsuite::{entry, exit_success, uart};

#[entry]
fn main() -> ! {
    let mut port = uart::take_uart0();
    let mut line = [0u8; 32];

    for _ in 0..2 {
        port.write_bytes(b"> ");
        let len = match port.read_line(&mut line) {
            Ok(len) => len,
            Err(e) => panic!("{}", e),
        };
        defmt::info!("read {} bytes", len);
        port.write_bytes(b"got: ");
        port.write_bytes(&line[..len]);
    }
    port.flush();

    defmt::info!("overruns: {}", uart::UART0.overruns());
    exit_success();
}
