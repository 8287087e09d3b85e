//! A line longer than the caller's buffer is still consumed and echoed in full.

#![no_std]
#![no_main]

use pl011_irq::Error;
use testsuite::{entry, exit_failure, exit_success, uart};

#[entry]
fn main() -> ! {
    let mut port = uart::take_uart0();
    let mut line = [0u8; 8];

    match port.read_line(&mut line) {
        Err(Error::LineTooLong) => port.write_bytes(b"too long: "),
        other => {
            defmt::error!("expected LineTooLong, got {}", other);
            exit_failure();
        }
    }
    // Truncated but still terminated, so this stops at the NUL.
    port.write_bytes(&line);
    let len = port.read_line(&mut line).unwrap_or(0);
    port.write_bytes(b"next: ");
    port.write_bytes(&line[..len]);
    port.flush();

    exit_success();
}
