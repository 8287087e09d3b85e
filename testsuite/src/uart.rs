//! UART0 of the LM3S6965 (a PL011 derivative) wired up to the driver.
//!
//! QEMU maps the first `-serial`/`-chardev` to UART0.

use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::NVIC;
use cortex_m_rt::exception;
use pl011_irq::{Pl011, Port, Uart};

const UART0_BASE: usize = 0x4000_C000;

/// Kept small so the examples wrap around and fill the transmit queue.
pub const BUF_SIZE: usize = 16;

// SAFETY: UART0's register block, used by nothing else in the testsuite.
pub static UART0: Uart<Pl011, BUF_SIZE> = Uart::new(unsafe { Pl011::new(UART0_BASE) });

#[derive(Clone, Copy)]
#[repr(u16)]
enum Irq {
    Uart0 = 5,
}

// SAFETY: 5 is UART0's position in the LM3S6965 vector table.
unsafe impl InterruptNumber for Irq {
    fn number(self) -> u16 {
        self as u16
    }
}

/// Takes the UART0 port and unmasks its interrupt.
pub fn take_uart0() -> Port<'static, Pl011, BUF_SIZE> {
    let port = match UART0.take() {
        Ok(port) => port,
        Err(e) => panic!("{}", e),
    };
    // SAFETY: The handler below is ready, and nothing here relies on masking for safety.
    unsafe { NVIC::unmask(Irq::Uart0) };
    port
}

// Without a device crate every IRQ lands here.
#[exception]
unsafe fn DefaultHandler(irqn: i16) {
    if irqn == Irq::Uart0 as i16 {
        // SAFETY: This is UART0's interrupt handler, and the NVIC does not reenter it.
        unsafe { UART0.on_interrupt() };
    } else {
        panic!("unhandled interrupt {}", irqn);
    }
}
