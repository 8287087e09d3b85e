#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

// Must come first so the logging macros are visible to the modules below.
#[macro_use]
mod fmt;

#[cfg(feature = "async-await")]
pub(crate) mod atomic_waker;
#[cfg(test)]
mod mock;
pub mod regs;
mod ring_buffer;
mod uart;

pub use regs::{Flags, Interrupts, Pl011, Registers};
pub use ring_buffer::RingBuffer;
pub use uart::{BufferState, Port, Uart};

/// Default capacity, in bytes, of each of a port's two ring buffers.
pub const SBUFSIZE: usize = 128;

/// Errors reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// [`Uart::take`] has already handed out the port.
    AlreadyTaken,
    /// The buffer passed to [`Port::read_line`] is too small for the line, its `"\n\r"` and the
    /// NUL terminator.
    LineTooLong,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::AlreadyTaken => f.write_str("UART port already taken"),
            Error::LineTooLong => f.write_str("line does not fit in the buffer"),
        }
    }
}

impl core::error::Error for Error {}
