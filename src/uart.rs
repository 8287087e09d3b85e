//! The port control block and its two halves.
//!
//! [`Uart`] owns the registers, both ring buffers and the transmitter state. It is split by
//! execution context:
//!
//! - The lower half, [`Uart::on_interrupt`], runs in the device's interrupt handler. It is the
//!   RX producer and the TX consumer and never takes a critical section: nothing that touches
//!   the port can preempt it.
//! - The upper half, [`Port`], is the single mainline handle returned by [`Uart::take`]. It is
//!   the RX consumer and the TX producer, and it updates shared counters only inside
//!   `critical_section::with`.

use core::fmt;
use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

#[cfg(feature = "async-await")]
use crate::atomic_waker::AtomicWaker;
#[cfg(feature = "async-await")]
use core::{future::poll_fn, task::Poll};

use crate::regs::{Flags, Interrupts, Registers};
use crate::ring_buffer::RingBuffer;
use crate::{Error, SBUFSIZE};

/// Snapshot of one ring buffer's accounting pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferState {
    /// Bytes buffered and not yet consumed.
    pub data: usize,
    /// Free slots.
    pub room: usize,
}

/// An interrupt-driven UART with `N`-byte receive and transmit buffers.
///
/// Meant to live in a `static` so that both the interrupt handler and mainline code can reach
/// it:
///
/// ```ignore
/// static UART0: Uart<Pl011> = Uart::new(unsafe { Pl011::new(0x4000_c000) });
///
/// #[interrupt]
/// fn UART0() {
///     // SAFETY: This is UART0's interrupt handler.
///     unsafe { UART0.on_interrupt() };
/// }
///
/// let mut port = UART0.take()?;
/// port.write_bytes(b"hello\r\n");
/// ```
pub struct Uart<R, const N: usize = SBUFSIZE> {
    regs: R,
    rx: RingBuffer<N>,
    tx: RingBuffer<N>,
    /// `false`: the transmitter is idle and the next byte goes straight to `UDR`.
    /// `true`: a byte is on the wire and new bytes are queued in `tx`.
    ///
    /// Set only by [`Port::write_byte`], cleared only by [`Uart::transmit_complete`].
    txon: AtomicBool,
    taken: AtomicBool,
    /// Bytes dropped because `rx` was full. Written from interrupt context only.
    overruns: AtomicU32,
    #[cfg(feature = "async-await")]
    rx_waker: AtomicWaker,
    #[cfg(feature = "async-await")]
    tx_waker: AtomicWaker,
}

impl<R: Registers, const N: usize> Uart<R, N> {
    /// Creates the control block for the UART behind `regs`.
    ///
    /// No register is touched until [`Uart::take`].
    pub const fn new(regs: R) -> Self {
        Uart {
            regs,
            rx: RingBuffer::new(),
            tx: RingBuffer::new(),
            txon: AtomicBool::new(false),
            taken: AtomicBool::new(false),
            overruns: AtomicU32::new(0),
            #[cfg(feature = "async-await")]
            rx_waker: AtomicWaker::new(),
            #[cfg(feature = "async-await")]
            tx_waker: AtomicWaker::new(),
        }
    }

    /// Hands out the mainline handle and enables the receive interrupt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyTaken`] on every call but the first.
    pub fn take(&self) -> Result<Port<'_, R, N>, Error> {
        let first = critical_section::with(|_| {
            let taken = self.taken.load(Ordering::Relaxed);
            self.taken.store(true, Ordering::Relaxed);
            !taken
        });
        if !first {
            return Err(Error::AlreadyTaken);
        }

        self.regs.set_interrupt_mask(Interrupts::RX);
        debug!("uart: port taken, {=usize} byte buffers", N);
        Ok(Port { uart: self })
    }

    /// Returns `true` while a byte is in flight or queued for transmission.
    #[inline]
    pub fn is_transmitting(&self) -> bool {
        self.txon.load(Ordering::Acquire)
    }

    /// Consistent snapshot of the receive buffer counters.
    pub fn rx_state(&self) -> BufferState {
        critical_section::with(|_| state_of(&self.rx))
    }

    /// Consistent snapshot of the transmit buffer counters.
    pub fn tx_state(&self) -> BufferState {
        critical_section::with(|_| state_of(&self.tx))
    }

    /// Number of received bytes dropped because the receive buffer was full.
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Services the UART interrupt.
    ///
    /// Reads `MIS` once. Receive is handled before transmit when both are asserted; the other
    /// source stays asserted and fires again on return.
    ///
    /// # Panics
    ///
    /// If neither receive nor transmit is asserted. This means the interrupt routing or the
    /// hardware broke its contract with the driver, and there is no way to recover.
    ///
    /// # Safety
    ///
    /// Must only be called from this device's interrupt handler, which must not be reentered
    /// while it runs. Calling it from mainline code races with the interrupt handler as a
    /// second RX producer and TX consumer.
    pub unsafe fn on_interrupt(&self) {
        let status = self.regs.masked_status();
        if status.contains(Interrupts::RX) {
            self.receive();
        } else if status.contains(Interrupts::TX) {
            self.transmit_complete();
        } else {
            error!("uart: unexpected interrupt status {=u32:#x}", status.bits());
            panic!("unexpected UART interrupt status: {:#x}", status.bits());
        }
    }

    /// Moves one byte from `UDR` into the receive buffer.
    fn receive(&self) {
        // Reading UDR also acknowledges the interrupt, so it happens even if the byte is dropped.
        let byte = self.regs.read_data();
        if self.rx.is_full() {
            let overruns = self.overruns.load(Ordering::Relaxed).wrapping_add(1);
            self.overruns.store(overruns, Ordering::Relaxed);
            warn!("uart: receive buffer full, dropped {=u8:#x}", byte);
            return;
        }
        self.rx.stage(byte);
        self.rx.commit_push();

        #[cfg(feature = "async-await")]
        self.rx_waker.wake();
    }

    /// Feeds the next queued byte to `UDR`, or returns the transmitter to idle.
    fn transmit_complete(&self) {
        match self.tx.peek() {
            None => {
                // Masking TX is what clears the condition when there is nothing left to send.
                self.regs.set_interrupt_mask(Interrupts::RX);
                self.txon.store(false, Ordering::Release);
                trace!("uart: transmitter idle");

                #[cfg(feature = "async-await")]
                self.tx_waker.wake();
            }
            Some(byte) => {
                // The previous byte has fully left, so UDR is free. The write clears TX.
                self.regs.write_data(byte);
                self.tx.commit_pop();
            }
        }
    }
}

fn state_of<const N: usize>(buf: &RingBuffer<N>) -> BufferState {
    BufferState {
        data: buf.len(),
        room: buf.room(),
    }
}

/// Outcome of trying to queue a byte behind an in-flight transmission.
enum Queue {
    Queued,
    Full,
    Idle,
}

/// Mainline handle to a [`Uart`].
///
/// There is at most one per [`Uart`], which makes it the only RX consumer and TX producer.
pub struct Port<'a, R, const N: usize = SBUFSIZE> {
    uart: &'a Uart<R, N>,
}

impl<R: Registers, const N: usize> Port<'_, R, N> {
    /// Returns the oldest received byte, busy-waiting until one arrives.
    ///
    /// Interrupts must be enabled, or this never returns.
    pub fn read_byte(&mut self) -> u8 {
        loop {
            if let Some(byte) = self.try_read_byte() {
                return byte;
            }
            spin_loop();
        }
    }

    /// Returns the oldest received byte, if any.
    pub fn try_read_byte(&mut self) -> Option<u8> {
        let byte = self.peek_rx()?;
        self.consume_rx();
        Some(byte)
    }

    #[inline]
    fn peek_rx(&self) -> Option<u8> {
        // The slot at `tail` is ours until `consume_rx`, so it can be read outside the
        // critical section.
        self.uart.rx.peek()
    }

    #[inline]
    fn consume_rx(&self) {
        critical_section::with(|_| self.uart.rx.commit_pop());
    }

    /// Sends `byte`.
    ///
    /// When the transmitter is idle the byte is written to `UDR` right away (after waiting for
    /// the holding location to drain) and the transmit interrupt is enabled. Otherwise it is
    /// queued and sent by the interrupt handler; if the queue is full this busy-waits for room.
    pub fn write_byte(&mut self, byte: u8) {
        let uart = self.uart;
        loop {
            // Checking `txon` and queueing in one critical section keeps `transmit_complete` from
            // going idle in between and stranding the byte.
            let queued = critical_section::with(|_| {
                if !uart.txon.load(Ordering::Relaxed) {
                    return Queue::Idle;
                }
                if uart.tx.is_full() {
                    return Queue::Full;
                }
                uart.tx.stage(byte);
                uart.tx.commit_push();
                Queue::Queued
            });
            match queued {
                Queue::Queued => return,
                Queue::Full => spin_loop(),
                Queue::Idle => break,
            }
        }

        while uart.regs.flags().contains(Flags::TXFF) {
            spin_loop();
        }

        // `txon` must be set before TX is enabled: the interrupt may fire right away and has to
        // find a busy transmitter.
        uart.txon.store(true, Ordering::Release);
        trace!("uart: transmitter busy");
        let mask = uart.regs.interrupt_mask();
        uart.regs.set_interrupt_mask(mask | Interrupts::RX | Interrupts::TX);
        uart.regs.write_data(byte);
    }

    /// Sends `bytes` up to the first NUL, if any.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes.iter().take_while(|&&b| b != 0) {
            self.write_byte(byte);
        }
    }

    /// Reads one line, echoing it back as it is typed.
    ///
    /// Bytes are read until a carriage return. Every byte before it is echoed; the carriage
    /// return itself is replaced by `"\n\r"` in both the echo and `buf`, which is then NUL
    /// terminated. Returns the line length including the `"\n\r"`, excluding the NUL.
    ///
    /// # Errors
    ///
    /// [`Error::LineTooLong`] if `buf` cannot hold the line, `"\n\r"` and the NUL. The line is
    /// still consumed and echoed completely; `buf` then holds as much of it as fits, terminated
    /// the same way when `buf` has at least three bytes.
    pub fn read_line(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let max = buf.len().saturating_sub(3);
        let mut len = 0;
        let mut truncated = false;

        loop {
            let byte = self.read_byte();
            if byte == b'\r' {
                break;
            }
            self.write_byte(byte);
            if len < max {
                buf[len] = byte;
                len += 1;
            } else {
                truncated = true;
            }
        }

        self.write_byte(b'\n');
        self.write_byte(b'\r');

        if buf.len() < 3 {
            return Err(Error::LineTooLong);
        }
        buf[len] = b'\n';
        buf[len + 1] = b'\r';
        buf[len + 2] = 0;

        if truncated {
            Err(Error::LineTooLong)
        } else {
            Ok(len + 2)
        }
    }

    /// Busy-waits until every queued byte has been sent and the transmitter is idle.
    pub fn flush(&mut self) {
        while self.uart.is_transmitting() {
            spin_loop();
        }
    }

    /// Returns `true` while a byte is in flight or queued for transmission.
    #[inline]
    pub fn is_transmitting(&self) -> bool {
        self.uart.is_transmitting()
    }

    /// Waits until there is received data.
    #[cfg(feature = "async-await")]
    pub async fn wait_for_data(&mut self) {
        let uart = self.uart;
        poll_fn(|cx| {
            // Register first, so a byte arriving right after the check still wakes us.
            uart.rx_waker.register(cx.waker());
            if uart.rx.is_empty() {
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        })
        .await
    }

    /// Returns the oldest received byte, waiting for one without spinning.
    #[cfg(feature = "async-await")]
    pub async fn read_byte_async(&mut self) -> u8 {
        loop {
            self.wait_for_data().await;
            if let Some(byte) = self.try_read_byte() {
                return byte;
            }
        }
    }

    /// Waits until the transmitter is idle.
    #[cfg(feature = "async-await")]
    pub async fn flush_async(&mut self) {
        let uart = self.uart;
        poll_fn(|cx| {
            uart.tx_waker.register(cx.waker());
            if uart.is_transmitting() {
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        })
        .await
    }
}

impl<R: Registers, const N: usize> fmt::Write for Port<'_, R, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &byte in s.as_bytes() {
            self.write_byte(byte);
        }
        Ok(())
    }
}
