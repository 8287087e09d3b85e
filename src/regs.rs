//! PL011 register contract.
//!
//! Only the four registers the interrupt-driven data path needs are modelled:
//!
//! | Offset | Name | Use                                                            |
//! |--------|------|----------------------------------------------------------------|
//! | 0x000  | UDR  | Write transmits a byte and clears TX-complete; read receives   |
//! | 0x018  | UFR  | `TXFF` set while the transmit holding location is full          |
//! | 0x038  | IMSC | Enables interrupt sources                                      |
//! | 0x040  | MIS  | Asserted *and* enabled interrupt sources                       |
//!
//! Line configuration (baud rate, framing, enabling the UART) happens before the port is handed
//! to [`crate::Uart`] and is out of scope here.

use core::ptr::{with_exposed_provenance, with_exposed_provenance_mut};

const UDR_OFFSET: usize = 0x000;
const UFR_OFFSET: usize = 0x018;
const IMSC_OFFSET: usize = 0x038;
const MIS_OFFSET: usize = 0x040;

bitflags::bitflags! {
    /// Interrupt sources, as laid out in `IMSC` and `MIS`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Interrupts: u32 {
        /// Receive data available.
        const RX = 1 << 4;
        /// Transmit complete (holding location empty).
        const TX = 1 << 5;
    }
}

bitflags::bitflags! {
    /// Bits of the flag register `UFR`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u32 {
        /// UART busy.
        const BUSY = 1 << 3;
        /// Receive holding location empty.
        const RXFE = 1 << 4;
        /// Transmit holding location full.
        const TXFF = 1 << 5;
    }
}

/// Access to a UART register block.
///
/// Every method is a single register access; the driver never assumes a read-modify-write is
/// atomic with respect to its own interrupt handler.
pub trait Registers {
    /// Reads one received byte from `UDR`.
    fn read_data(&self) -> u8;

    /// Writes `byte` to `UDR`, starting its transmission.
    fn write_data(&self, byte: u8);

    /// Reads `UFR`.
    fn flags(&self) -> Flags;

    /// Reads `IMSC`.
    fn interrupt_mask(&self) -> Interrupts;

    /// Writes `IMSC`. Sources not in `mask` are disabled.
    fn set_interrupt_mask(&self, mask: Interrupts);

    /// Reads `MIS`. Unknown bits are retained so the dispatcher can report them.
    fn masked_status(&self) -> Interrupts;
}

/// Memory-mapped PL011 register block.
#[derive(Debug)]
pub struct Pl011 {
    base: usize,
}

impl Pl011 {
    /// Wraps the register block at `base`.
    ///
    /// # Safety
    ///
    /// - `base` must be the address of a mapped PL011 (or register compatible) UART.
    /// - The returned value takes exclusive ownership of the block: nothing else may access
    ///   these registers while it is alive.
    pub const unsafe fn new(base: usize) -> Self {
        Pl011 { base }
    }

    /// Base address of the register block.
    pub const fn base(&self) -> usize {
        self.base
    }

    #[inline]
    fn read(&self, offset: usize) -> u32 {
        let reg = with_exposed_provenance::<u32>(self.base + offset);
        // SAFETY: `new`'s contract makes `base + offset` a valid, aligned device register that
        // we own exclusively.
        unsafe { reg.read_volatile() }
    }

    #[inline]
    fn write(&self, offset: usize, value: u32) {
        let reg = with_exposed_provenance_mut::<u32>(self.base + offset);
        // SAFETY: `new`'s contract makes `base + offset` a valid, aligned device register that
        // we own exclusively.
        unsafe { reg.write_volatile(value) }
    }
}

impl Registers for Pl011 {
    #[inline]
    fn read_data(&self) -> u8 {
        // Bits 8..12 carry receive error flags, the byte is in the low 8 bits.
        self.read(UDR_OFFSET) as u8
    }

    #[inline]
    fn write_data(&self, byte: u8) {
        self.write(UDR_OFFSET, byte as u32);
    }

    #[inline]
    fn flags(&self) -> Flags {
        Flags::from_bits_retain(self.read(UFR_OFFSET))
    }

    #[inline]
    fn interrupt_mask(&self) -> Interrupts {
        Interrupts::from_bits_retain(self.read(IMSC_OFFSET))
    }

    #[inline]
    fn set_interrupt_mask(&self, mask: Interrupts) {
        self.write(IMSC_OFFSET, mask.bits());
    }

    #[inline]
    fn masked_status(&self) -> Interrupts {
        Interrupts::from_bits_retain(self.read(MIS_OFFSET))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Fake register block backed by ordinary memory.
    #[repr(C, align(4))]
    struct Block([u32; 0x44 / 4]);

    #[test]
    fn register_offsets() {
        let mut block = Block([0; 0x44 / 4]);
        block.0[MIS_OFFSET / 4] = (Interrupts::RX | Interrupts::TX).bits();
        block.0[UFR_OFFSET / 4] = Flags::TXFF.bits();
        block.0[UDR_OFFSET / 4] = 0x0141; // overrun error bit plus 'A'
        let base = block.0.as_mut_ptr().expose_provenance();

        // SAFETY: `block` outlives `regs` and is not touched directly while `regs` is in use.
        let regs = unsafe { Pl011::new(base) };
        assert_eq!(regs.masked_status(), Interrupts::RX | Interrupts::TX);
        assert!(regs.flags().contains(Flags::TXFF));
        assert_eq!(regs.read_data(), b'A');

        regs.set_interrupt_mask(Interrupts::RX);
        assert_eq!(regs.interrupt_mask(), Interrupts::RX);
        regs.write_data(b'z');

        assert_eq!(block.0[IMSC_OFFSET / 4], Interrupts::RX.bits());
        assert_eq!(block.0[UDR_OFFSET / 4], b'z' as u32);
    }

    #[test]
    fn unknown_status_bits_are_kept() {
        let status = Interrupts::from_bits_retain(1 << 6);
        assert!(!status.intersects(Interrupts::RX | Interrupts::TX));
        assert_eq!(status.bits(), 1 << 6);
    }
}
