//! Host-side PL011 model for tests.
//!
//! Level semantics follow the PL011 with its FIFOs disabled:
//! - RX is asserted while there is unread input.
//! - TX is asserted once the byte on the wire has left (see
//!   [`MockRegisters::finish_transmission`]) and stays asserted until the next `UDR` write.
//! - `MIS` is the raw status masked by `IMSC`.

use core::cell::RefCell;
use std::collections::VecDeque;

use critical_section::Mutex;

use crate::regs::{Flags, Interrupts, Registers};

#[derive(Default)]
struct State {
    input: VecDeque<u8>,
    written: Vec<u8>,
    imsc: u32,
    tx_raw: bool,
    in_flight: bool,
    busy_polls: usize,
    flag_reads: usize,
    forced_status: Option<u32>,
}

pub(crate) struct MockRegisters {
    state: Mutex<RefCell<State>>,
}

impl MockRegisters {
    pub(crate) fn new() -> Self {
        MockRegisters {
            state: Mutex::new(RefCell::new(State::default())),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs)))
    }

    /// Makes `byte` arrive on the receive line.
    pub(crate) fn receive(&self, byte: u8) {
        self.with(|s| s.input.push_back(byte));
    }

    /// The byte written last has left the transmitter.
    pub(crate) fn finish_transmission(&self) {
        self.with(|s| {
            s.in_flight = false;
            s.tx_raw = true;
        });
    }

    /// Report `TXFF` for the next `polls` flag register reads.
    pub(crate) fn hold_busy_for(&self, polls: usize) {
        self.with(|s| s.busy_polls = polls);
    }

    /// Make `MIS` read back `bits`, regardless of the modelled state.
    pub(crate) fn force_status(&self, bits: u32) {
        self.with(|s| s.forced_status = Some(bits));
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.with(|s| s.written.clone())
    }

    pub(crate) fn unread_input(&self) -> usize {
        self.with(|s| s.input.len())
    }

    pub(crate) fn in_flight(&self) -> bool {
        self.with(|s| s.in_flight)
    }

    pub(crate) fn flag_reads(&self) -> usize {
        self.with(|s| s.flag_reads)
    }

    /// Whether the interrupt line is currently asserted.
    pub(crate) fn pending(&self) -> bool {
        !self.masked_status().is_empty()
    }
}

impl Registers for &MockRegisters {
    fn read_data(&self) -> u8 {
        self.with(|s| s.input.pop_front().unwrap_or(0))
    }

    fn write_data(&self, byte: u8) {
        self.with(|s| {
            s.written.push(byte);
            s.tx_raw = false;
            s.in_flight = true;
        });
    }

    fn flags(&self) -> Flags {
        self.with(|s| {
            s.flag_reads += 1;
            if s.busy_polls > 0 {
                s.busy_polls -= 1;
                Flags::TXFF
            } else {
                Flags::empty()
            }
        })
    }

    fn interrupt_mask(&self) -> Interrupts {
        self.with(|s| Interrupts::from_bits_retain(s.imsc))
    }

    fn set_interrupt_mask(&self, mask: Interrupts) {
        self.with(|s| s.imsc = mask.bits());
    }

    fn masked_status(&self) -> Interrupts {
        self.with(|s| {
            if let Some(bits) = s.forced_status {
                return Interrupts::from_bits_retain(bits);
            }
            let mut raw = Interrupts::empty();
            if !s.input.is_empty() {
                raw |= Interrupts::RX;
            }
            if s.tx_raw {
                raw |= Interrupts::TX;
            }
            raw & Interrupts::from_bits_retain(s.imsc)
        })
    }
}
