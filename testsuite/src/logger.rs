//! `defmt` global logger writing frames to semihosting stdout.
//!
//! The xtask runner decodes these frames with the example's ELF.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering, compiler_fence};
use cortex_m_semihosting::hio::{self, HostStream};
use critical_section::RestoreState;
use defmt::Encoder;

#[defmt::global_logger]
struct Logger;

struct LoggerState {
    cs_state: UnsafeCell<RestoreState>,
    encoder: UnsafeCell<Encoder>,
    stdout: UnsafeCell<Option<HostStream>>,
    /// 0 = idle, 1 = logging, 2+ = reentrant call (from a fault or a panic while logging),
    /// which is dropped.
    depth: AtomicUsize,
}

// SAFETY: Everything but `depth` is only touched between `acquire` and `release`, inside a
// critical section.
unsafe impl Sync for LoggerState {}

static STATE: LoggerState = LoggerState {
    cs_state: UnsafeCell::new(RestoreState::invalid()),
    encoder: UnsafeCell::new(Encoder::new()),
    stdout: UnsafeCell::new(None),
    depth: AtomicUsize::new(0),
};

/// # Safety
///
/// Must be called from within the logger's critical section.
unsafe fn write_stdout(bytes: &[u8]) {
    // SAFETY: The caller guarantees exclusive access.
    let stdout = unsafe { &mut *STATE.stdout.get() };

    // Opened once; reopening would truncate the output.
    if stdout.is_none() {
        *stdout = hio::hstdout().ok();
    }
    if let Some(stdout) = stdout {
        let _ = stdout.write_all(bytes);
    }
}

// SAFETY: `acquire` enters a critical section that `release` leaves, and all state except
// `depth` is only used in between. Reentrant calls never touch that state.
unsafe impl defmt::Logger for Logger {
    fn acquire() {
        if STATE.depth.fetch_add(1, Ordering::Acquire) > 0 {
            return;
        }

        // SAFETY: Balanced by the `release` in `Logger::release`.
        let restore = unsafe { critical_section::acquire() };
        compiler_fence(Ordering::SeqCst);

        // SAFETY: We are in the critical section.
        unsafe {
            STATE.cs_state.get().write(restore);
            (*STATE.encoder.get()).start_frame(|b| write_stdout(b));
        }
    }

    unsafe fn flush() {}

    unsafe fn release() {
        if STATE.depth.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }

        // SAFETY: Still in the critical section from `acquire`.
        unsafe {
            (*STATE.encoder.get()).end_frame(|b| write_stdout(b));
            compiler_fence(Ordering::SeqCst);
            critical_section::release(STATE.cs_state.get().read());
        }
    }

    unsafe fn write(bytes: &[u8]) {
        if STATE.depth.load(Ordering::Relaxed) != 1 {
            return;
        }

        // SAFETY: defmt calls this between `acquire` and `release`.
        unsafe { (*STATE.encoder.get()).write(bytes, |b| write_stdout(b)) };
    }
}
