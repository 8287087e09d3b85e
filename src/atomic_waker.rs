//! Waker slot shared between a port's upper half and its interrupt handler.
//!
//! Each direction of a port has a single waiting future at most (the [`crate::Port`] handle is
//! unique and its async methods take `&mut self`), so one slot per direction is enough.

use core::{cell::UnsafeCell, task::Waker};

/// A single registered waker, guarded by critical sections.
pub(crate) struct AtomicWaker {
    waker: UnsafeCell<Option<Waker>>,
}

// SAFETY: The `UnsafeCell` is only accessed inside critical sections.
unsafe impl Send for AtomicWaker {}
// SAFETY: The `UnsafeCell` is only accessed inside critical sections.
unsafe impl Sync for AtomicWaker {}

impl AtomicWaker {
    pub(crate) const fn new() -> Self {
        Self {
            waker: UnsafeCell::new(None),
        }
    }

    /// Registers `new_waker`, replacing any previous one unless it would wake the same task.
    pub(crate) fn register(&self, new_waker: &Waker) {
        critical_section::with(|_| {
            // SAFETY: Inside a critical section, and `self.waker` is not borrowed anywhere else.
            let slot = unsafe { &mut *self.waker.get() };
            match slot {
                Some(w) if w.will_wake(new_waker) => {}
                _ => *slot = Some(new_waker.clone()),
            }
        });
    }

    /// Wakes and clears the registered waker, if any.
    ///
    /// Callable from interrupt context.
    pub(crate) fn wake(&self) {
        // SAFETY: Inside a critical section, and `self.waker` is not borrowed anywhere else.
        // The waker is taken out before waking so `wake` runs outside the critical section.
        if let Some(w) = critical_section::with(|_| unsafe { &mut *self.waker.get() }.take()) {
            w.wake();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Wake;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn wake_once_per_registration() {
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        let slot = AtomicWaker::new();

        slot.wake();
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);

        slot.register(&waker);
        slot.register(&waker);
        slot.wake();
        slot.wake();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
