//! One-shot cross-thread latch with timed wait.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A boolean latch: initially cleared, `set` transitions it to signaled and
/// wakes every waiter, and waits issued after `set` return immediately.
/// There is no reset.
#[derive(Debug, Default)]
pub struct Signal {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self { flag: Mutex::new(false), cond: Condvar::new() }
    }

    /// Transitions the latch to signaled and wakes every current and future
    /// waiter. Idempotent.
    pub fn set(&self) {
        let mut guard = self.flag.lock().expect("signal mutex poisoned");
        *guard = true;
        self.cond.notify_all();
    }

    /// Blocks until `set` has been (or was already) called.
    pub fn wait(&self) {
        let mut guard = self.flag.lock().expect("signal mutex poisoned");
        while !*guard {
            guard = self.cond.wait(guard).expect("signal mutex poisoned");
        }
    }

    /// Blocks until `set` or `duration` elapses, whichever is first.
    /// Returns whether the signal fired within `duration`.
    pub fn wait_for(&self, duration: Duration) -> bool {
        let guard = self.flag.lock().expect("signal mutex poisoned");
        if *guard {
            return true;
        }
        let (guard, timeout_result) =
            self.cond.wait_timeout_while(guard, duration, |signaled| !*signaled).expect("signal mutex poisoned");
        !timeout_result.timed_out() || *guard
    }

    pub fn is_set(&self) -> bool {
        *self.flag.lock().expect("signal mutex poisoned")
    }
}

/// RAII helper that calls [`Signal::set`] when dropped, guaranteeing the
/// latch fires even if the guarded scope returns early or unwinds.
pub struct OnExit<'a> {
    signal: &'a Signal,
}

impl<'a> OnExit<'a> {
    pub fn new(signal: &'a Signal) -> Self {
        Self { signal }
    }
}

impl Drop for OnExit<'_> {
    fn drop(&mut self) {
        self.signal.set();
    }
}
