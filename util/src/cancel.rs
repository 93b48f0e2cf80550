//! Cooperative cancellation for long running control routines

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use crate::time;

/// A cloneable flag which can be raised from any thread to ask a polling loop
/// to give up at its next iteration.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Return true if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `seconds`, checking the token every `poll` seconds.
    ///
    /// Returns `false` as soon as cancellation is seen, `true` if the full
    /// duration elapsed.
    pub fn sleep(&self, seconds: f64, poll: f64) -> bool {
        let end = Instant::now() + time::secs(seconds);

        loop {
            if self.is_cancelled() {
                return false;
            }

            let now = Instant::now();
            if now >= end {
                return true;
            }

            std::thread::sleep((end - now).min(time::secs(poll)));
        }
    }
}
