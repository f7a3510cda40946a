//! Cooperative waiting and cancellation
//!
//! Every long wait in the engine is decomposed into one-second ticks so a
//! stop request is observed within a tick. Time itself comes from a
//! [`Clock`], which lets tests run multi-hour sweeps instantly.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::constants::timing;
use crate::error::{Result, TuneError};

/// Shared stop flag
///
/// Cloned into the signal handler; the engine only ever reads it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Source of elapsed time
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only advances when slept on
///
/// Can trip a [`CancelToken`] once a given amount of virtual time passed,
/// standing in for an operator pressing Ctrl-C mid-sweep.
#[derive(Debug, Default)]
pub struct VirtualClock {
    elapsed: Mutex<Duration>,
    trip: Mutex<Option<(Duration, CancelToken)>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }

    /// Cancel `token` once at least `after` has elapsed.
    pub fn cancel_after(&self, after: Duration, token: CancelToken) {
        *self.trip.lock() = Some((after, token));
    }
}

impl Clock for VirtualClock {
    fn sleep(&self, duration: Duration) {
        let now = {
            let mut elapsed = self.elapsed.lock();
            *elapsed += duration;
            *elapsed
        };
        if let Some((after, token)) = self.trip.lock().as_ref() {
            if now >= *after {
                token.cancel();
            }
        }
    }
}

/// Tick-decomposed waits over a clock and a cancel token
#[derive(Clone)]
pub struct Pacer {
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
}

impl Pacer {
    pub fn new(clock: Arc<dyn Clock>, cancel: CancelToken) -> Self {
        Self { clock, cancel }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Fail with `Cancelled` if a stop was requested.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(TuneError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Wait `secs` seconds, checking for cancellation before every tick.
    pub fn wait(&self, secs: u64) -> Result<()> {
        for _ in 0..secs {
            self.check()?;
            self.clock.sleep(timing::TICK);
        }
        self.check()
    }

    /// Wait `secs` seconds regardless of cancellation.
    ///
    /// Reserved for the settle hold of a rollback, which must finish.
    pub fn hold(&self, secs: u64) {
        if secs > 0 {
            debug!(secs, "Holding without cancellation");
        }
        for _ in 0..secs {
            self.clock.sleep(timing::TICK);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn virtual_pacer() -> (Arc<VirtualClock>, CancelToken, Pacer) {
        let clock = Arc::new(VirtualClock::new());
        let token = CancelToken::new();
        let pacer = Pacer::new(clock.clone(), token.clone());
        (clock, token, pacer)
    }

    #[test]
    fn test_wait_advances_clock() {
        let (clock, _token, pacer) = virtual_pacer();
        pacer.wait(60).unwrap();
        assert_eq!(clock.elapsed(), Duration::from_secs(60));
    }

    #[test]
    fn test_wait_observes_cancel_within_a_tick() {
        let (clock, token, pacer) = virtual_pacer();
        clock.cancel_after(Duration::from_secs(5), token);
        assert!(matches!(pacer.wait(300), Err(TuneError::Cancelled)));
        assert_eq!(clock.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn test_hold_ignores_cancel() {
        let (clock, token, pacer) = virtual_pacer();
        token.cancel();
        pacer.hold(60);
        assert_eq!(clock.elapsed(), Duration::from_secs(60));
        assert!(pacer.check().is_err());
    }
}
