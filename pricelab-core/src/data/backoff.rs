//! Backoff waits and cancellation for retried fetches.
//!
//! The wait itself sits behind the [`Backoff`] trait so tests can record the
//! requested delays instead of sleeping through them. Waits are cut short
//! when the caller's [`CancelToken`] fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Delay before retrying after failed attempt number `attempt` (1-based):
/// `2^attempt` seconds.
pub fn exponential_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

/// Something that can wait out a backoff delay.
pub trait Backoff: Send + Sync {
    /// Wait for `delay`, returning early once `cancel` is set.
    fn wait(&self, delay: Duration, cancel: Option<&CancelToken>);
}

/// Blocks the calling thread for the delay, or until cancelled.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Backoff for ThreadSleep {
    fn wait(&self, delay: Duration, cancel: Option<&CancelToken>) {
        match cancel {
            Some(token) => {
                token.wait_timeout(delay);
            }
            None => std::thread::sleep(delay),
        }
    }
}

/// Returns immediately and remembers every requested delay.
#[derive(Debug, Default)]
pub struct RecordingBackoff {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl Backoff for RecordingBackoff {
    fn wait(&self, delay: Duration, _cancel: Option<&CancelToken>) {
        if let Ok(mut waits) = self.waits.lock() {
            waits.push(delay);
        }
    }
}

impl<B: Backoff + ?Sized> Backoff for Arc<B> {
    fn wait(&self, delay: Duration, cancel: Option<&CancelToken>) {
        (**self).wait(delay, cancel)
    }
}

/// Shared cancellation flag. Clones observe the same flag, and threads
/// blocked in [`wait_timeout`](Self::wait_timeout) wake on cancel.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    flag: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        // Set under the lock so a waiter cannot miss the notification
        // between checking the flag and parking.
        let _guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Block for up to `timeout`. Returns `true` if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !self.is_cancelled() {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            if remaining.is_zero() {
                return false;
            }
            guard = self
                .inner
                .wake
                .wait_timeout(guard, remaining)
                .map(|(g, _)| g)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_from_two_seconds() {
        assert_eq!(exponential_delay(1), Duration::from_secs(2));
        assert_eq!(exponential_delay(2), Duration::from_secs(4));
        assert_eq!(exponential_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn huge_attempt_saturates() {
        assert_eq!(exponential_delay(200), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn recording_backoff_does_not_sleep() {
        let b = RecordingBackoff::new();
        b.wait(Duration::from_secs(3600), None);
        assert_eq!(b.waits(), vec![Duration::from_secs(3600)]);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn wait_timeout_elapses_without_cancel() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn thread_sleep_wakes_on_cancel() {
        let token = CancelToken::new();
        let remote = token.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });

        let start = Instant::now();
        ThreadSleep.wait(Duration::from_secs(30), Some(&token));
        canceller.join().unwrap();

        assert!(token.is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn already_cancelled_token_does_not_block() {
        let token = CancelToken::new();
        token.cancel();
        let start = Instant::now();
        ThreadSleep.wait(Duration::from_secs(30), Some(&token));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
