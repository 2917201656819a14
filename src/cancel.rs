use std::{
  sync::{Arc, Condvar, Mutex},
  time::Duration,
};

/// Cooperative shutdown signal shared by every long-lived task and session.
///
/// Rust threads have no equivalent of pthread cancellation, so every
/// suspension point named in the concurrency model (condition variable
/// waits, the listener accept loop, StatsUpdater's sleep) instead wakes
/// periodically and checks this flag. `cancel()` also wakes anything
/// currently parked on the token's own condition variable.
#[derive(Clone)]
pub struct CancelToken {
  inner: Arc<(Mutex<bool>, Condvar)>,
}

/// How often a cancellable wait loop re-checks the flag. Not a protocol
/// timeout (§5): purely an implementation detail bounding shutdown latency.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

impl CancelToken {
  pub fn new() -> Self {
    Self {
      inner: Arc::new((Mutex::new(false), Condvar::new())),
    }
  }

  pub fn cancel(&self) {
    let (lock, cvar) = &*self.inner;
    let mut cancelled = lock.lock().unwrap();
    *cancelled = true;
    cvar.notify_all();
  }

  pub fn is_cancelled(&self) -> bool {
    let (lock, _) = &*self.inner;
    *lock.lock().unwrap()
  }

  /// Sleeps for up to `duration`, waking early if cancelled. Returns `true`
  /// if cancellation happened (whether before or during the sleep).
  pub fn sleep(&self, duration: Duration) -> bool {
    let (lock, cvar) = &*self.inner;
    let guard = lock.lock().unwrap();
    if *guard {
      return true;
    }
    let (guard, _) = cvar.wait_timeout(guard, duration).unwrap();
    *guard
  }
}

impl Default for CancelToken {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use std::thread;

  use super::*;

  #[test]
  fn sleep_returns_early_once_cancelled() {
    let token = CancelToken::new();
    let waiter = token.clone();
    let handle = thread::spawn(move || waiter.sleep(Duration::from_secs(5)));
    thread::sleep(Duration::from_millis(20));
    token.cancel();
    assert!(handle.join().unwrap());
  }

  #[test]
  fn sleep_elapses_normally_without_cancellation() {
    let token = CancelToken::new();
    assert!(!token.sleep(Duration::from_millis(20)));
  }
}
