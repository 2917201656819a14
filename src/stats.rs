use std::{
  fmt,
  sync::{Condvar, Mutex, MutexGuard},
};

use crate::cancel::{CancelToken, POLL_INTERVAL};

/// Never-wrapping increment: clamps at the type's maximum instead of
/// overflowing (§3, §9 "macro-driven saturating counters" — realized here
/// as a plain generic helper rather than a C-style macro).
fn saturating_increment(counter: &mut u64) {
  *counter = counter.saturating_add(1);
}

/// The mutable fields of [`Stats`], always accessed behind `Stats::lock`.
pub struct StatsInner {
  pub active_threads: u64,
  pub active_hearers: u32,
  pub active_sayers: u32,
  pub current_stored_twits: u64,
  pub total_arrived: u64,
  pub total_delivered: u64,
  pub incoming_rate: f64,
  pub outgoing_rate: f64,
  prev_arrived: u64,
  prev_delivered: u64,
  max_sayers: u32,
  max_hearers: u32,
}

/// A point-in-time copy of [`StatsInner`], safe to hold and print without
/// the lock (used for the SIGQUIT dump and for tests).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
  pub active_threads: u64,
  pub active_hearers: u32,
  pub active_sayers: u32,
  pub current_stored_twits: u64,
  pub total_arrived: u64,
  pub total_delivered: u64,
  pub incoming_rate: f64,
  pub outgoing_rate: f64,
}

impl fmt::Display for StatsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "--- twitserver stats ---")?;
    writeln!(f, "active_threads:       {}", self.active_threads)?;
    writeln!(f, "active_sayers:        {}", self.active_sayers)?;
    writeln!(f, "active_hearers:       {}", self.active_hearers)?;
    writeln!(f, "current_stored_twits: {}", self.current_stored_twits)?;
    writeln!(f, "total_arrived:        {}", self.total_arrived)?;
    writeln!(f, "total_delivered:      {}", self.total_delivered)?;
    writeln!(f, "incoming_rate:        {:.2}/s", self.incoming_rate)?;
    writeln!(f, "outgoing_rate:        {:.2}/s", self.outgoing_rate)
  }
}

impl From<&StatsInner> for StatsSnapshot {
  fn from(inner: &StatsInner) -> Self {
    Self {
      active_threads: inner.active_threads,
      active_hearers: inner.active_hearers,
      active_sayers: inner.active_sayers,
      current_stored_twits: inner.current_stored_twits,
      total_arrived: inner.total_arrived,
      total_delivered: inner.total_delivered,
      incoming_rate: inner.incoming_rate,
      outgoing_rate: inner.outgoing_rate,
    }
  }
}

/// The shared counters record (§3, §4.3), one lock guarding the whole
/// record plus the two condition variables listeners wait on at capacity.
pub struct Stats {
  inner: Mutex<StatsInner>,
  sayer_slot_freed: Condvar,
  hearer_slot_freed: Condvar,
}

impl Stats {
  pub fn new(max_sayers: usize, max_hearers: usize) -> Self {
    Self {
      inner: Mutex::new(StatsInner {
        active_threads: 0,
        active_hearers: 0,
        active_sayers: 0,
        current_stored_twits: 0,
        total_arrived: 0,
        total_delivered: 0,
        incoming_rate: 0.0,
        outgoing_rate: 0.0,
        prev_arrived: 0,
        prev_delivered: 0,
        max_sayers: max_sayers as u32,
        max_hearers: max_hearers as u32,
      }),
      sayer_slot_freed: Condvar::new(),
      hearer_slot_freed: Condvar::new(),
    }
  }

  /// Locks the record for a listener's spawn-then-increment sequence
  /// (§4.6 point 3): the caller holds this guard across both `thread::spawn`
  /// and the increment, which is what makes the sequence atomic relative to
  /// the spawned session's own decrement (it must take this same lock).
  pub fn lock(&self) -> MutexGuard<'_, StatsInner> {
    self.inner.lock().unwrap()
  }

  pub fn snapshot(&self) -> StatsSnapshot {
    StatsSnapshot::from(&*self.lock())
  }

  pub fn record_arrived(&self) {
    saturating_increment(&mut self.lock().total_arrived);
  }

  pub fn record_delivered(&self) {
    saturating_increment(&mut self.lock().total_delivered);
  }

  pub fn set_current_stored(&self, count: usize) {
    self.lock().current_stored_twits = count as u64;
  }

  /// Blocks while `active_sayers == max_sayers`, re-checking under the lock
  /// on every wake (spurious-wakeup-safe, §4.6). Returns `false` if
  /// cancelled while still blocked.
  pub fn acquire_sayer_slot(&self, cancel: &CancelToken) -> bool {
    let mut guard = self.inner.lock().unwrap();
    loop {
      if guard.active_sayers < guard.max_sayers {
        guard.active_sayers += 1;
        guard.active_threads = guard.active_threads.saturating_add(1);
        return true;
      }
      if cancel.is_cancelled() {
        return false;
      }
      let (g, _) = self
        .sayer_slot_freed
        .wait_timeout(guard, POLL_INTERVAL)
        .unwrap();
      guard = g;
    }
  }

  pub fn release_sayer_slot(&self) {
    let mut guard = self.inner.lock().unwrap();
    guard.active_sayers = guard.active_sayers.saturating_sub(1);
    guard.active_threads = guard.active_threads.saturating_sub(1);
    drop(guard);
    self.sayer_slot_freed.notify_one();
  }

  pub fn acquire_hearer_slot(&self, cancel: &CancelToken) -> bool {
    let mut guard = self.inner.lock().unwrap();
    loop {
      if guard.active_hearers < guard.max_hearers {
        guard.active_hearers += 1;
        guard.active_threads = guard.active_threads.saturating_add(1);
        return true;
      }
      if cancel.is_cancelled() {
        return false;
      }
      let (g, _) = self
        .hearer_slot_freed
        .wait_timeout(guard, POLL_INTERVAL)
        .unwrap();
      guard = g;
    }
  }

  pub fn release_hearer_slot(&self) {
    let mut guard = self.inner.lock().unwrap();
    guard.active_hearers = guard.active_hearers.saturating_sub(1);
    guard.active_threads = guard.active_threads.saturating_sub(1);
    drop(guard);
    self.hearer_slot_freed.notify_one();
  }

  /// Recomputes `incoming_rate`/`outgoing_rate` as the change in the two
  /// totals since the last call, divided by `interval_secs` (§4.3).
  pub fn recompute_rates(&self, interval_secs: u64) {
    let mut guard = self.lock();
    let interval = interval_secs.max(1) as f64;
    let arrived_delta = guard.total_arrived.saturating_sub(guard.prev_arrived);
    let delivered_delta = guard.total_delivered.saturating_sub(guard.prev_delivered);
    guard.incoming_rate = arrived_delta as f64 / interval;
    guard.outgoing_rate = delivered_delta as f64 / interval;
    guard.prev_arrived = guard.total_arrived;
    guard.prev_delivered = guard.total_delivered;
  }
}
