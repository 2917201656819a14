use std::{
  collections::VecDeque,
  sync::{Condvar, Mutex},
};

use crate::{
  cancel::{CancelToken, POLL_INTERVAL},
  error::{TwitError, TwitResult},
};

/// An owned, immutable-once-created twit payload (§3). Plain `Vec<u8>`: at
/// MAX_TWIT_BYTES scale a clone per hearer is cheap, and keeping the type
/// concrete (rather than `Arc<[u8]>`) matches the spec's "copy" language
/// literally.
pub type Twit = Vec<u8>;

struct State {
  items: VecDeque<Twit>,
  capacity: usize,
  dropped: u64,
}

/// A bounded FIFO of twits (§3, §4.1). The same type backs both the single
/// ingress queue and every per-hearer egress queue.
///
/// `enqueue` never blocks: at capacity it returns `Err(QueueFull)` and the
/// queue's own drop counter is left untouched — the caller decides whether a
/// full queue is drop-and-continue (SayerSession, Broadcaster) and, if so,
/// calls [`TwitQueue::record_drop`] itself so drop accounting stays at the
/// call site that knows *why* the drop happened.
pub struct TwitQueue {
  state: Mutex<State>,
  not_empty: Condvar,
}

impl TwitQueue {
  pub fn new(capacity: usize) -> Self {
    debug_assert!(capacity > 0, "a zero-capacity twit queue can never hold anything");
    Self {
      state: Mutex::new(State {
        items: VecDeque::new(),
        capacity,
        dropped: 0,
      }),
      not_empty: Condvar::new(),
    }
  }

  /// Appends `twit`, signalling any blocked dequeuer. Fails without
  /// blocking when the queue is already at capacity.
  pub fn enqueue(&self, twit: Twit) -> TwitResult<()> {
    let mut state = self.state.lock().unwrap();
    if state.items.len() >= state.capacity {
      return Err(TwitError::QueueFull);
    }
    state.items.push_back(twit);
    self.not_empty.notify_one();
    Ok(())
  }

  /// Non-blocking pop; fails when the queue is empty.
  pub fn dequeue(&self) -> TwitResult<Twit> {
    let mut state = self.state.lock().unwrap();
    state.items.pop_front().ok_or(TwitError::QueueEmpty)
  }

  /// Blocks until a twit is available or `cancel` fires, re-checking the
  /// "not empty" predicate under the lock on every wake (guards against
  /// spurious wakeups, per the spec's resolved open question in §9).
  /// Returns `None` only when cancelled with the queue still empty.
  pub fn dequeue_blocking(&self, cancel: &CancelToken) -> Option<Twit> {
    let mut state = self.state.lock().unwrap();
    loop {
      if let Some(twit) = state.items.pop_front() {
        return Some(twit);
      }
      if cancel.is_cancelled() {
        return None;
      }
      let (guard, _) = self
        .not_empty
        .wait_timeout(state, POLL_INTERVAL)
        .unwrap();
      state = guard;
    }
  }

  pub fn count(&self) -> usize {
    self.state.lock().unwrap().items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.count() == 0
  }

  pub fn capacity(&self) -> usize {
    self.state.lock().unwrap().capacity
  }

  pub fn dropped(&self) -> u64 {
    self.state.lock().unwrap().dropped
  }

  /// Records that a twit was dropped for this queue (capacity reached).
  /// Saturating: never wraps past `u64::MAX`.
  pub fn record_drop(&self) {
    let mut state = self.state.lock().unwrap();
    state.dropped = state.dropped.saturating_add(1);
  }

  /// Drains all remaining twits, freeing them. Used when a hearer
  /// unregisters (§4.2) so its egress queue does not outlive the session.
  pub fn drain(&self) {
    let mut state = self.state.lock().unwrap();
    state.items.clear();
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, thread, time::Duration};

  use super::*;

  #[test]
  fn enqueue_respects_capacity() {
    let queue = TwitQueue::new(2);
    queue.enqueue(b"a".to_vec()).unwrap();
    queue.enqueue(b"b".to_vec()).unwrap();
    assert!(matches!(queue.enqueue(b"c".to_vec()), Err(TwitError::QueueFull)));
    assert_eq!(queue.count(), 2);
  }

  #[test]
  fn dequeue_is_fifo() {
    let queue = TwitQueue::new(4);
    queue.enqueue(b"1".to_vec()).unwrap();
    queue.enqueue(b"2".to_vec()).unwrap();
    assert_eq!(queue.dequeue().unwrap(), b"1".to_vec());
    assert_eq!(queue.dequeue().unwrap(), b"2".to_vec());
    assert!(matches!(queue.dequeue(), Err(TwitError::QueueEmpty)));
  }

  #[test]
  fn dequeue_blocking_wakes_on_enqueue() {
    let queue = Arc::new(TwitQueue::new(4));
    let cancel = CancelToken::new();
    let reader = {
      let queue = Arc::clone(&queue);
      let cancel = cancel.clone();
      thread::spawn(move || queue.dequeue_blocking(&cancel))
    };
    thread::sleep(Duration::from_millis(30));
    queue.enqueue(b"hi".to_vec()).unwrap();
    assert_eq!(reader.join().unwrap(), Some(b"hi".to_vec()));
  }

  #[test]
  fn dequeue_blocking_returns_none_when_cancelled_while_empty() {
    let queue = Arc::new(TwitQueue::new(4));
    let cancel = CancelToken::new();
    let reader = {
      let queue = Arc::clone(&queue);
      let cancel = cancel.clone();
      thread::spawn(move || queue.dequeue_blocking(&cancel))
    };
    thread::sleep(Duration::from_millis(30));
    cancel.cancel();
    assert_eq!(reader.join().unwrap(), None);
  }

  #[test]
  fn drain_empties_without_affecting_capacity() {
    let queue = TwitQueue::new(4);
    queue.enqueue(b"x".to_vec()).unwrap();
    queue.drain();
    assert!(queue.is_empty());
    assert_eq!(queue.capacity(), 4);
  }
}
