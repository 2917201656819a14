use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
  },
};

use crate::{
  error::{TwitError, TwitResult},
  twitqueue::TwitQueue,
};

pub type HearerId = u64;

/// The set of currently-subscribed hearers and their egress queues (§4.2).
///
/// `for_each` holds the registry lock for the whole walk, which is what
/// gives the Broadcaster's fan-out its all-or-nothing visibility guarantee
/// relative to `unregister` (§4.7): a concurrent `unregister` simply blocks
/// until the walk in progress finishes.
pub struct HearerRegistry {
  hearers: Mutex<HashMap<HearerId, Arc<TwitQueue>>>,
  max_hearers: usize,
  egress_capacity: usize,
  next_id: AtomicU64,
}

impl HearerRegistry {
  pub fn new(max_hearers: usize, egress_capacity: usize) -> Self {
    Self {
      hearers: Mutex::new(HashMap::new()),
      max_hearers,
      egress_capacity,
      next_id: AtomicU64::new(1),
    }
  }

  /// Allocates a fresh egress queue and registers it under a new
  /// `HearerId`. Fails with `RegistryExhausted` rather than blocking —
  /// callers (HearerListener) are expected to have already waited for a
  /// free slot via `Stats::acquire_hearer_slot` before calling this.
  pub fn register(&self) -> TwitResult<(HearerId, Arc<TwitQueue>)> {
    let mut hearers = self.hearers.lock().unwrap();
    if hearers.len() >= self.max_hearers {
      return Err(TwitError::RegistryExhausted);
    }
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let queue = Arc::new(TwitQueue::new(self.egress_capacity));
    hearers.insert(id, Arc::clone(&queue));
    Ok((id, queue))
  }

  /// Idempotent: unregistering an id that is no longer present (or was
  /// never present) is a no-op. Drains the queue so any twits still queued
  /// for a departing hearer are freed rather than leaked.
  pub fn unregister(&self, id: HearerId) {
    let mut hearers = self.hearers.lock().unwrap();
    if let Some(queue) = hearers.remove(&id) {
      queue.drain();
    }
  }

  /// Invokes `f` for every registered hearer while holding the registry
  /// lock for the whole call (§4.7's fan-out atomicity guarantee).
  pub fn for_each<F: FnMut(HearerId, &Arc<TwitQueue>)>(&self, mut f: F) {
    let hearers = self.hearers.lock().unwrap();
    for (id, queue) in hearers.iter() {
      f(*id, queue);
    }
  }

  pub fn len(&self) -> usize {
    self.hearers.lock().unwrap().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn register_allocates_independent_queues() {
    let registry = HearerRegistry::new(2, 4);
    let (id1, q1) = registry.register().unwrap();
    let (id2, q2) = registry.register().unwrap();
    assert_ne!(id1, id2);
    q1.enqueue(b"a".to_vec()).unwrap();
    assert!(q2.is_empty());
  }

  #[test]
  fn register_fails_past_max_hearers() {
    let registry = HearerRegistry::new(1, 4);
    registry.register().unwrap();
    assert!(matches!(registry.register(), Err(TwitError::RegistryExhausted)));
  }

  #[test]
  fn unregister_is_idempotent_and_drains() {
    let registry = HearerRegistry::new(2, 4);
    let (id, queue) = registry.register().unwrap();
    queue.enqueue(b"x".to_vec()).unwrap();
    registry.unregister(id);
    registry.unregister(id); // second call must not panic
    assert_eq!(registry.len(), 0);
  }

  #[test]
  fn for_each_visits_every_hearer() {
    let registry = HearerRegistry::new(4, 4);
    for _ in 0..3 {
      registry.register().unwrap();
    }
    let mut seen = 0;
    registry.for_each(|_, _| seen += 1);
    assert_eq!(seen, 3);
  }
}
