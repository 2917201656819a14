use std::sync::Arc;

use log::trace;

use crate::{
  cancel::CancelToken, hearer_registry::HearerRegistry, prep_status::PreparationStatus, stats::Stats,
  twitqueue::TwitQueue,
};

/// Drains the ingress queue and fans each twit out to every registered
/// hearer's egress queue (§4.7). The sole dequeuer of ingress, so delivery
/// preserves ingress order; holds the registry lock for one twit's whole
/// fan-out, so a hearer either sees a twit from the moment it registered or
/// not at all.
pub struct Broadcaster {
  ingress: Arc<TwitQueue>,
  registry: Arc<HearerRegistry>,
  stats: Arc<Stats>,
  cancel: CancelToken,
  ready: Arc<PreparationStatus>,
}

impl Broadcaster {
  pub fn new(
    ingress: Arc<TwitQueue>,
    registry: Arc<HearerRegistry>,
    stats: Arc<Stats>,
    cancel: CancelToken,
    ready: Arc<PreparationStatus>,
  ) -> Self {
    Self {
      ingress,
      registry,
      stats,
      cancel,
      ready,
    }
  }

  pub fn run(self) {
    self.ready.set_ready();
    while let Some(twit) = self.ingress.dequeue_blocking(&self.cancel) {
      self.stats.set_current_stored(self.ingress.count());
      self.registry.for_each(|id, queue| match queue.enqueue(twit.clone()) {
        Ok(()) => trace!("broadcaster: delivered twit to hearer {id}"),
        Err(_) => {
          queue.record_drop();
          trace!("broadcaster: hearer {id} egress full, dropped twit");
        }
      });
      self.stats.record_delivered();
    }
    trace!("broadcaster: stopping");
  }
}

#[cfg(test)]
mod tests {
  use std::{thread, time::Duration};

  use super::*;

  #[test]
  fn fans_out_one_twit_to_every_hearer() {
    let ingress = Arc::new(TwitQueue::new(4));
    let registry = Arc::new(HearerRegistry::new(4, 4));
    let (_, q1) = registry.register().unwrap();
    let (_, q2) = registry.register().unwrap();
    let stats = Arc::new(Stats::new(4, 4));
    let cancel = CancelToken::new();
    let ready = Arc::new(PreparationStatus::new());
    let broadcaster = Broadcaster::new(Arc::clone(&ingress), Arc::clone(&registry), Arc::clone(&stats), cancel.clone(), ready);

    let handle = thread::spawn(move || broadcaster.run());
    ingress.enqueue(b"hi".to_vec()).unwrap();

    let mut got1 = None;
    let mut got2 = None;
    for _ in 0..50 {
      if got1.is_none() {
        got1 = q1.dequeue().ok();
      }
      if got2.is_none() {
        got2 = q2.dequeue().ok();
      }
      if got1.is_some() && got2.is_some() {
        break;
      }
      thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(got1, Some(b"hi".to_vec()));
    assert_eq!(got2, Some(b"hi".to_vec()));
    assert_eq!(stats.snapshot().total_delivered, 1);

    cancel.cancel();
    handle.join().unwrap();
  }

  #[test]
  fn full_egress_queue_drops_for_that_hearer_only() {
    let ingress = Arc::new(TwitQueue::new(4));
    let registry = Arc::new(HearerRegistry::new(4, 1));
    let (_, slow) = registry.register().unwrap();
    let (_, fast) = registry.register().unwrap();
    slow.enqueue(b"already-full".to_vec()).unwrap(); // fill slow's capacity-1 queue
    let stats = Arc::new(Stats::new(4, 4));
    let cancel = CancelToken::new();
    let ready = Arc::new(PreparationStatus::new());
    let broadcaster = Broadcaster::new(Arc::clone(&ingress), Arc::clone(&registry), Arc::clone(&stats), cancel.clone(), ready);

    let handle = thread::spawn(move || broadcaster.run());
    ingress.enqueue(b"twit".to_vec()).unwrap();

    let mut fast_got = None;
    for _ in 0..50 {
      fast_got = fast.dequeue().ok();
      if fast_got.is_some() {
        break;
      }
      thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(fast_got, Some(b"twit".to_vec()));
    assert_eq!(slow.dequeue().unwrap(), b"already-full".to_vec());
    assert_eq!(slow.dropped(), 1);

    cancel.cancel();
    handle.join().unwrap();
  }
}
