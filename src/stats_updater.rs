use std::sync::Arc;

use log::trace;

use crate::{cancel::CancelToken, config::Config, prep_status::PreparationStatus, stats::Stats};

/// Periodically recomputes the derived incoming/outgoing rates (§4.3's
/// STATS_UPDATE_SECONDS cadence). The only suspension point is its own
/// cancellable sleep.
pub struct StatsUpdater {
  stats: Arc<Stats>,
  config: Arc<Config>,
  cancel: CancelToken,
  ready: Arc<PreparationStatus>,
}

impl StatsUpdater {
  pub fn new(stats: Arc<Stats>, config: Arc<Config>, cancel: CancelToken, ready: Arc<PreparationStatus>) -> Self {
    Self {
      stats,
      config,
      cancel,
      ready,
    }
  }

  pub fn run(self) {
    self.ready.set_ready();
    let interval = self.config.stats_update_interval();
    while !self.cancel.sleep(interval) {
      self.stats.recompute_rates(self.config.stats_update_seconds);
      trace!("stats updater: rates recomputed");
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{thread, time::Duration};

  use super::*;

  #[test]
  fn recomputes_rates_on_each_tick() {
    let stats = Arc::new(Stats::new(4, 4));
    let config = Arc::new(Config {
      stats_update_seconds: 1,
      ..Config::default()
    });
    let cancel = CancelToken::new();
    let ready = Arc::new(PreparationStatus::new());
    stats.record_arrived();
    stats.record_arrived();

    let updater = StatsUpdater::new(Arc::clone(&stats), Arc::clone(&config), cancel.clone(), Arc::clone(&ready));
    let handle = thread::spawn(move || updater.run());
    ready.wait();

    let mut seen_nonzero = false;
    for _ in 0..30 {
      if stats.snapshot().incoming_rate > 0.0 {
        seen_nonzero = true;
        break;
      }
      thread::sleep(Duration::from_millis(100));
    }
    assert!(seen_nonzero, "incoming_rate should become nonzero after a tick");

    cancel.cancel();
    handle.join().unwrap();
  }
}
