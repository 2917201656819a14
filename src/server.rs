use std::{
  net::SocketAddr,
  sync::{Arc, Mutex},
  thread::{self, JoinHandle},
};

use log::info;

use crate::{
  broadcaster::Broadcaster,
  cancel::CancelToken,
  config::Config,
  error::{TwitError, TwitResult},
  hearer::HearerListener,
  hearer_registry::HearerRegistry,
  prep_status::{PreparationStatus, Status},
  sayer::SayerListener,
  stats::Stats,
  stats_updater::StatsUpdater,
  twitqueue::TwitQueue,
};

/// Bootstraps components 1–9 (§2) and owns the handles needed to observe
/// and later cancel them. [`Supervisor`] layers signal handling and the
/// operator-facing CLI loop on top of this; tests use it directly against
/// ephemeral ports.
pub struct Server {
  pub config: Arc<Config>,
  pub stats: Arc<Stats>,
  pub ingress: Arc<TwitQueue>,
  pub registry: Arc<HearerRegistry>,
  cancel: CancelToken,
  sayer_addr: Arc<Mutex<Option<SocketAddr>>>,
  hearer_addr: Arc<Mutex<Option<SocketAddr>>>,
  handles: Vec<JoinHandle<()>>,
}

impl Server {
  /// Spawns StatsUpdater, Broadcaster, SayerListener, HearerListener in
  /// that order (§4.8 step 2), waiting for each one's PreparationStatus
  /// before moving to the next. Aborts and cancels everything already
  /// spawned if any component fails to come up (§4.8 step 3).
  pub fn start(config: Config) -> TwitResult<Self> {
    let config = Arc::new(config);
    let stats = Arc::new(Stats::new(config.max_sayers, config.max_hearers));
    let ingress = Arc::new(TwitQueue::new(config.max_twitpool));
    let registry = Arc::new(HearerRegistry::new(config.max_hearers, config.max_twitpool));
    let cancel = CancelToken::new();
    let mut handles = Vec::with_capacity(4);

    macro_rules! spawn_and_await {
      ($label:expr, $ready:expr, $run:expr) => {{
        let ready = $ready;
        let handle = thread::Builder::new().name($label.to_string()).spawn($run).map_err(|e| {
          TwitError::Startup(format!("{} failed to spawn: {}", $label, e))
        })?;
        match ready.wait() {
          Status::Ready => handles.push(handle),
          Status::Failed(reason) => {
            cancel.cancel();
            for h in handles.drain(..) {
              let _ = h.join();
            }
            let _ = handle.join();
            return Err(TwitError::Startup(format!("{} failed: {}", $label, reason)));
          }
          Status::Undetermined => unreachable!("wait() only returns once determined"),
        }
      }};
    }

    let stats_ready = Arc::new(PreparationStatus::new());
    {
      let stats = Arc::clone(&stats);
      let config = Arc::clone(&config);
      let cancel = cancel.clone();
      let ready = Arc::clone(&stats_ready);
      spawn_and_await!("stats-updater", stats_ready, move || {
        StatsUpdater::new(stats, config, cancel, ready).run()
      });
    }

    let broadcaster_ready = Arc::new(PreparationStatus::new());
    {
      let ingress = Arc::clone(&ingress);
      let registry = Arc::clone(&registry);
      let stats = Arc::clone(&stats);
      let cancel = cancel.clone();
      let ready = Arc::clone(&broadcaster_ready);
      spawn_and_await!("broadcaster", broadcaster_ready, move || {
        Broadcaster::new(ingress, registry, stats, cancel, ready).run()
      });
    }

    let sayer_ready = Arc::new(PreparationStatus::new());
    let sayer_addr = {
      let config = Arc::clone(&config);
      let ingress = Arc::clone(&ingress);
      let stats = Arc::clone(&stats);
      let cancel = cancel.clone();
      let ready = Arc::clone(&sayer_ready);
      let listener = SayerListener::new(config, ingress, stats, cancel, ready);
      let addr_handle = listener.bound_addr_handle();
      spawn_and_await!("sayer-listener", sayer_ready, move || listener.run());
      addr_handle
    };

    let hearer_ready = Arc::new(PreparationStatus::new());
    let hearer_addr = {
      let config = Arc::clone(&config);
      let registry = Arc::clone(&registry);
      let stats = Arc::clone(&stats);
      let cancel = cancel.clone();
      let ready = Arc::clone(&hearer_ready);
      let listener = HearerListener::new(config, registry, stats, cancel, ready);
      let addr_handle = listener.bound_addr_handle();
      spawn_and_await!("hearer-listener", hearer_ready, move || listener.run());
      addr_handle
    };

    info!("all components ready");
    Ok(Self {
      config,
      stats,
      ingress,
      registry,
      cancel,
      sayer_addr,
      hearer_addr,
      handles,
    })
  }

  pub fn sayer_addr(&self) -> Option<SocketAddr> {
    *self.sayer_addr.lock().unwrap()
  }

  pub fn hearer_addr(&self) -> Option<SocketAddr> {
    *self.hearer_addr.lock().unwrap()
  }

  /// Prints the stats dump used for the SIGQUIT response (§4.8 step 5),
  /// holding the stats lock and the ingress lock together — the one
  /// exception to the outer-to-inner lock order (§5), since this is the
  /// only place both are ever held at once.
  pub fn dump_stats(&self) {
    let mut guard = self.stats.lock();
    guard.current_stored_twits = self.ingress.count() as u64;
    let snapshot = crate::stats::StatsSnapshot::from(&*guard);
    drop(guard);
    println!("{snapshot}");
  }

  /// Cancels all long-lived tasks and joins them (§4.8 step 6). Does not
  /// wait on sessions spawned by the listeners; they drain independently as
  /// their sockets close or their clients disconnect.
  pub fn shutdown(mut self) {
    self.cancel.cancel();
    for handle in self.handles.drain(..) {
      let _ = handle.join();
    }
  }
}
