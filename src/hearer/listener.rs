use std::{
  io::ErrorKind,
  net::{SocketAddr, TcpStream},
  sync::{Arc, Mutex},
  thread,
};

use log::{debug, info, warn};

use super::session::HearerSession;
use crate::{
  cancel::CancelToken, config::Config, hearer_registry::HearerRegistry, netutil::bind_listener,
  prep_status::PreparationStatus, stats::Stats,
};

/// Accepts hearer connections, bounded by MAX_HEARERS, allocating a fresh
/// egress queue per peer before spawning one [`HearerSession`] (§4.6).
pub struct HearerListener {
  config: Arc<Config>,
  registry: Arc<HearerRegistry>,
  stats: Arc<Stats>,
  cancel: CancelToken,
  ready: Arc<PreparationStatus>,
  bound_addr: Arc<Mutex<Option<SocketAddr>>>,
}

impl HearerListener {
  pub fn new(
    config: Arc<Config>,
    registry: Arc<HearerRegistry>,
    stats: Arc<Stats>,
    cancel: CancelToken,
    ready: Arc<PreparationStatus>,
  ) -> Self {
    Self {
      config,
      registry,
      stats,
      cancel,
      ready,
      bound_addr: Arc::new(Mutex::new(None)),
    }
  }

  pub fn bound_addr_handle(&self) -> Arc<Mutex<Option<SocketAddr>>> {
    Arc::clone(&self.bound_addr)
  }

  pub fn run(self) {
    let listener = match bind_listener(&self.config.bind_address, self.config.hearers_port, self.config.socket_backlog) {
      Ok(listener) => listener,
      Err(e) => {
        self.ready.set_failed(format!("hearer listener bind failed: {e}"));
        return;
      }
    };
    if let Err(e) = listener.set_nonblocking(true) {
      self.ready.set_failed(format!("hearer listener set_nonblocking failed: {e}"));
      return;
    }

    let local_addr = listener.local_addr().ok();
    *self.bound_addr.lock().unwrap() = local_addr;
    info!(
      "hearer listener bound on {}",
      local_addr.map(|a| a.to_string()).unwrap_or_else(|| "<unknown>".to_string())
    );
    self.ready.set_ready();

    while !self.cancel.is_cancelled() {
      match listener.accept() {
        Ok((stream, peer)) => self.spawn_session(stream, &peer.to_string()),
        Err(e) if e.kind() == ErrorKind::WouldBlock => {
          self.cancel.sleep(crate::cancel::POLL_INTERVAL);
        }
        Err(e) => {
          warn!("hearer listener: accept error: {e}");
        }
      }
    }
    debug!("hearer listener stopping");
  }

  /// Blocks for a free hearer slot, allocates the egress queue, then spawns
  /// the session with counters incremented before the stats lock is
  /// released (§4.6).
  fn spawn_session(&self, stream: TcpStream, peer: &str) {
    if !self.stats.acquire_hearer_slot(&self.cancel) {
      debug!("hearer listener: shutting down, closing just-accepted peer {peer}");
      return;
    }
    let (id, egress) = match self.registry.register() {
      Ok(pair) => pair,
      Err(e) => {
        warn!("hearer listener: {peer}: {e}");
        self.stats.release_hearer_slot();
        return;
      }
    };
    let registry = Arc::clone(&self.registry);
    let stats = Arc::clone(&self.stats);
    let config = Arc::clone(&self.config);
    let cancel = self.cancel.clone();
    let peer_owned = peer.to_string();
    let spawned = thread::Builder::new()
      .name(format!("hearer-{peer_owned}"))
      .spawn(move || {
        HearerSession::new(stream, id, egress, Arc::clone(&registry), Arc::clone(&stats), config, cancel).run();
        stats.release_hearer_slot();
      });
    match spawned {
      Ok(_) => debug!("hearer listener: accepted {peer}"),
      Err(e) => {
        warn!("hearer listener: failed to spawn session for {peer}: {e}");
        self.registry.unregister(id);
        self.stats.release_hearer_slot();
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::twitqueue::TwitQueue;

  #[test]
  fn accepted_peer_registers_and_increments_active_hearers() {
    let config = Arc::new(Config {
      bind_address: "127.0.0.1".to_string(),
      hearers_port: 0,
      hearer_inactivity_seconds: 1,
      ..Config::default()
    });
    let registry = Arc::new(HearerRegistry::new(config.max_hearers, config.max_twitpool));
    let stats = Arc::new(Stats::new(config.max_sayers, config.max_hearers));
    let cancel = CancelToken::new();
    let ready = Arc::new(PreparationStatus::new());
    let listener = HearerListener::new(
      Arc::clone(&config),
      Arc::clone(&registry),
      Arc::clone(&stats),
      cancel.clone(),
      Arc::clone(&ready),
    );
    let bound_addr = listener.bound_addr_handle();
    let handle = thread::spawn(move || listener.run());
    ready.wait();
    let addr = bound_addr.lock().unwrap().expect("address bound");

    let _conn = TcpStream::connect(addr).unwrap();
    let mut seen = false;
    for _ in 0..50 {
      if stats.snapshot().active_hearers == 1 && registry.len() == 1 {
        seen = true;
        break;
      }
      thread::sleep(Duration::from_millis(10));
    }
    assert!(seen, "active_hearers and registry should reflect the new peer");

    cancel.cancel();
    handle.join().unwrap();
  }

  #[test]
  fn egress_queue_capacity_matches_max_twitpool() {
    let registry = Arc::new(HearerRegistry::new(4, 2));
    let (_, queue): (_, Arc<TwitQueue>) = registry.register().unwrap();
    assert_eq!(queue.capacity(), 2);
  }
}
