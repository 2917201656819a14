use std::{
  io::ErrorKind,
  net::{SocketAddr, TcpStream},
  sync::{Arc, Mutex},
  thread,
};

use log::{debug, info, warn};

use super::session::SayerSession;
use crate::{
  cancel::CancelToken, config::Config, netutil::bind_listener, prep_status::PreparationStatus, stats::Stats,
  twitqueue::TwitQueue,
};

/// Accepts sayer connections, bounded by MAX_SAYERS, and spawns one
/// [`SayerSession`] per accepted peer (§4.6).
pub struct SayerListener {
  config: Arc<Config>,
  ingress: Arc<TwitQueue>,
  stats: Arc<Stats>,
  cancel: CancelToken,
  ready: Arc<PreparationStatus>,
  bound_addr: Arc<Mutex<Option<SocketAddr>>>,
}

impl SayerListener {
  pub fn new(
    config: Arc<Config>,
    ingress: Arc<TwitQueue>,
    stats: Arc<Stats>,
    cancel: CancelToken,
    ready: Arc<PreparationStatus>,
  ) -> Self {
    Self {
      config,
      ingress,
      stats,
      cancel,
      ready,
      bound_addr: Arc::new(Mutex::new(None)),
    }
  }

  /// A handle that fills in once the listening socket is bound, so a caller
  /// that requested an ephemeral port (0) can discover what was assigned
  /// (§4.6, §6 — "a port of 0 ... reported back once bound").
  pub fn bound_addr_handle(&self) -> Arc<Mutex<Option<SocketAddr>>> {
    Arc::clone(&self.bound_addr)
  }

  /// Runs the accept loop to completion on the calling thread. Binds the
  /// listening socket first and publishes readiness before entering the
  /// loop; a bind failure is reported via `PreparationStatus::Failed`
  /// instead of panicking, matching the Supervisor's startup contract.
  pub fn run(self) {
    let listener = match bind_listener(&self.config.bind_address, self.config.sayers_port, self.config.socket_backlog) {
      Ok(listener) => listener,
      Err(e) => {
        self.ready.set_failed(format!("sayer listener bind failed: {e}"));
        return;
      }
    };
    if let Err(e) = listener.set_nonblocking(true) {
      self.ready.set_failed(format!("sayer listener set_nonblocking failed: {e}"));
      return;
    }

    let local_addr = listener.local_addr().ok();
    *self.bound_addr.lock().unwrap() = local_addr;
    info!(
      "sayer listener bound on {}",
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
          warn!("sayer listener: accept error: {e}");
        }
      }
    }
    debug!("sayer listener stopping");
  }

  /// Blocks for a free sayer slot (cancellable), then spawns the session,
  /// incrementing counters before releasing the stats lock (§4.6 point 3).
  fn spawn_session(&self, stream: TcpStream, peer: &str) {
    if !self.stats.acquire_sayer_slot(&self.cancel) {
      debug!("sayer listener: shutting down, closing just-accepted peer {peer}");
      return;
    }
    let ingress = Arc::clone(&self.ingress);
    let stats = Arc::clone(&self.stats);
    let config = Arc::clone(&self.config);
    let peer = peer.to_string();
    let spawned = thread::Builder::new()
      .name(format!("sayer-{peer}"))
      .spawn(move || {
        SayerSession::new(stream, ingress, Arc::clone(&stats), config).run();
        stats.release_sayer_slot();
      });
    match spawned {
      Ok(_) => debug!("sayer listener: accepted {peer}"),
      Err(e) => {
        warn!("sayer listener: failed to spawn session for {peer}: {e}");
        self.stats.release_sayer_slot();
      }
    }
  }
}
