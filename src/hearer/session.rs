use std::{
  io::ErrorKind,
  net::{Shutdown, TcpStream},
  sync::Arc,
};

use log::{debug, trace, warn};

use crate::{
  cancel::CancelToken,
  config::Config,
  hearer_registry::{HearerId, HearerRegistry},
  ioutil::write_all_retry,
  stats::Stats,
  twitqueue::TwitQueue,
};

/// One consumer connection's state machine (§4.5): wait for a twit on its
/// own egress queue, write it whole, repeat until cancelled or the socket
/// fails.
pub struct HearerSession {
  stream: TcpStream,
  id: HearerId,
  egress: Arc<TwitQueue>,
  registry: Arc<HearerRegistry>,
  stats: Arc<Stats>,
  config: Arc<Config>,
  cancel: CancelToken,
  peer: String,
}

impl HearerSession {
  pub fn new(
    stream: TcpStream,
    id: HearerId,
    egress: Arc<TwitQueue>,
    registry: Arc<HearerRegistry>,
    stats: Arc<Stats>,
    config: Arc<Config>,
    cancel: CancelToken,
  ) -> Self {
    let peer = stream
      .peer_addr()
      .map(|a| a.to_string())
      .unwrap_or_else(|_| "<unknown>".to_string());
    Self {
      stream,
      id,
      egress,
      registry,
      stats,
      config,
      cancel,
      peer,
    }
  }

  /// Runs the session to completion. Always unregisters from the
  /// HearerRegistry on exit, whatever the reason, so a dead hearer's egress
  /// queue never outlives it (§4.2).
  pub fn run(mut self) {
    if let Err(e) = self.stream.set_write_timeout(Some(self.config.hearer_inactivity())) {
      warn!("hearer {}: failed to set write timeout: {}", self.peer, e);
    }

    let mut twits_sent: u64 = 0;
    loop {
      let twit = match self.egress.dequeue_blocking(&self.cancel) {
        Some(twit) => twit,
        None => {
          debug!("hearer {}: shutting down", self.peer);
          break;
        }
      };
      match write_all_retry(&mut self.stream, &twit) {
        Ok(()) => {
          twits_sent += 1;
          trace!("hearer {}: delivered twit ({} bytes)", self.peer, twit.len());
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
          debug!("hearer {}: write inactivity timeout", self.peer);
          break;
        }
        Err(e) => {
          debug!("hearer {}: write error: {}", self.peer, e);
          break;
        }
      }
    }

    self.registry.unregister(self.id);
    let _ = self.stream.shutdown(Shutdown::Write);
    debug!("hearer {} closing after {} twit(s)", self.peer, twits_sent);
  }
}
