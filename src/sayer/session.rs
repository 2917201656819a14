use std::{
  io::ErrorKind,
  net::{Shutdown, TcpStream},
  sync::Arc,
};

use log::{debug, trace, warn};

use crate::{config::Config, ioutil::read_one_byte, stats::Stats, twitqueue::TwitQueue};

/// One producer connection's state machine (§4.4):
/// `CONNECTED -> (READ_TWIT -> ADMIT)* -> CLOSING`.
pub struct SayerSession {
  stream: TcpStream,
  ingress: Arc<TwitQueue>,
  stats: Arc<Stats>,
  config: Arc<Config>,
  peer: String,
}

impl SayerSession {
  pub fn new(
    stream: TcpStream,
    ingress: Arc<TwitQueue>,
    stats: Arc<Stats>,
    config: Arc<Config>,
  ) -> Self {
    let peer = stream
      .peer_addr()
      .map(|a| a.to_string())
      .unwrap_or_else(|_| "<unknown>".to_string());
    Self {
      stream,
      ingress,
      stats,
      config,
      peer,
    }
  }

  /// Runs the session to completion on the calling thread. Always tears
  /// down (socket shutdown, slot release) on every exit path, including
  /// read errors and quota exhaustion — there is no cancellation token here
  /// because a sayer session's only suspension point is its own socket
  /// read, which a service-wide shutdown reaches indirectly by having the
  /// Supervisor simply stop waiting on it (the OS closes the listening
  /// sockets; already-accepted sessions are allowed to drain naturally).
  pub fn run(mut self) {
    if let Err(e) = self
      .stream
      .set_read_timeout(Some(self.config.sayer_inactivity()))
    {
      warn!("sayer {}: failed to set read timeout: {}", self.peer, e);
    }

    let max_payload = self.config.max_twit_payload_bytes();
    let mut buf = Vec::with_capacity(max_payload.min(256));
    let mut twits_sent: u64 = 0;

    'session: while twits_sent < self.config.sayer_max_twits {
      buf.clear();
      loop {
        match read_one_byte(&mut self.stream) {
          Ok(Some(0)) => break, // explicit NUL terminator
          Ok(Some(byte)) => {
            buf.push(byte);
            if buf.len() >= max_payload {
              // implicit end: MAX_TWIT_BYTES-1 non-NUL bytes without a NUL
              break;
            }
          }
          Ok(None) => {
            debug!("sayer {}: peer closed connection", self.peer);
            break 'session;
          }
          Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
            debug!("sayer {}: inactivity timeout", self.peer);
            break 'session;
          }
          Err(e) => {
            debug!("sayer {}: read error: {}", self.peer, e);
            break 'session;
          }
        }
      }

      if buf.is_empty() {
        // A bare NUL with no preceding bytes is not a twit (min length 1);
        // skip it rather than admitting an empty twit.
        continue;
      }

      twits_sent += 1;
      // total_arrived counts every twit offered, admitted or not (§4.4,
      // §9's resolved open question).
      self.stats.record_arrived();
      match self.ingress.enqueue(buf.clone()) {
        Ok(()) => trace!("sayer {}: admitted twit ({} bytes)", self.peer, buf.len()),
        Err(_) => {
          self.ingress.record_drop();
          trace!("sayer {}: ingress full, dropped twit", self.peer);
        }
      }
    }

    let _ = self.stream.shutdown(Shutdown::Read);
    debug!(
      "sayer {} closing after {} twit(s)",
      self.peer, twits_sent
    );
  }
}
