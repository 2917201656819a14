use std::time::Duration;

use clap::Parser;

/// Every tuning constant named in the wire/operator contract, gathered into
/// one immutable record. Built once at process start and handed out as an
/// `Arc<Config>` to every long-lived task and session; nothing mutates it
/// afterwards.
#[derive(Parser, Debug, Clone)]
#[command(name = "twitserver", about = "Minimal real-time text broadcast service")]
pub struct Config {
  /// Bind address for both listeners.
  #[arg(long, default_value = "0.0.0.0")]
  pub bind_address: String,

  /// TCP port sayers connect to.
  #[arg(long, default_value_t = 7301)]
  pub sayers_port: u16,

  /// TCP port hearers connect to.
  #[arg(long, default_value_t = 7302)]
  pub hearers_port: u16,

  /// Max size of one twit including its NUL terminator.
  #[arg(long, default_value_t = 512)]
  pub max_twit_bytes: usize,

  /// Max undelivered twits held in the ingress queue, and in each hearer's
  /// egress queue.
  #[arg(long, default_value_t = 1024)]
  pub max_twitpool: usize,

  /// Max concurrent sayer connections.
  #[arg(long, default_value_t = 32)]
  pub max_sayers: usize,

  /// Max concurrent hearer connections.
  #[arg(long, default_value_t = 64)]
  pub max_hearers: usize,

  /// Per-connection quota of twits a single sayer may send.
  #[arg(long, default_value_t = 1000)]
  pub sayer_max_twits: u64,

  /// Sayer socket read-inactivity timeout, in seconds.
  #[arg(long, default_value_t = 60)]
  pub sayer_inactivity_seconds: u64,

  /// Hearer socket write-inactivity timeout, in seconds.
  #[arg(long, default_value_t = 60)]
  pub hearer_inactivity_seconds: u64,

  /// Listen backlog for both listening sockets.
  #[arg(long, default_value_t = 128)]
  pub socket_backlog: i32,

  /// Interval, in seconds, at which incoming/outgoing rates are recomputed.
  #[arg(long, default_value_t = 5)]
  pub stats_update_seconds: u64,
}

impl Default for Config {
  fn default() -> Self {
    // clap's derived defaults and `Default` must agree; parsing an empty
    // argument list exercises the exact same defaults a caller building
    // `Config::default()` directly would get.
    Config::parse_from::<_, &str>([])
  }
}

impl Config {
  pub fn sayer_inactivity(&self) -> Duration {
    Duration::from_secs(self.sayer_inactivity_seconds)
  }

  pub fn hearer_inactivity(&self) -> Duration {
    Duration::from_secs(self.hearer_inactivity_seconds)
  }

  pub fn stats_update_interval(&self) -> Duration {
    Duration::from_secs(self.stats_update_seconds)
  }

  /// Maximum non-NUL bytes a twit may carry on the wire (the rest is the
  /// NUL terminator).
  pub fn max_twit_payload_bytes(&self) -> usize {
    self.max_twit_bytes.saturating_sub(1)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_matches_spec_constants() {
    let config = Config::default();
    assert_eq!(config.max_twit_bytes, 512);
    assert_eq!(config.max_twitpool, 1024);
    assert_eq!(config.max_sayers, 32);
    assert_eq!(config.max_hearers, 64);
    assert_eq!(config.sayer_max_twits, 1000);
    assert_eq!(config.socket_backlog, 128);
  }

  #[test]
  fn small_overrides_round_trip_for_tests() {
    let config = Config {
      max_hearers: 2,
      sayer_inactivity_seconds: 1,
      sayers_port: 0,
      hearers_port: 0,
      ..Config::default()
    };
    assert_eq!(config.max_hearers, 2);
    assert_eq!(config.sayer_inactivity(), Duration::from_secs(1));
  }
}
