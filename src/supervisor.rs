use std::io::{self, BufRead, Write};

use log::{error, info, warn};
use signal_hook::{
  consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM},
  iterator::Signals,
};

use crate::{config::Config, server::Server};

/// The process entry point (§4.8): bootstraps a [`Server`], then owns the
/// operator-facing signal loop until a confirmed shutdown. Only this
/// component ever reacts to a signal — worker threads never install a
/// handler, so they are unaffected by one arriving (§4.8 step 1, realized
/// with `signal-hook`'s self-pipe rather than manual `pthread_sigmask`).
pub struct Supervisor;

impl Supervisor {
  /// Runs the service to completion and returns the process exit code.
  pub fn run(config: Config) -> i32 {
    let server = match Server::start(config) {
      Ok(server) => server,
      Err(e) => {
        error!("startup failed: {e}");
        return 1;
      }
    };
    println!("Server got initialized successfully");

    let mut signals = match Signals::new([SIGQUIT, SIGTERM, SIGINT, SIGHUP]) {
      Ok(signals) => signals,
      Err(e) => {
        error!("failed to install signal handler: {e}");
        server.shutdown();
        return 1;
      }
    };

    for signal in signals.forever() {
      match signal {
        SIGQUIT => server.dump_stats(),
        SIGTERM | SIGINT | SIGHUP => {
          if confirm_shutdown() {
            break;
          }
        }
        _ => unreachable!("Signals was only registered for the four handled signals"),
      }
    }

    info!("shutting down");
    server.shutdown();
    0
  }
}

/// Prompts the operator on stdin/stdout. EOF or a stdin error is treated as
/// confirmation (§4.9: "Supervisor stdin at EOF during terminate prompt ->
/// treat as confirmation to terminate").
fn confirm_shutdown() -> bool {
  print!("Are you sure? [y/n] ");
  if io::stdout().flush().is_err() {
    warn!("failed to flush stdout prompt");
  }
  let mut line = String::new();
  match io::stdin().lock().read_line(&mut line) {
    Ok(0) => true, // EOF
    Ok(_) => matches!(line.trim(), "y" | "Y" | "yes" | "Yes"),
    Err(e) => {
      warn!("stdin read error during shutdown prompt: {e}");
      true
    }
  }
}
