use std::sync::{Condvar, Mutex};

/// Tri-state readiness handshake a long-lived task publishes to the
/// Supervisor (§3). `Undetermined -> Ready` or `Undetermined -> Failed`
/// happens exactly once; the Supervisor blocks on [`PreparationStatus::wait`]
/// until it does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
  Undetermined,
  Ready,
  Failed(String),
}

pub struct PreparationStatus {
  status: Mutex<Status>,
  determined: Condvar,
}

impl PreparationStatus {
  pub fn new() -> Self {
    Self {
      status: Mutex::new(Status::Undetermined),
      determined: Condvar::new(),
    }
  }

  pub fn set_ready(&self) {
    let mut status = self.status.lock().unwrap();
    debug_assert_eq!(
      *status,
      Status::Undetermined,
      "PreparationStatus must transition exactly once"
    );
    *status = Status::Ready;
    self.determined.notify_all();
  }

  pub fn set_failed(&self, reason: impl Into<String>) {
    let mut status = self.status.lock().unwrap();
    debug_assert_eq!(
      *status,
      Status::Undetermined,
      "PreparationStatus must transition exactly once"
    );
    *status = Status::Failed(reason.into());
    self.determined.notify_all();
  }

  /// Blocks until the status leaves `Undetermined`.
  pub fn wait(&self) -> Status {
    let mut status = self.status.lock().unwrap();
    while *status == Status::Undetermined {
      status = self.determined.wait(status).unwrap();
    }
    status.clone()
  }
}

impl Default for PreparationStatus {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, thread, time::Duration};

  use super::*;

  #[test]
  fn wait_blocks_until_ready() {
    let prep = Arc::new(PreparationStatus::new());
    let waiter = Arc::clone(&prep);
    let handle = thread::spawn(move || waiter.wait());
    thread::sleep(Duration::from_millis(20));
    prep.set_ready();
    assert_eq!(handle.join().unwrap(), Status::Ready);
  }

  #[test]
  fn wait_reports_failure_reason() {
    let prep = PreparationStatus::new();
    prep.set_failed("bind failed");
    assert_eq!(prep.wait(), Status::Failed("bind failed".to_string()));
  }
}
