use std::io;

use thiserror::Error;

/// Errors produced by the twit-broadcast core.
///
/// Most of these are not meant to bubble up to an operator: `QueueFull` and
/// `RegistryExhausted` are handled at the call site (dropped twit, blocked
/// listener) and never escape this crate's internals.
#[derive(Debug, Error)]
pub enum TwitError {
  #[error("twit queue is full")]
  QueueFull,

  #[error("twit queue is empty")]
  QueueEmpty,

  #[error("hearer registry is full")]
  RegistryExhausted,

  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  #[error("startup failure: {0}")]
  Startup(String),
}

pub type TwitResult<T> = Result<T, TwitError>;
