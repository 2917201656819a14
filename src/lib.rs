pub mod broadcaster;
pub mod cancel;
pub mod config;
pub mod error;
pub mod hearer;
pub mod hearer_registry;
mod ioutil;
mod netutil;
pub mod prep_status;
pub mod sayer;
pub mod server;
pub mod stats;
pub mod stats_updater;
pub mod supervisor;
pub mod twitqueue;

pub use config::Config;
pub use error::{TwitError, TwitResult};
pub use server::Server;
pub use supervisor::Supervisor;
