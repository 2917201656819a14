use clap::Parser;
use twitserver::{Config, Supervisor};

fn main() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
  let config = Config::parse();
  let code = Supervisor::run(config);
  std::process::exit(code);
}
