use clap::Parser;
use log::error;

use server::config::{Args, ServerConfig};

fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Warning: RUST_LOG environment variable not set. Set it to display logs!");
        eprintln!("Recommended: RUST_LOG=info cargo run");
    }

    let args = Args::parse();
    let config = ServerConfig::from_args(&args);

    if let Err(e) = server::run(config) {
        error!("server exited: {e}");
        std::process::exit(1);
    }
}
