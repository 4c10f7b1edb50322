//! Startup configuration: compile-time defaults (mirroring the original
//! `config.hpp`) and the CLI surface that can override them.

use clap::Parser;

/// TCP port the control-protocol listen socket binds to.
pub const DEFAULT_PORT: u16 = 9180;

/// Upper bound on concurrently live sessions; the id pool is sized to match.
pub const MAX_SESSION: usize = 1000;

/// Default tick rate in Hz. Valid range is 20-30 per the scheduler design; 30 is
/// the original's choice.
pub const DEFAULT_TICK_RATE: u32 = 30;

/// Command-line arguments. Only the process bootstrap reads these; everything
/// downstream takes a plain `ServerConfig`.
#[derive(Parser, Debug)]
#[command(name = "pongd", about = "Authoritative multi-session Pong server")]
pub struct Args {
    /// Interface to bind the control-protocol listen socket to.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// TCP port for the control protocol.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Simulation tick rate in Hz.
    #[arg(long, default_value_t = DEFAULT_TICK_RATE)]
    pub tick_rate: u32,

    /// Number of session worker threads. Defaults to the number of available CPUs.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Maximum number of concurrently live sessions.
    #[arg(long, default_value_t = MAX_SESSION)]
    pub max_sessions: usize,
}

/// Resolved server configuration, derived from `Args` once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub tick_rate: u32,
    pub num_workers: usize,
    pub max_sessions: usize,
}

impl ServerConfig {
    pub fn from_args(args: &Args) -> ServerConfig {
        let num_workers = args
            .workers
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4));
        ServerConfig {
            host: args.host.clone(),
            port: args.port,
            tick_rate: args.tick_rate,
            num_workers: num_workers.max(1),
            max_sessions: args.max_sessions,
        }
    }

    pub fn tick_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(1000 / self.tick_rate as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_duration_matches_rate() {
        let cfg = ServerConfig {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            tick_rate: 20,
            num_workers: 4,
            max_sessions: MAX_SESSION,
        };
        assert_eq!(cfg.tick_duration(), std::time::Duration::from_millis(50));
    }

    #[test]
    fn workers_defaults_to_at_least_one() {
        let args = Args {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            tick_rate: DEFAULT_TICK_RATE,
            workers: Some(0),
            max_sessions: MAX_SESSION,
        };
        let cfg = ServerConfig::from_args(&args);
        assert!(cfg.num_workers >= 1);
    }
}
