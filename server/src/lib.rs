//! Authoritative Pong server.
//!
//! A single I/O thread multiplexes accepted TCP connections with
//! [`libc::poll`] and decodes the fixed-layout request protocol from
//! `proto::wire`. Each tick cadence it hands every round-running session to
//! a fixed-size worker pool ([`scheduler::WorkerPool`]), which advances
//! swept-collision physics ([`physics`]) and streams an `ObjectState`
//! datagram to the session's registered UDP peer. Sessions live in a
//! fixed-capacity table ([`registry::SessionRegistry`]) indexed directly by
//! session id.

pub mod client;
pub mod client_manager;
pub mod config;
pub mod error;
pub mod network;
pub mod physics;
pub mod registry;
pub mod scheduler;
pub mod session;

use config::ServerConfig;
use error::ServerError;

/// Binds and runs the server, blocking forever. Returns only if binding or
/// listener setup fails.
pub fn run(config: ServerConfig) -> Result<(), ServerError> {
    let server = network::Server::bind(config)?;
    server.run_forever();
}
