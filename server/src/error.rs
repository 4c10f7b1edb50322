//! Fatal server-level errors. Per-query failures (capacity, not-found, invalid
//! argument, state conflicts) are not modeled as `Result` errors: they are
//! ordinary protocol responses with `result = 1`, since that's what a client
//! actually observes on the wire. This type only covers the handful of failures
//! that should abort the process at startup.

use std::fmt;

#[derive(Debug)]
pub enum ServerError {
    Bind { addr: String, source: std::io::Error },
    Listen { source: std::io::Error },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Bind { addr, source } => write!(f, "failed to bind {addr}: {source}"),
            ServerError::Listen { source } => write!(f, "failed to listen: {source}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Bind { source, .. } => Some(source),
            ServerError::Listen { source } => Some(source),
        }
    }
}
