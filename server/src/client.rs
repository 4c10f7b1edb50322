//! Connected clients: the TCP peer, its non-blocking send/recv buffers, and the
//! set of sessions it owns. Adapted from the teacher's `client_manager.rs`
//! (monotonic id assignment, ordered per-connection state) to a non-blocking
//! stream socket instead of the teacher's UDP `SocketAddr`-keyed model, since the
//! control protocol here is a TCP byte stream rather than one-datagram-per-packet.

use std::net::TcpStream;

/// Identifies a connected client for the lifetime of its TCP connection. Never
/// reused (unlike session ids, which are drawn from a bounded pool): plain
/// monotonic assignment is enough since nothing needs to bound concurrent
/// connections the way `MAX_SESSION` bounds sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub fn new(id: u64) -> ClientId {
        ClientId(id)
    }
}

const INITIAL_BUFFER_CAPACITY: usize = 4096;

pub struct Client {
    pub id: ClientId,
    pub socket: TcpStream,
    pub recv_buffer: Vec<u8>,
    pub send_buffer: Vec<u8>,
    /// Sessions this client created, in creation order. Non-owning: the registry
    /// owns the `Session` values, this is just the set to tear down on
    /// disconnect/`AbortSession`.
    pub sessions: Vec<u32>,
}

impl Client {
    pub fn new(id: ClientId, socket: TcpStream) -> Client {
        Client {
            id,
            socket,
            recv_buffer: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
            send_buffer: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
            sessions: Vec::new(),
        }
    }

    pub fn owns_session(&self, session_id: u32) -> bool {
        self.sessions.contains(&session_id)
    }

    pub fn add_session(&mut self, session_id: u32) {
        self.sessions.push(session_id);
    }

    pub fn remove_session(&mut self, session_id: u32) {
        self.sessions.retain(|id| *id != session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn tracks_owned_sessions() {
        let (_c, s) = loopback_pair();
        let mut client = Client::new(ClientId::new(1), s);
        assert!(!client.owns_session(5));
        client.add_session(5);
        client.add_session(7);
        assert!(client.owns_session(5));
        assert!(client.owns_session(7));
        client.remove_session(5);
        assert!(!client.owns_session(5));
        assert!(client.owns_session(7));
    }

    #[test]
    fn starts_with_preallocated_buffers() {
        let (_c, s) = loopback_pair();
        let client = Client::new(ClientId::new(1), s);
        assert!(client.recv_buffer.capacity() >= INITIAL_BUFFER_CAPACITY);
        assert!(client.send_buffer.capacity() >= INITIAL_BUFFER_CAPACITY);
        assert!(client.recv_buffer.is_empty());
    }
}
