//! The single-threaded non-blocking I/O front-end: a level-triggered
//! readiness loop over the listen socket and every accepted client,
//! interleaved with tick-cadence dispatch into the session worker pool.
//!
//! Grounded in `original_source/Source/main.cpp`'s server loop (query
//! dispatch, send/recv buffering, tick-epilogue shape) generalized from that
//! source's single-client `select()` loop to the multi-client, `poll`-driven
//! design spec.md §4.6 calls for.

use std::collections::HashSet;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, UdpSocket};
use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use proto::wire::{
    decode_next, CreateSessionParams, Request, Response, RESULT_FAIL, RESULT_OK, WIN_PLAYER_A,
    WIN_PLAYER_B, WIN_TIMEOUT,
};

use crate::client::ClientId;
use crate::client_manager::ClientTable;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::registry::SessionRegistry;
use crate::scheduler::WorkerPool;
use crate::session::{InputKey, InputType, Player, RoundResult, Session, SessionConfig};

/// Bytes read per non-blocking `recv` pass (spec.md §4.6).
const RECV_CHUNK: usize = 1024;

pub struct Server {
    listener: TcpListener,
    clients: ClientTable,
    registry: Arc<SessionRegistry>,
    pool: WorkerPool,
    udp_socket: Arc<UdpSocket>,
    tick_duration: Duration,
    last_tick_time: Instant,
    /// Clients that sent an unrecognized query id and must be dropped once
    /// their send buffer (carrying the `UnknownQuery` response) drains.
    closing: HashSet<ClientId>,
}

impl Server {
    pub fn bind(config: ServerConfig) -> Result<Server, ServerError> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .map_err(|source| ServerError::Bind { addr: addr.clone(), source })?;
        listener.set_nonblocking(true).map_err(|source| ServerError::Listen { source })?;

        let udp_socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|source| ServerError::Bind { addr: "0.0.0.0:0".into(), source })?;
        udp_socket.set_nonblocking(true).map_err(|source| ServerError::Listen { source })?;

        let registry = Arc::new(SessionRegistry::new(config.max_sessions));
        let tick_duration = config.tick_duration();
        let pool = WorkerPool::new(config.num_workers, registry.clone(), tick_duration.as_millis() as u64);

        info!(
            "pongd listening on {addr}, {} workers, {}Hz tick, max {} sessions",
            config.num_workers, config.tick_rate, config.max_sessions
        );

        Ok(Server {
            listener,
            clients: ClientTable::new(),
            registry,
            pool,
            udp_socket: Arc::new(udp_socket),
            tick_duration,
            last_tick_time: Instant::now(),
            closing: HashSet::new(),
        })
    }

    /// Local address of the control-protocol listen socket. Mainly useful in
    /// tests that bind to an ephemeral port.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Drives the readiness loop forever. Only returns via process exit.
    pub fn run_forever(mut self) -> ! {
        loop {
            self.poll_once();
        }
    }

    /// Runs one pass of the readiness loop: accept, flush, read, tick-check.
    /// Exposed so tests can drive the server deterministically instead of
    /// calling the infinite `run_forever`.
    pub fn poll_once(&mut self) {
        let ids = self.clients.ids();
        let mut pollfds = Vec::with_capacity(ids.len() + 1);
        pollfds.push(libc::pollfd { fd: self.listener.as_raw_fd(), events: libc::POLLIN, revents: 0 });
        for id in &ids {
            let client = self.clients.get(*id).expect("id came from clients.ids()");
            let mut events = libc::POLLIN;
            if !client.send_buffer.is_empty() {
                events |= libc::POLLOUT;
            }
            pollfds.push(libc::pollfd { fd: client.socket.as_raw_fd(), events, revents: 0 });
        }

        let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, 0) };
        if rc < 0 {
            warn!("poll() failed: {}", std::io::Error::last_os_error());
            return;
        }

        if pollfds[0].revents & libc::POLLIN != 0 {
            self.accept_loop();
        }

        for (i, id) in ids.iter().enumerate() {
            let revents = pollfds[i + 1].revents;
            if revents & libc::POLLOUT != 0 {
                self.flush_send_buffer(*id);
            }
            if revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
                self.read_client(*id);
            }
        }

        self.reap_closing_clients();
        self.maybe_run_tick();
    }

    fn accept_loop(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((socket, peer_addr)) => {
                    if let Err(e) = socket.set_nonblocking(true) {
                        warn!("failed to set accepted socket non-blocking: {e}");
                        continue;
                    }
                    let id = self.clients.insert(socket);
                    debug!("accepted client {id:?} from {peer_addr}");
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("accept() failed: {e}");
                    break;
                }
            }
        }
    }

    fn flush_send_buffer(&mut self, id: ClientId) {
        let Some(client) = self.clients.get_mut(id) else { return };
        if client.send_buffer.is_empty() {
            return;
        }
        match client.socket.write(&client.send_buffer) {
            Ok(0) => {}
            Ok(n) => {
                client.send_buffer.drain(0..n);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => warn!("send to client {id:?} failed: {e}"),
        }
    }

    fn read_client(&mut self, id: ClientId) {
        let mut buf = [0u8; RECV_CHUNK];
        let read_result = {
            let Some(client) = self.clients.get_mut(id) else { return };
            client.socket.read(&mut buf)
        };
        match read_result {
            Ok(0) => self.disconnect_client(id),
            Ok(n) => {
                if let Some(client) = self.clients.get_mut(id) {
                    client.recv_buffer.extend_from_slice(&buf[..n]);
                }
                self.service_client(id);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => warn!("recv from client {id:?} failed: {e}"),
        }
    }

    /// Decodes every complete request currently buffered for `id`, services
    /// each one, and appends the responses to the client's send buffer. If an
    /// unrecognized query id is hit, the connection is flagged for teardown
    /// once the `UnknownQuery` response drains (spec.md §4.5/§7).
    fn service_client(&mut self, id: ClientId) {
        let (requests, consumed, hit_unknown) = {
            let Some(client) = self.clients.get(id) else { return };
            decode_all(&client.recv_buffer)
        };
        if consumed > 0 {
            if let Some(client) = self.clients.get_mut(id) {
                client.recv_buffer.drain(0..consumed);
            }
        }

        let responses: Vec<Response> = requests.into_iter().map(|req| self.dispatch(id, req)).collect();

        if let Some(client) = self.clients.get_mut(id) {
            for response in responses {
                response.encode(&mut client.send_buffer);
            }
        }

        if hit_unknown {
            self.closing.insert(id);
        }
    }

    fn dispatch(&mut self, client_id: ClientId, request: Request) -> Response {
        match request {
            Request::CreateSession(params) => self.handle_create_session(client_id, params),
            Request::AbortSession { session_id } => self.handle_abort_session(session_id),
            Request::BeginRound { session_id } => self.handle_begin_round(session_id),
            Request::ActionPlayerInput { session_id, player_id, input_key, input_type } => {
                self.handle_action_player_input(session_id, player_id, input_key, input_type)
            }
            Request::Unknown { query_id } => {
                warn!("unknown query id {query_id} from client {client_id:?}");
                Response::UnknownQuery { query_id }
            }
        }
    }

    fn handle_create_session(&mut self, client_id: ClientId, params: CreateSessionParams) -> Response {
        let Some(peer_ip) = self.clients.get(client_id).and_then(|c| c.socket.peer_addr().ok()).map(|a| a.ip())
        else {
            return Response::CreateSessionFail;
        };
        let stream_peer = SocketAddr::new(peer_ip, params.recv_port);
        let config = SessionConfig {
            field_width: params.field_width,
            field_height: params.field_height,
            win_score: params.win_score,
            game_time: params.game_time,
            ball_speed: params.ball_speed,
            ball_radius: params.ball_radius,
            paddle_speed: params.paddle_speed,
            paddle_size: params.paddle_size,
            paddle_offset_from_wall: params.paddle_offset_from_wall,
        };
        let socket = self.udp_socket.clone();

        match self.registry.insert_with(|id| Session::new(id, client_id, config, socket, stream_peer)) {
            Some(session_id) => {
                if let Some(client) = self.clients.get_mut(client_id) {
                    client.add_session(session_id);
                }
                info!("session {session_id} created for client {client_id:?}");
                Response::CreateSessionOk { session_id }
            }
            None => {
                warn!("session registry at capacity, rejecting CreateSession from {client_id:?}");
                Response::CreateSessionFail
            }
        }
    }

    fn handle_abort_session(&mut self, session_id: u32) -> Response {
        let owner = self.registry.with_session(session_id, |s| s.get_owner_client());
        match owner {
            Some(owner_id) => {
                self.registry.remove(session_id);
                if let Some(client) = self.clients.get_mut(owner_id) {
                    client.remove_session(session_id);
                }
                debug!("session {session_id} aborted");
                Response::AbortSession { result: RESULT_OK }
            }
            None => Response::AbortSession { result: RESULT_FAIL },
        }
    }

    fn handle_begin_round(&mut self, session_id: u32) -> Response {
        match self.registry.with_session(session_id, |s| s.begin_round()) {
            Some(true) => Response::BeginRoundAck { result: RESULT_OK },
            Some(false) | None => Response::BeginRoundAck { result: RESULT_FAIL },
        }
    }

    fn handle_action_player_input(
        &mut self,
        session_id: u32,
        player_id: u32,
        input_key: u8,
        input_type: u8,
    ) -> Response {
        let decoded = (Player::from_wire(player_id), InputKey::from_wire(input_key), InputType::from_wire(input_type));
        let (Some(player), Some(key), Some(kind)) = decoded else {
            return Response::ActionPlayerInput { result: RESULT_FAIL };
        };
        match self.registry.with_session(session_id, |s| s.set_player_input(player, key, kind)) {
            Some(true) => Response::ActionPlayerInput { result: RESULT_OK },
            Some(false) | None => Response::ActionPlayerInput { result: RESULT_FAIL },
        }
    }

    fn reap_closing_clients(&mut self) {
        let pending: Vec<ClientId> = self.closing.iter().copied().collect();
        for id in pending {
            let flushed = self.clients.get(id).map(|c| c.send_buffer.is_empty()).unwrap_or(true);
            if flushed {
                self.disconnect_client(id);
                self.closing.remove(&id);
            }
        }
    }

    fn disconnect_client(&mut self, id: ClientId) {
        if let Some(client) = self.clients.remove(id) {
            for session_id in client.sessions {
                self.registry.remove(session_id);
            }
            debug!("client {id:?} disconnected");
        }
    }

    fn maybe_run_tick(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_tick_time) >= self.tick_duration {
            self.run_tick_epilogue();
            self.last_tick_time = now;
        }
    }

    /// spec.md §4.4's main-thread tick epilogue: dispatch all round-running
    /// sessions to the worker pool, wait for completion, then emit
    /// round-result responses and free ended sessions.
    fn run_tick_epilogue(&mut self) {
        let dispatched = self.registry.running_ids();
        self.pool.dispatch_tick(&dispatched);

        for session_id in self.registry.ended_among(&dispatched) {
            let outcome = self.registry.with_session(session_id, |s| (s.get_owner_client(), s.get_round_result()));
            if let Some((owner, result)) = outcome {
                let win_player = match result {
                    Some(RoundResult::WinA) => WIN_PLAYER_A,
                    Some(RoundResult::WinB) => WIN_PLAYER_B,
                    Some(RoundResult::Timeout) | None => WIN_TIMEOUT,
                };
                if let Some(client) = self.clients.get_mut(owner) {
                    client.remove_session(session_id);
                    Response::RoundEnd { win_player }.encode(&mut client.send_buffer);
                }
            }
            self.registry.remove(session_id);
        }
    }
}

/// Decodes every complete record at the front of `buf`. Returns the decoded
/// requests, the total bytes consumed, and whether an unrecognized query id
/// was hit (in which case decoding stops: the caller must close the
/// connection, since an unknown query's body length can't be known).
fn decode_all(buf: &[u8]) -> (Vec<Request>, usize, bool) {
    let mut requests = Vec::new();
    let mut offset = 0;
    loop {
        match decode_next(&buf[offset..]) {
            Some((request, consumed)) => {
                offset += consumed;
                let is_unknown = matches!(request, Request::Unknown { .. });
                requests.push(request);
                if is_unknown {
                    return (requests, offset, true);
                }
            }
            None => return (requests, offset, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_all_stops_at_unknown_query() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&proto::wire::QUERY_ABORT_SESSION.to_ne_bytes());
        buf.extend_from_slice(&7u32.to_ne_bytes());
        buf.extend_from_slice(&999u32.to_ne_bytes());
        buf.extend_from_slice(&[1, 2, 3, 4]);

        let (requests, consumed, hit_unknown) = decode_all(&buf);
        assert!(hit_unknown);
        assert_eq!(requests.len(), 2);
        assert_eq!(consumed, 12);
    }

    #[test]
    fn decode_all_leaves_partial_record_for_next_pass() {
        let mut buf = proto::wire::QUERY_BEGIN_ROUND.to_ne_bytes().to_vec();
        buf.extend_from_slice(&[1, 2]);
        let (requests, consumed, hit_unknown) = decode_all(&buf);
        assert!(requests.is_empty());
        assert_eq!(consumed, 0);
        assert!(!hit_unknown);
    }
}
