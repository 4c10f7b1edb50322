//! Load-test client: opens one TCP control connection, creates and begins a
//! batch of sessions back to back, then holds them open for the session
//! timeout so the worker pool has real per-tick work to chew on.
//!
//! Grounded in `original_source/Tester/stress_no_visual.cpp`: same session
//! count, same parameter values, same create-then-begin-round sequence, same
//! hold/close timing. Speaks the wire protocol directly rather than through
//! `proto::wire`'s decode side, since that module only decodes requests (the
//! server's job) and encodes responses (also the server's job): a client
//! encodes requests and decodes responses, the mirror image.

use std::io::{Read, Write};
use std::net::{TcpStream, UdpSocket};
use std::time::Duration;

use proto::wire::{QUERY_ABORT_SESSION, QUERY_BEGIN_ROUND, QUERY_CREATE_SESSION};

const NUM_SESSION: usize = 200;
const SESSION_TIMEOUT_SECS: u32 = 20;

struct StressSession {
    udp_socket: UdpSocket,
    session_id: u32,
}

fn main() {
    env_logger::init();

    let mut tcp = TcpStream::connect("127.0.0.1:9180").expect("failed to connect to server");
    tcp.set_nodelay(true).expect("failed to set TCP_NODELAY");

    let mut sessions = Vec::with_capacity(NUM_SESSION);
    for _ in 0..NUM_SESSION {
        let udp_socket = UdpSocket::bind("0.0.0.0:0").expect("failed to bind UDP socket");
        let recv_port = udp_socket.local_addr().expect("failed to read UDP local addr").port();

        let mut create_params = Vec::with_capacity(4 + 9 * 4 + 2);
        create_params.extend_from_slice(&QUERY_CREATE_SESSION.to_ne_bytes());
        for field in [800u32, 400, 5, SESSION_TIMEOUT_SECS, 200, 30, 600, 200, 100] {
            create_params.extend_from_slice(&field.to_ne_bytes());
        }
        create_params.extend_from_slice(&recv_port.to_ne_bytes());
        tcp.write_all(&create_params).expect("failed to send CreateSession query");

        let mut response = [0u8; 9];
        tcp.read_exact(&mut response).expect("failed to receive CreateSession response");
        let result = response[4];
        if result != 0 {
            panic!("server rejected CreateSession");
        }
        let session_id = u32::from_ne_bytes(response[5..9].try_into().unwrap());
        println!("Session ID: {session_id}");

        let mut begin_round = Vec::with_capacity(8);
        begin_round.extend_from_slice(&QUERY_BEGIN_ROUND.to_ne_bytes());
        begin_round.extend_from_slice(&session_id.to_ne_bytes());
        tcp.write_all(&begin_round).expect("failed to send BeginRound query");

        let mut ack = [0u8; 5];
        tcp.read_exact(&mut ack).expect("failed to receive BeginRound response");
        if ack[4] != 0 {
            panic!("server rejected BeginRound for session {session_id}");
        }

        sessions.push(StressSession { udp_socket, session_id });
    }

    println!("begin");
    std::thread::sleep(Duration::from_secs(u64::from(SESSION_TIMEOUT_SECS) + 1));

    for session in &sessions {
        let mut abort = Vec::with_capacity(8);
        abort.extend_from_slice(&QUERY_ABORT_SESSION.to_ne_bytes());
        abort.extend_from_slice(&session.session_id.to_ne_bytes());
        let _ = tcp.write_all(&abort);
    }

    println!("end");
}
