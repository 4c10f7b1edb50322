//! Performance benchmarks for the tick-budget-sensitive parts of the core:
//! the swept-collision physics step, the geometry kernel it's built on, and
//! the worker pool's per-tick dispatch. These aren't criterion-grade
//! micro-benchmarks; they're coarse wall-clock sanity checks that the hot
//! path stays well inside the ~33ms tick budget (spec.md §1) even at the
//! session counts spec.md §8's stress scenario calls for.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use proto::geometry::{segment_segment_closest, Vec2};
use server::client::ClientId;
use server::registry::SessionRegistry;
use server::scheduler::WorkerPool;
use server::session::{Session, SessionConfig};

fn test_config() -> SessionConfig {
    SessionConfig {
        field_width: 800,
        field_height: 400,
        win_score: 5,
        game_time: 20,
        ball_speed: 200,
        ball_radius: 30,
        paddle_speed: 600,
        paddle_size: 200,
        paddle_offset_from_wall: 100,
    }
}

fn make_running_session(id: u32) -> Session {
    let socket = Arc::new(std::net::UdpSocket::bind("127.0.0.1:0").unwrap());
    let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000 + (id % 1000) as u16);
    let mut session = Session::new(id, ClientId::new(1), test_config(), socket, peer);
    session.begin_round();
    session
}

/// The closest-points-between-segments kernel runs twice per paddle and up
/// to four times per wall, every sub-step of every session's tick, so it has
/// to be cheap.
#[test]
fn benchmark_segment_segment_closest() {
    let a1 = Vec2::new(100.0, 100.0);
    let a2 = Vec2::new(120.0, 140.0);
    let b1 = Vec2::new(100.0, 0.0);
    let b2 = Vec2::new(100.0, 400.0);

    let iterations = 1_000_000;
    let start = Instant::now();
    for _ in 0..iterations {
        let _ = segment_segment_closest(a1, a2, b1, b2);
    }
    let duration = start.elapsed();
    println!(
        "segment_segment_closest: {iterations} iterations in {duration:?} ({:.2} ns/iter)",
        duration.as_nanos() as f64 / iterations as f64
    );
    assert!(duration.as_millis() < 500);
}

/// One session's `tick()`: paddle motion plus the swept ball collision loop.
/// Cheap individually is necessary but not sufficient: the scheduler also
/// needs this to scale to hundreds of concurrent sessions within one tick
/// budget, which `benchmark_worker_pool_dispatch` below covers.
#[test]
fn benchmark_single_session_tick() {
    let mut session = make_running_session(0);
    // Aim the ball across open space so most ticks don't hit a collision
    // branch, representative of typical mid-rally state.
    session.ball_pos = Vec2::new(400.0, 200.0);
    session.ball_vel = Vec2::new(150.0, 130.0);

    let iterations = 10_000;
    let start = Instant::now();
    for _ in 0..iterations {
        session.last_tick_time = Instant::now() - Duration::from_millis(16);
        session.tick(33);
    }
    let duration = start.elapsed();
    println!(
        "single session tick: {iterations} iterations in {duration:?} ({:.2} us/iter)",
        duration.as_micros() as f64 / iterations as f64
    );
    assert!(duration.as_millis() < 1000);
}

/// Dispatches a full tick across the worker pool for a session count at the
/// scale of spec.md §8's stress scenario (200 concurrent sessions), and
/// checks the whole tick completes comfortably inside the tick budget.
#[test]
fn benchmark_worker_pool_dispatch_at_stress_scale() {
    let num_sessions = 200;
    let registry = Arc::new(SessionRegistry::new(num_sessions + 10));
    let mut ids = Vec::with_capacity(num_sessions);
    for _ in 0..num_sessions {
        let id = registry.insert_with(make_running_session).unwrap();
        ids.push(id);
    }

    let pool = WorkerPool::new(4, registry.clone(), 33);

    let iterations = 50;
    let start = Instant::now();
    for _ in 0..iterations {
        pool.dispatch_tick(&ids);
    }
    let duration = start.elapsed();
    let per_tick = duration / iterations;
    println!(
        "worker pool dispatch: {num_sessions} sessions x {iterations} ticks in {duration:?} ({per_tick:?}/tick)"
    );
    assert!(per_tick < Duration::from_millis(33), "tick budget exceeded: {per_tick:?}");

    pool.shutdown();
}

/// The wire codec's decode path runs once per request in the receive
/// buffer, every I/O pass; it has to stay far below the per-tick budget
/// even when many requests arrive back to back.
#[test]
fn benchmark_wire_decode_throughput() {
    use proto::wire::{decode_next, QUERY_ACTION_PLAYER_INPUT};

    let mut record = Vec::new();
    record.extend_from_slice(&QUERY_ACTION_PLAYER_INPUT.to_ne_bytes());
    record.extend_from_slice(&7u32.to_ne_bytes());
    record.extend_from_slice(&1u32.to_ne_bytes());
    record.push(1);
    record.push(1);

    let iterations = 200_000;
    let start = Instant::now();
    for _ in 0..iterations {
        let (_req, consumed) = decode_next(&record).unwrap();
        assert_eq!(consumed, record.len());
    }
    let duration = start.elapsed();
    println!(
        "wire decode: {iterations} iterations in {duration:?} ({:.2} ns/iter)",
        duration.as_nanos() as f64 / iterations as f64
    );
    assert!(duration.as_millis() < 200);
}
