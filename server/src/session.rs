//! Session state: the pure data describing one running game, plus the handful of
//! lifecycle operations (`new`, `begin_round`, `set_player_input`) the I/O front
//! end calls between ticks. The tick algorithm itself lives in `physics.rs`, which
//! operates on this struct but is kept separate so the data model and the
//! numerically hairy swept-collision code don't live in the same file.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use proto::geometry::Vec2;

use crate::client::ClientId;

/// Which of the two paddles a message or input refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Player {
    A,
    B,
}

impl Player {
    pub fn from_wire(id: u32) -> Option<Player> {
        match id {
            1 => Some(Player::A),
            2 => Some(Player::B),
            _ => None,
        }
    }
}

/// Held movement direction for a paddle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaddleDir {
    #[default]
    None,
    Left,
    Right,
}

/// One player's latest input slot. `None` input key/type pairs with `PaddleDir`
/// the same way: the slot holds the *last* key and type the client sent, applied
/// every tick until superseded (spec.md §4.2: presses never stack).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerInput {
    pub key: InputKey,
    pub kind: InputType,
}

impl Default for PlayerInput {
    fn default() -> Self {
        PlayerInput { key: InputKey::Left, kind: InputType::None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKey {
    Left,
    Right,
}

impl InputKey {
    pub fn from_wire(v: u8) -> Option<InputKey> {
        match v {
            1 => Some(InputKey::Left),
            2 => Some(InputKey::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    None,
    Press,
    Release,
}

impl InputType {
    pub fn from_wire(v: u8) -> Option<InputType> {
        match v {
            0 => Some(InputType::None),
            1 => Some(InputType::Press),
            2 => Some(InputType::Release),
            _ => None,
        }
    }
}

/// Why a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundResult {
    Timeout,
    WinA,
    WinB,
}

/// Immutable per-session configuration, fixed at `CreateSession` time.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub field_width: u32,
    pub field_height: u32,
    pub win_score: u32,
    pub game_time: u32,
    pub ball_speed: u32,
    pub ball_radius: u32,
    pub paddle_speed: u32,
    pub paddle_size: u32,
    pub paddle_offset_from_wall: u32,
}

pub struct Session {
    pub session_id: u32,
    pub config: SessionConfig,

    /// Shared datagram socket all sessions send object-state packets through; the
    /// OS serializes concurrent `send_to` calls on it, so no locking is needed
    /// (spec.md §5).
    pub stream_socket: Arc<std::net::UdpSocket>,
    pub stream_peer: SocketAddr,

    pub score_a: u32,
    pub score_b: u32,

    pub ball_pos: Vec2,
    pub ball_vel: Vec2,

    pub paddle_a_offset: f32,
    pub paddle_b_offset: f32,
    pub paddle_a_dir: PaddleDir,
    pub paddle_b_dir: PaddleDir,

    pub input_a: PlayerInput,
    pub input_b: PlayerInput,

    pub round_elapsed_ms: u64,
    pub last_tick_time: Instant,
    pub round_running: bool,
    pub session_ended: bool,
    pub last_round_result: Option<RoundResult>,

    /// Non-owning back-reference to the client that created this session. The
    /// registry owns the session; the client owns nothing here but its id is
    /// used to route round-end responses to the right send buffer (spec.md §9's
    /// generational-index alternative to a raw back-pointer).
    pub owner: ClientId,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: u32,
        owner: ClientId,
        config: SessionConfig,
        stream_socket: Arc<std::net::UdpSocket>,
        stream_peer: SocketAddr,
    ) -> Session {
        Session {
            session_id,
            config,
            stream_socket,
            stream_peer,
            score_a: 0,
            score_b: 0,
            ball_pos: Vec2::ZERO,
            ball_vel: Vec2::ZERO,
            paddle_a_offset: 0.0,
            paddle_b_offset: 0.0,
            paddle_a_dir: PaddleDir::None,
            paddle_b_dir: PaddleDir::None,
            input_a: PlayerInput::default(),
            input_b: PlayerInput::default(),
            round_elapsed_ms: 0,
            last_tick_time: Instant::now(),
            round_running: false,
            session_ended: false,
            last_round_result: None,
            owner,
        }
    }

    /// Starts a round. Fails (returns `false`) if one is already running.
    pub fn begin_round(&mut self) -> bool {
        if self.round_running {
            return false;
        }
        self.input_a = PlayerInput::default();
        self.input_b = PlayerInput::default();
        self.paddle_a_dir = PaddleDir::None;
        self.paddle_b_dir = PaddleDir::None;
        self.paddle_a_offset = 0.0;
        self.paddle_b_offset = 0.0;

        self.ball_pos = Vec2::new(
            self.config.field_width as f32 / 2.0,
            self.config.field_height as f32 / 2.0,
        );
        let theta = rand::random::<f32>() * std::f32::consts::TAU;
        self.ball_vel = Vec2::new(theta.cos(), theta.sin()) * self.config.ball_speed as f32;

        self.round_elapsed_ms = 0;
        self.round_running = true;
        self.last_tick_time = Instant::now();
        true
    }

    /// Overwrites the latest input slot for `player`. Fails if no round is
    /// running (spec.md §4.2).
    pub fn set_player_input(&mut self, player: Player, key: InputKey, kind: InputType) -> bool {
        if !self.round_running {
            return false;
        }
        let slot = match player {
            Player::A => &mut self.input_a,
            Player::B => &mut self.input_b,
        };
        *slot = PlayerInput { key, kind };
        true
    }

    pub fn is_round_running(&self) -> bool {
        self.round_running
    }

    pub fn get_round_result(&self) -> Option<RoundResult> {
        self.last_round_result
    }

    pub fn is_session_ended(&self) -> bool {
        self.session_ended
    }

    pub fn get_session_id(&self) -> u32 {
        self.session_id
    }

    pub fn get_last_tick_time(&self) -> Instant {
        self.last_tick_time
    }

    pub fn get_owner_client(&self) -> ClientId {
        self.owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

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

    fn test_session() -> Session {
        let socket = Arc::new(std::net::UdpSocket::bind("127.0.0.1:0").unwrap());
        let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000);
        Session::new(0, ClientId::new(1), test_config(), socket, peer)
    }

    #[test]
    fn new_session_starts_idle() {
        let s = test_session();
        assert!(!s.is_round_running());
        assert!(!s.is_session_ended());
        assert_eq!(s.score_a, 0);
        assert_eq!(s.score_b, 0);
    }

    #[test]
    fn begin_round_places_ball_at_center_with_nonzero_velocity() {
        let mut s = test_session();
        assert!(s.begin_round());
        assert!(s.is_round_running());
        assert_eq!(s.ball_pos, Vec2::new(400.0, 200.0));
        assert!(s.ball_vel.length() > 0.0);
        assert!((s.ball_vel.length() - 200.0).abs() < 0.5);
    }

    #[test]
    fn begin_round_fails_while_already_running() {
        let mut s = test_session();
        assert!(s.begin_round());
        assert!(!s.begin_round());
    }

    #[test]
    fn set_player_input_requires_running_round() {
        let mut s = test_session();
        assert!(!s.set_player_input(Player::A, InputKey::Left, InputType::Press));
        s.begin_round();
        assert!(s.set_player_input(Player::A, InputKey::Left, InputType::Press));
        assert_eq!(s.input_a.kind, InputType::Press);
    }

    #[test]
    fn input_wire_decoding_rejects_out_of_range_values() {
        assert_eq!(Player::from_wire(0), None);
        assert_eq!(Player::from_wire(3), None);
        assert_eq!(InputKey::from_wire(0), None);
        assert_eq!(InputType::from_wire(3), None);
    }
}
