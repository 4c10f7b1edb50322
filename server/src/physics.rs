//! The per-tick physics step: paddle motion, swept ball/paddle/wall collision,
//! and the UDP object-state datagram. Operates on `Session`, kept in its own
//! file because the numerically hairy collision math doesn't belong next to
//! the plain data model in `session.rs`.
//!
//! Grounded in `original_source/Source/Session.cpp`'s `Update()`/
//! `SendObjectState()`, translated onto `proto::geometry`'s vector kernel.

use std::time::Instant;

use log::warn;
use proto::geometry::{line_normal, segment_segment_closest, Vec2};
use proto::wire::ObjectState;

use crate::session::{InputKey, InputType, PaddleDir, RoundResult, Session};

/// Distance the ball is nudged off a surface after reflecting, so the next
/// sub-step doesn't immediately re-detect the same collision.
const EPS_POS: f32 = 0.1;

/// Factor that scales how far off-center a paddle contact can bend the
/// reflection angle, in units of `pi` radians either side of the paddle
/// normal.
const PADDLE_REFLECT_FACTOR: f32 = 0.8;

/// Sub-pixel residual below which the swept-collision loop stops subdividing
/// the remaining travel distance for this tick.
const RESIDUAL_PX: f32 = 1.0;

fn rotate(v: Vec2, theta: f32) -> Vec2 {
    let (sin, cos) = theta.sin_cos();
    Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}

/// One of the four playfield walls, in the tie-break order spec.md §4.3
/// requires: top, bottom, left, right. Left and right are goal lines.
struct Wall {
    p1: Vec2,
    p2: Vec2,
    is_goal: bool,
}

impl Session {
    /// Advances the session to "now": applies paddle motion and resolves the
    /// swept ball collision for whatever time actually elapsed since the last
    /// tick. A no-op (but still successful) when no round is running.
    ///
    /// `tick_duration_ms` is only used to detect and log a scheduler overrun;
    /// it never clamps the elapsed time, so the simulation stays
    /// wall-clock-paced rather than fixed-step (spec.md §7).
    pub fn tick(&mut self, tick_duration_ms: u64) -> bool {
        let now = Instant::now();
        let delta_ms = now.duration_since(self.last_tick_time).as_millis() as u64;
        self.last_tick_time = now;

        if delta_ms > tick_duration_ms {
            warn!(
                "session {} tick overrun: {}ms observed, {}ms budgeted",
                self.session_id, delta_ms, tick_duration_ms
            );
        }

        if !self.round_running {
            return true;
        }

        self.round_elapsed_ms += delta_ms;
        if self.round_elapsed_ms >= self.config.game_time as u64 * 1000 {
            self.round_running = false;
            self.last_round_result = Some(RoundResult::Timeout);
            self.session_ended = true;
            return true;
        }

        let delta_sec = delta_ms as f32 / 1000.0;
        self.apply_paddle_motion(delta_sec);
        self.resolve_ball_motion(delta_sec);
        true
    }

    fn apply_paddle_motion(&mut self, delta_sec: f32) {
        let delta_px = self.config.paddle_speed as f32 * delta_sec;
        let half_height = self.config.field_height as f32 / 2.0;

        match self.paddle_a_dir {
            PaddleDir::Right => self.paddle_a_offset = (self.paddle_a_offset - delta_px).max(-half_height),
            PaddleDir::Left => self.paddle_a_offset = (self.paddle_a_offset + delta_px).min(half_height),
            PaddleDir::None => {}
        }
        match self.paddle_b_dir {
            PaddleDir::Right => self.paddle_b_offset = (self.paddle_b_offset - delta_px).max(-half_height),
            PaddleDir::Left => self.paddle_b_offset = (self.paddle_b_offset + delta_px).min(half_height),
            PaddleDir::None => {}
        }

        if self.input_a.kind == InputType::Release {
            self.paddle_a_dir = PaddleDir::None;
        }
        if self.input_a.kind == InputType::Press {
            self.paddle_a_dir = wire_key_to_dir(self.input_a.key);
        }
        if self.input_b.kind == InputType::Release {
            self.paddle_b_dir = PaddleDir::None;
        }
        if self.input_b.kind == InputType::Press {
            self.paddle_b_dir = wire_key_to_dir(self.input_b.key);
        }
    }

    /// Absolute paddle segments: `(bottom, top)` endpoints, `bottom` at the
    /// larger `y` (field coordinates are `y`-down). The axis `top - bottom`
    /// points in `-y`... spec.md orders it the other way: the segment is
    /// stored here as `(p1, p2)` with `p2 - p1 == (0, paddle_size)`, matching
    /// the sign convention the reflection formula below relies on.
    fn paddle_segment(&self, center_y: f32, x: f32) -> (Vec2, Vec2) {
        let half = self.config.paddle_size as f32 / 2.0;
        (Vec2::new(x, center_y - half), Vec2::new(x, center_y + half))
    }

    fn paddle_centers(&self) -> (Vec2, Vec2) {
        let half_height = self.config.field_height as f32 / 2.0;
        let a = Vec2::new(
            self.config.paddle_offset_from_wall as f32,
            half_height - self.paddle_a_offset,
        );
        let b = Vec2::new(
            self.config.field_width as f32 - self.config.paddle_offset_from_wall as f32,
            half_height + self.paddle_b_offset,
        );
        (a, b)
    }

    fn walls(&self) -> [Wall; 4] {
        let w = self.config.field_width as f32;
        let h = self.config.field_height as f32;
        [
            Wall { p1: Vec2::new(0.0, 0.0), p2: Vec2::new(w, 0.0), is_goal: false },
            Wall { p1: Vec2::new(0.0, h), p2: Vec2::new(w, h), is_goal: false },
            Wall { p1: Vec2::new(0.0, 0.0), p2: Vec2::new(0.0, h), is_goal: true },
            Wall { p1: Vec2::new(w, 0.0), p2: Vec2::new(w, h), is_goal: true },
        ]
    }

    /// Swept collision loop: advances `ball_pos`/`ball_vel` over `delta_sec`,
    /// resolving any number of paddle/wall reflections, and ends the round on
    /// a goal contact. Grounded in `Session.cpp`'s `Update()` collision loop;
    /// see DESIGN.md for the two deliberate deviations (the goal-to-winner
    /// mapping and the unified advance formula for walls and paddles).
    fn resolve_ball_motion(&mut self, delta_sec: f32) {
        let ball_speed = self.config.ball_speed as f32;
        let ball_radius = self.config.ball_radius as f32;

        let (paddle_a_center, paddle_b_center) = self.paddle_centers();
        let paddle_a = self.paddle_segment(paddle_a_center.y, paddle_a_center.x);
        let paddle_b = self.paddle_segment(paddle_b_center.y, paddle_b_center.x);
        let walls = self.walls();

        let mut ball = self.ball_pos;
        let mut vel = self.ball_vel;
        let mut remaining = delta_sec * ball_speed;
        let mut next = ball + vel * delta_sec;

        loop {
            if remaining < RESIDUAL_PX {
                break;
            }
            let dir = (next - ball).normalize();

            let mut collided = false;
            for paddle in [paddle_a, paddle_b] {
                let (p_ball, p_paddle, _s, t) = segment_segment_closest(ball, next, paddle.0, paddle.1);
                let shortest = p_paddle - p_ball;
                if shortest.length() >= ball_radius - f32::EPSILON {
                    continue;
                }
                if shortest.dot(dir) < 0.0 {
                    continue;
                }

                let paddle_axis = paddle.1 - paddle.0;
                let clockwise = paddle_axis.cross(dir) < 0.0;
                let normal = line_normal(paddle.0, paddle.1, clockwise);

                let mut reflect_theta = (t - 0.5) * PADDLE_REFLECT_FACTOR;
                reflect_theta *= normal.x;
                let reflected = rotate(normal, reflect_theta * std::f32::consts::PI).normalize();

                vel = reflected * ball_speed;
                let consumed = (p_ball - ball).length();
                remaining -= consumed;
                ball = p_ball + reflected * EPS_POS;
                next = ball + reflected * remaining;
                collided = true;
                break;
            }
            if collided {
                continue;
            }

            for wall in &walls {
                let (p_ball, p_wall, _s, _t) = segment_segment_closest(ball, next, wall.p1, wall.p2);
                let shortest = p_wall - p_ball;
                if shortest.length() >= ball_radius - f32::EPSILON {
                    continue;
                }
                if shortest.dot(dir) < 0.0 {
                    continue;
                }

                if wall.is_goal {
                    self.ball_pos = p_ball;
                    self.ball_vel = vel;
                    self.round_running = false;
                    self.session_ended = true;
                    // Left wall (x=0) ends the round in B's favor, right wall
                    // (x=field_width) in A's favor (spec.md §4.3).
                    if wall.p1.x == 0.0 {
                        self.score_b += 1;
                        self.last_round_result = Some(RoundResult::WinB);
                    } else {
                        self.score_a += 1;
                        self.last_round_result = Some(RoundResult::WinA);
                    }
                    return;
                }

                let wall_axis = wall.p2 - wall.p1;
                let clockwise = wall_axis.cross(dir) > 0.0;
                let normal = line_normal(wall.p1, wall.p2, clockwise);
                let reflected = normal * (2.0 * (-dir).dot(normal)) + dir;

                vel = reflected * ball_speed;
                let consumed = (p_ball - ball).length();
                remaining -= consumed;
                ball = p_ball + reflected * EPS_POS;
                next = ball + reflected * remaining;
                collided = true;
                break;
            }
            if collided {
                continue;
            }

            ball = next;
            break;
        }

        self.ball_pos = ball;
        self.ball_vel = vel;
    }

    /// Sends one datagram of the current ball and paddle state to this
    /// session's registered peer. Loss is acceptable and never retried.
    pub fn send_state(&self) -> bool {
        let state = ObjectState {
            ball_x: self.ball_pos.x,
            ball_y: self.ball_pos.y,
            paddle_a_offset: self.paddle_a_offset,
            paddle_b_offset: self.paddle_b_offset,
        };
        self.stream_socket.send_to(&state.encode(), self.stream_peer).is_ok()
    }
}

fn wire_key_to_dir(key: InputKey) -> PaddleDir {
    match key {
        InputKey::Left => PaddleDir::Left,
        InputKey::Right => PaddleDir::Right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientId;
    use crate::session::{InputKey, InputType, SessionConfig};
    use assert_approx_eq::assert_approx_eq;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::Arc;

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
    fn idle_session_tick_is_a_noop() {
        let mut s = test_session();
        assert!(s.tick(33));
        assert_eq!(s.ball_pos, Vec2::ZERO);
    }

    #[test]
    fn paddle_motion_clamps_to_half_field_height() {
        let mut s = test_session();
        s.begin_round();
        s.paddle_a_dir = PaddleDir::Left;
        for _ in 0..100 {
            s.last_tick_time = Instant::now() - std::time::Duration::from_millis(33);
            s.tick(33);
        }
        assert_approx_eq!(s.paddle_a_offset, 200.0, 0.5);
    }

    #[test]
    fn paddle_motion_right_decreases_offset() {
        let mut s = test_session();
        s.begin_round();
        s.paddle_b_dir = PaddleDir::Right;
        s.last_tick_time = Instant::now() - std::time::Duration::from_millis(100);
        s.tick(33);
        assert!(s.paddle_b_offset < 0.0);
    }

    #[test]
    fn press_sets_dir_release_clears_it() {
        let mut s = test_session();
        s.begin_round();
        s.set_player_input(crate::session::Player::A, InputKey::Left, InputType::Press);
        s.last_tick_time = Instant::now() - std::time::Duration::from_millis(16);
        s.tick(33);
        assert_eq!(s.paddle_a_dir, PaddleDir::Left);

        s.set_player_input(crate::session::Player::A, InputKey::Left, InputType::Release);
        s.last_tick_time = Instant::now() - std::time::Duration::from_millis(16);
        s.tick(33);
        assert_eq!(s.paddle_a_dir, PaddleDir::None);
    }

    #[test]
    fn round_times_out_after_game_time() {
        let mut s = test_session();
        s.begin_round();
        s.round_elapsed_ms = 19_999;
        s.last_tick_time = Instant::now() - std::time::Duration::from_millis(10);
        s.tick(33);
        assert!(!s.is_round_running());
        assert!(s.is_session_ended());
        assert_eq!(s.get_round_result(), Some(RoundResult::Timeout));
    }

    #[test]
    fn reflection_off_top_wall_preserves_speed() {
        let mut s = test_session();
        s.begin_round();
        s.ball_pos = Vec2::new(400.0, 15.0);
        s.ball_vel = Vec2::new(0.0, -200.0);
        let speed_before = s.ball_vel.length();
        s.last_tick_time = Instant::now() - std::time::Duration::from_millis(33);
        s.tick(33);
        assert_approx_eq!(s.ball_vel.length(), speed_before, 1.0);
        assert!(s.ball_vel.y > 0.0);
        assert!(s.ball_pos.y >= 0.0);
    }

    #[test]
    fn ball_crossing_left_wall_ends_round_with_win_b() {
        let mut s = test_session();
        s.begin_round();
        s.ball_pos = Vec2::new(10.0, 200.0);
        s.ball_vel = Vec2::new(-200.0, 0.0);
        s.last_tick_time = Instant::now() - std::time::Duration::from_millis(33);
        s.tick(33);
        assert!(s.is_session_ended());
        assert_eq!(s.get_round_result(), Some(RoundResult::WinB));
        assert_eq!(s.score_b, 1);
    }

    #[test]
    fn ball_crossing_right_wall_ends_round_with_win_a() {
        let mut s = test_session();
        s.begin_round();
        s.ball_pos = Vec2::new(790.0, 200.0);
        s.ball_vel = Vec2::new(200.0, 0.0);
        s.last_tick_time = Instant::now() - std::time::Duration::from_millis(33);
        s.tick(33);
        assert!(s.is_session_ended());
        assert_eq!(s.get_round_result(), Some(RoundResult::WinA));
        assert_eq!(s.score_a, 1);
    }

    #[test]
    fn paddle_reflection_bounces_ball_toward_opponent() {
        let mut s = test_session();
        s.begin_round();
        // Paddle A sits at x=100, centered on the midline; aim the ball
        // straight at its midpoint from the right.
        s.ball_pos = Vec2::new(115.0, 200.0);
        s.ball_vel = Vec2::new(-200.0, 0.0);
        s.last_tick_time = Instant::now() - std::time::Duration::from_millis(33);
        s.tick(33);
        assert!(s.ball_vel.x > 0.0);
        assert_approx_eq!(s.ball_vel.length(), 200.0, 1.0);
    }
}
