//! Packed fixed-layout wire records for the control protocol (TCP, query-id keyed)
//! and the per-tick object-state stream (UDP, unkeyed).
//!
//! Every record is tightly packed, no padding, integers in host byte order, floats
//! IEEE-754 binary32, matching the raw `memcpy`-of-a-struct framing the original
//! protocol uses. There is no generic derive for this: each record hand-writes its
//! byte layout so the wire shape is exactly what's documented, independent of how a
//! general-purpose serializer might choose to lay out the same fields.

pub const QUERY_CREATE_SESSION: u32 = 101;
pub const QUERY_ABORT_SESSION: u32 = 102;
pub const QUERY_BEGIN_ROUND: u32 = 201;
pub const QUERY_ACTION_PLAYER_INPUT: u32 = 301;

pub const RESULT_OK: u8 = 0;
pub const RESULT_FAIL: u8 = 1;

/// Winner encoding for a round-end notification.
pub const WIN_TIMEOUT: u32 = 0;
pub const WIN_PLAYER_A: u32 = 1;
pub const WIN_PLAYER_B: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreateSessionParams {
    pub field_width: u32,
    pub field_height: u32,
    pub win_score: u32,
    pub game_time: u32,
    pub ball_speed: u32,
    pub ball_radius: u32,
    pub paddle_speed: u32,
    pub paddle_size: u32,
    pub paddle_offset_from_wall: u32,
    pub recv_port: u16,
}

const CREATE_SESSION_BODY_LEN: usize = 4 * 9 + 2;
const ABORT_SESSION_BODY_LEN: usize = 4;
const BEGIN_ROUND_BODY_LEN: usize = 4;
const ACTION_PLAYER_INPUT_BODY_LEN: usize = 4 + 4 + 1 + 1;

/// A fully decoded client request, together with the number of ids the caller
/// should consider `player_id` valid over (`1..=2`, enforced by the session layer,
/// not here: this module only unpacks bytes into fields).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Request {
    CreateSession(CreateSessionParams),
    AbortSession { session_id: u32 },
    BeginRound { session_id: u32 },
    ActionPlayerInput {
        session_id: u32,
        player_id: u32,
        input_key: u8,
        input_type: u8,
    },
    /// Query id not recognized. The caller must emit `Response::UnknownQuery` and
    /// then drop the connection: an unknown query's body length can't be known, so
    /// framing downstream of it is lost (spec.md §4.5/§7).
    Unknown { query_id: u32 },
}

/// Decodes the longest complete record at the start of `buf`.
///
/// Returns `Some((request, consumed))` when a full record is present; `consumed`
/// is the number of bytes the caller should drop from the front of its receive
/// buffer. Returns `None` when fewer than a full record's worth of bytes are
/// available yet, in which case the caller leaves `buf` untouched and waits for
/// more bytes to arrive.
pub fn decode_next(buf: &[u8]) -> Option<(Request, usize)> {
    if buf.len() < 4 {
        return None;
    }
    let query_id = u32::from_ne_bytes(buf[0..4].try_into().unwrap());
    let body = &buf[4..];

    match query_id {
        QUERY_CREATE_SESSION => {
            if body.len() < CREATE_SESSION_BODY_LEN {
                return None;
            }
            let mut r = ByteReader::new(body);
            let params = CreateSessionParams {
                field_width: r.u32(),
                field_height: r.u32(),
                win_score: r.u32(),
                game_time: r.u32(),
                ball_speed: r.u32(),
                ball_radius: r.u32(),
                paddle_speed: r.u32(),
                paddle_size: r.u32(),
                paddle_offset_from_wall: r.u32(),
                recv_port: r.u16(),
            };
            Some((Request::CreateSession(params), 4 + CREATE_SESSION_BODY_LEN))
        }
        QUERY_ABORT_SESSION => {
            if body.len() < ABORT_SESSION_BODY_LEN {
                return None;
            }
            let mut r = ByteReader::new(body);
            let session_id = r.u32();
            Some((Request::AbortSession { session_id }, 4 + ABORT_SESSION_BODY_LEN))
        }
        QUERY_BEGIN_ROUND => {
            if body.len() < BEGIN_ROUND_BODY_LEN {
                return None;
            }
            let mut r = ByteReader::new(body);
            let session_id = r.u32();
            Some((Request::BeginRound { session_id }, 4 + BEGIN_ROUND_BODY_LEN))
        }
        QUERY_ACTION_PLAYER_INPUT => {
            if body.len() < ACTION_PLAYER_INPUT_BODY_LEN {
                return None;
            }
            let mut r = ByteReader::new(body);
            let session_id = r.u32();
            let player_id = r.u32();
            let input_key = r.u8();
            let input_type = r.u8();
            Some((
                Request::ActionPlayerInput {
                    session_id,
                    player_id,
                    input_key,
                    input_type,
                },
                4 + ACTION_PLAYER_INPUT_BODY_LEN,
            ))
        }
        other => Some((Request::Unknown { query_id: other }, 4)),
    }
}

/// A response record ready to be appended to a client's send buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Response {
    CreateSessionOk { session_id: u32 },
    CreateSessionFail,
    AbortSession { result: u8 },
    BeginRoundAck { result: u8 },
    /// Unsolicited; carries only the winner, no result byte (spec.md §9 resolves
    /// the ambiguity between source variants in favor of this shape).
    RoundEnd { win_player: u32 },
    ActionPlayerInput { result: u8 },
    UnknownQuery { query_id: u32 },
}

impl Response {
    pub fn encode(self, out: &mut Vec<u8>) {
        let mut w = ByteWriter::new(out);
        match self {
            Response::CreateSessionOk { session_id } => {
                w.u32(QUERY_CREATE_SESSION);
                w.u8(RESULT_OK);
                w.u32(session_id);
            }
            Response::CreateSessionFail => {
                w.u32(QUERY_CREATE_SESSION);
                w.u8(RESULT_FAIL);
            }
            Response::AbortSession { result } => {
                w.u32(QUERY_ABORT_SESSION);
                w.u8(result);
            }
            Response::BeginRoundAck { result } => {
                w.u32(QUERY_BEGIN_ROUND);
                w.u8(result);
            }
            Response::RoundEnd { win_player } => {
                w.u32(QUERY_BEGIN_ROUND);
                w.u32(win_player);
            }
            Response::ActionPlayerInput { result } => {
                w.u32(QUERY_ACTION_PLAYER_INPUT);
                w.u8(result);
            }
            Response::UnknownQuery { query_id } => {
                w.u32(query_id);
                w.u8(RESULT_FAIL);
            }
        }
    }
}

/// The per-tick object-state datagram: `{ ball_x, ball_y, paddle_a_offset,
/// paddle_b_offset }`, all `f32`. Unkeyed: the peer is determined entirely by the
/// destination address/port, not by a query id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectState {
    pub ball_x: f32,
    pub ball_y: f32,
    pub paddle_a_offset: f32,
    pub paddle_b_offset: f32,
}

pub const OBJECT_STATE_LEN: usize = 4 * 4;

impl ObjectState {
    pub fn encode(self) -> [u8; OBJECT_STATE_LEN] {
        let mut out = [0u8; OBJECT_STATE_LEN];
        out[0..4].copy_from_slice(&self.ball_x.to_ne_bytes());
        out[4..8].copy_from_slice(&self.ball_y.to_ne_bytes());
        out[8..12].copy_from_slice(&self.paddle_a_offset.to_ne_bytes());
        out[12..16].copy_from_slice(&self.paddle_b_offset.to_ne_bytes());
        out
    }
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    fn u8(&mut self) -> u8 {
        let v = self.buf[self.pos];
        self.pos += 1;
        v
    }

    fn u16(&mut self) -> u16 {
        let v = u16::from_ne_bytes(self.buf[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        v
    }

    fn u32(&mut self) -> u32 {
        let v = u32::from_ne_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }
}

struct ByteWriter<'a> {
    out: &'a mut Vec<u8>,
}

impl<'a> ByteWriter<'a> {
    fn new(out: &'a mut Vec<u8>) -> Self {
        ByteWriter { out }
    }

    fn u8(&mut self, v: u8) {
        self.out.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.out.extend_from_slice(&v.to_ne_bytes());
    }
}
