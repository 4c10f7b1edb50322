//! # Wire protocol and geometry kernel
//!
//! This crate holds the parts of the system that are pure data and pure math: the
//! packed request/response records exchanged with clients over TCP port 9180, the
//! per-tick object-state datagram streamed over UDP, and the 2D geometry kernel the
//! physics tick builds swept collision detection on top of. Nothing here touches a
//! socket, a thread, or a clock. It's shared between the server and the
//! stress-test client precisely because both sides need to agree on the same byte
//! layout and the same closest-point math without agreeing on anything else.
//!
//! ## Wire protocol (`wire`)
//! Requests and responses are fixed-layout packed records keyed by a 32-bit query
//! id: `CreateSession` (101), `AbortSession` (102), `BeginRound` (201),
//! `ActionPlayerInput` (301). The decoder in this module consumes the longest
//! complete prefix of a byte buffer and reports how many bytes it used, leaving
//! the caller to manage partial reads across I/O passes.
//!
//! ## Geometry (`geometry`)
//! Vector arithmetic and `segment_segment_closest`, the routine that finds the
//! closest approach between a moving ball and a paddle or wall segment within one
//! simulation step.

pub mod geometry;
pub mod wire;
