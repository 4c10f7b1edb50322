//! The session registry: a fixed-size table of session slots plus a reusable
//! id pool bounded at `MAX_SESSION`. Owns every live `Session`; the I/O thread
//! and the worker pool both reach sessions through this table rather than
//! through any direct reference (spec.md §9's "process-wide singleton" note).
//!
//! Resolving spec.md §9's open question on the id pool: this is a single
//! process-wide pool built once at startup (`0..max_sessions`) and never
//! rebuilt: ids are released back to it only on session destruction.

use std::sync::Mutex;

use crate::session::Session;

/// Owns every session slot. A slot is `None` when its id is free. Indexing is
/// by session id directly, so lookups never need a hash map.
pub struct SessionRegistry {
    slots: Vec<Mutex<Option<Session>>>,
    free_ids: Mutex<Vec<u32>>,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> SessionRegistry {
        let mut slots = Vec::with_capacity(max_sessions);
        for _ in 0..max_sessions {
            slots.push(Mutex::new(None));
        }
        let free_ids = (0..max_sessions as u32).rev().collect();
        SessionRegistry { slots, free_ids: Mutex::new(free_ids) }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Draws an id from the pool and installs `build(id)` into its slot.
    /// Returns `None` when the registry is at capacity.
    pub fn insert_with(&self, build: impl FnOnce(u32) -> Session) -> Option<u32> {
        let id = self.free_ids.lock().unwrap().pop()?;
        let mut slot = self.slots[id as usize].lock().unwrap();
        debug_assert!(slot.is_none());
        *slot = Some(build(id));
        Some(id)
    }

    /// Removes a session, releasing its id back to the pool. Returns `true`
    /// if a session was actually present.
    pub fn remove(&self, session_id: u32) -> bool {
        let Some(slot) = self.slots.get(session_id as usize) else {
            return false;
        };
        let mut slot = slot.lock().unwrap();
        if slot.take().is_some() {
            self.free_ids.lock().unwrap().push(session_id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, session_id: u32) -> bool {
        self.slots
            .get(session_id as usize)
            .map(|slot| slot.lock().unwrap().is_some())
            .unwrap_or(false)
    }

    /// Runs `f` against the session at `session_id`, if present. The session
    /// is locked for the duration of the call, exclusive of the worker pool's
    /// per-tick access.
    pub fn with_session<R>(&self, session_id: u32, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let slot = self.slots.get(session_id as usize)?;
        let mut slot = slot.lock().unwrap();
        slot.as_mut().map(f)
    }

    /// Ids of every session with `round_running == true`, in slot order. This
    /// is the worklist the scheduler partitions across workers each tick.
    pub fn running_ids(&self) -> Vec<u32> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| {
                let guard = slot.lock().unwrap();
                guard.as_ref().filter(|s| s.is_round_running()).map(|_| id as u32)
            })
            .collect()
    }

    /// Drives `tick()` + `send_state()` for one session by id. Called by
    /// worker threads against ids handed out for the current tick.
    pub fn tick_session(&self, session_id: u32, tick_duration_ms: u64) {
        if let Some(slot) = self.slots.get(session_id as usize) {
            let mut guard = slot.lock().unwrap();
            if let Some(session) = guard.as_mut() {
                session.tick(tick_duration_ms);
                session.send_state();
            }
        }
    }

    /// Ids of every session that ended during the tick just completed (either
    /// because it was dispatched this tick and its round ended, or because it
    /// was freshly created and never ran). Used by the I/O thread's
    /// tick-epilogue to build round-result responses before freeing them.
    pub fn ended_among(&self, ids: &[u32]) -> Vec<u32> {
        ids.iter()
            .copied()
            .filter(|id| {
                self.slots[*id as usize]
                    .lock()
                    .unwrap()
                    .as_ref()
                    .map(|s| s.is_session_ended())
                    .unwrap_or(false)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientId;
    use crate::session::SessionConfig;
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

    fn make_session(id: u32) -> Session {
        let socket = Arc::new(std::net::UdpSocket::bind("127.0.0.1:0").unwrap());
        let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000);
        Session::new(id, ClientId::new(1), test_config(), socket, peer)
    }

    #[test]
    fn ids_are_unique_and_bounded() {
        let registry = SessionRegistry::new(4);
        let mut ids = Vec::new();
        for _ in 0..4 {
            ids.push(registry.insert_with(make_session).unwrap());
        }
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert!(registry.insert_with(make_session).is_none());
    }

    #[test]
    fn removed_id_is_reused() {
        let registry = SessionRegistry::new(2);
        let first = registry.insert_with(make_session).unwrap();
        assert!(registry.remove(first));
        let second = registry.insert_with(make_session).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn running_ids_reflects_round_state() {
        let registry = SessionRegistry::new(2);
        let id = registry.insert_with(make_session).unwrap();
        assert!(registry.running_ids().is_empty());
        registry.with_session(id, |s| s.begin_round());
        assert_eq!(registry.running_ids(), vec![id]);
    }

    #[test]
    fn remove_unknown_id_is_a_noop() {
        let registry = SessionRegistry::new(2);
        assert!(!registry.remove(41));
        assert!(!registry.contains(41));
    }
}
