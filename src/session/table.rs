//! The session registry (§3 "Global state", §9 "Parallel arrays").
//!
//! The source keeps `sessions[]`/`pfds[]` as two arrays indexed by the same
//! position, with a session's `sidx[d]` recording which position its
//! direction-`d` descriptor lives at, and compacts both in lockstep when a
//! session is torn down. This rewrite keeps the *invariant* — every live
//! socket maps back to exactly one `(session, direction)` pair in O(1) — but
//! gets it by construction instead of upkeep: each session lives in one
//! slab slot, and its four sockets (two directions × primary/twin) are
//! registered with `mio::Poll` under a `Token` that encodes the slot index
//! and which socket it is. Decoding a readiness event is then a pure
//! function of the token, so there is nothing to keep in sync by hand.
//!
//! `Token(0)` is reserved for the control channel, matching `pfds[0]` in the
//! source.

use std::collections::HashMap;

use mio::{Interest, Registry, Token};

use crate::error::Result;
use crate::session::session::{Session, Side};

pub const CONTROL_TOKEN: Token = Token(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Part {
    Primary(Side),
    Twin(Side),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub usize);

fn encode_token(slot: usize, part: Part) -> Token {
    let part_bits = match part {
        Part::Primary(Side::Callee) => 0,
        Part::Primary(Side::Caller) => 1,
        Part::Twin(Side::Callee) => 2,
        Part::Twin(Side::Caller) => 3,
    };
    Token(1 + (slot << 2) + part_bits)
}

pub fn decode_token(token: Token) -> Option<(SessionId, Part)> {
    if token == CONTROL_TOKEN {
        return None;
    }
    let raw = token.0 - 1;
    let slot = raw >> 2;
    let part = match raw & 0b11 {
        0 => Part::Primary(Side::Callee),
        1 => Part::Primary(Side::Caller),
        2 => Part::Twin(Side::Callee),
        _ => Part::Twin(Side::Caller),
    };
    Some((SessionId(slot), part))
}

/// Result of a tag comparison (`compare_session_tags`, §4.1): no match, an
/// exact match, or a prefix match that also yields the medianum suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMatch {
    None,
    Exact,
    Prefix(Option<u32>),
}

pub fn compare_session_tags(session_tag: &str, needle: &str) -> TagMatch {
    if session_tag == needle {
        return TagMatch::Exact;
    }
    if let Some(rest) = session_tag.strip_prefix(needle) {
        if let Some(digits) = rest.strip_prefix(';') {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                return TagMatch::Prefix(digits.parse().ok());
            }
        }
    }
    TagMatch::None
}

pub struct SessionTable {
    slots: Vec<Option<Session>>,
    free: Vec<usize>,
    live_count: usize,
    /// Sessions with at least one active player (§4.3); holes are left in
    /// place and compacted lazily by the player scheduler's walk.
    pub rtp_servers: Vec<Option<SessionId>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live_count: 0,
            rtp_servers: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.live_count
    }

    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    pub fn insert(&mut self, mut session: Session, registry: &Registry) -> Result<SessionId> {
        let slot = match self.free.pop() {
            Some(i) => i,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };

        for side in [Side::Callee, Side::Caller] {
            if let Some(sock) = session.dirs[side.index()].socket.as_mut() {
                registry.register(sock, encode_token(slot, Part::Primary(side)), Interest::READABLE)?;
            }
            if let Some(sock) = session.rtcp.dirs[side.index()].socket.as_mut() {
                registry.register(sock, encode_token(slot, Part::Twin(side)), Interest::READABLE)?;
            }
        }

        self.slots[slot] = Some(session);
        self.live_count += 1;
        Ok(SessionId(slot))
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.slots.get(id.0).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.slots.get_mut(id.0).and_then(|s| s.as_mut())
    }

    /// Tear down a session: deregister its four sockets, clear its slot and
    /// scrub any `rtp_servers[]` reference (a hole compacted on the next
    /// scheduler walk).
    pub fn remove(&mut self, id: SessionId, registry: &Registry) {
        let Some(slot) = self.slots.get_mut(id.0) else { return };
        let Some(mut session) = slot.take() else { return };

        for side in [Side::Callee, Side::Caller] {
            if let Some(sock) = session.dirs[side.index()].socket.as_mut() {
                let _ = registry.deregister(sock);
            }
            if let Some(sock) = session.rtcp.dirs[side.index()].socket.as_mut() {
                let _ = registry.deregister(sock);
            }
        }

        self.free.push(id.0);
        self.live_count -= 1;

        for entry in self.rtp_servers.iter_mut() {
            if *entry == Some(id) {
                *entry = None;
            }
        }
    }

    pub fn register_player(&mut self, id: SessionId) {
        if self.rtp_servers.iter().flatten().any(|&x| x == id) {
            return;
        }
        if let Some(hole) = self.rtp_servers.iter_mut().find(|e| e.is_none()) {
            *hole = Some(id);
        } else {
            self.rtp_servers.push(Some(id));
        }
    }

    /// All primary session ids, for the TTL reaper's per-tick sweep.
    pub fn iter_ids(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| SessionId(i)))
    }

    /// Find the session matching `call_id` and `needle` tag, returning the
    /// direction the matching field identifies and whether that field was
    /// the stored from-tag or to-tag (§4.1: matching `from_tag` selects
    /// direction `(request ? 0 : 1)`; matching `to_tag` selects the
    /// opposite).
    pub fn find_for_verb(
        &self,
        call_id: &str,
        needle: &str,
        is_request: bool,
    ) -> Option<(SessionId, Side, TagMatch)> {
        let mut prefix_fallback = None;
        for (i, slot) in self.slots.iter().enumerate() {
            let Some(session) = slot else { continue };
            if session.call_id != call_id {
                continue;
            }
            let from_match = compare_session_tags(&session.tags[0], needle);
            if from_match == TagMatch::Exact {
                return Some((SessionId(i), Side::from_index(if is_request { 0 } else { 1 }), from_match));
            }
            if !session.tags[1].is_empty() {
                let to_match = compare_session_tags(&session.tags[1], needle);
                if to_match == TagMatch::Exact {
                    return Some((SessionId(i), Side::from_index(if is_request { 1 } else { 0 }), to_match));
                }
                if matches!(to_match, TagMatch::Prefix(_)) && prefix_fallback.is_none() {
                    prefix_fallback = Some((SessionId(i), Side::from_index(if is_request { 1 } else { 0 }), to_match));
                }
            }
            if matches!(from_match, TagMatch::Prefix(_)) && prefix_fallback.is_none() {
                prefix_fallback = Some((SessionId(i), Side::from_index(if is_request { 0 } else { 1 }), from_match));
            }
        }
        prefix_fallback
    }

    /// All sessions whose call_id+from_tag (or to_tag) match `needle`
    /// exactly or by medianum-prefix; used by `D` to delete every media
    /// stream sharing a tag prefix (§4.1, §9 open question).
    pub fn find_all_matching(&self, call_id: &str, needle: &str) -> Vec<SessionId> {
        let mut out = HashMap::new();
        for (i, slot) in self.slots.iter().enumerate() {
            let Some(session) = slot else { continue };
            if session.call_id != call_id {
                continue;
            }
            let hit = compare_session_tags(&session.tags[0], needle) != TagMatch::None
                || (!session.tags[1].is_empty()
                    && compare_session_tags(&session.tags[1], needle) != TagMatch::None);
            if hit {
                out.insert(i, SessionId(i));
            }
        }
        out.into_values().collect()
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_match_exact() {
        assert_eq!(compare_session_tags("tagA", "tagA"), TagMatch::Exact);
    }

    #[test]
    fn tag_match_prefix_with_medianum() {
        assert_eq!(compare_session_tags("tagA;2", "tagA"), TagMatch::Prefix(Some(2)));
    }

    #[test]
    fn tag_match_none() {
        assert_eq!(compare_session_tags("tagB", "tagA"), TagMatch::None);
        assert_eq!(compare_session_tags("tagAx", "tagA"), TagMatch::None);
    }

    #[test]
    fn token_roundtrip() {
        for slot in [0usize, 1, 42, 9999] {
            for part in [
                Part::Primary(Side::Callee),
                Part::Primary(Side::Caller),
                Part::Twin(Side::Callee),
                Part::Twin(Side::Caller),
            ] {
                let token = encode_token(slot, part);
                assert_ne!(token, CONTROL_TOKEN);
                assert_eq!(decode_token(token), Some((SessionId(slot), part)));
            }
        }
    }

    #[test]
    fn control_token_decodes_to_none() {
        assert_eq!(decode_token(CONTROL_TOKEN), None);
    }
}
