use std::time::{Duration, Instant};

use wanderlore_protocol::{PlayerEntry, RosterSnapshot};

/// Outcome of applying a position report to the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
    /// The report carried a sequence number older than the last applied
    /// one and was dropped.
    Stale,
}

/// A live player entry.
#[derive(Debug, Clone)]
pub struct PlayerRecord {
    pub username: String,
    pub pos_x: f32,
    pub pos_y: f32,
    pub seq: u64,
    pub last_seen: Instant,
}

/// The shared world roster: at most one record per username, insertion
/// ordered.
///
/// Owned exclusively by the synchronizer task. Everything else reaches it
/// through `RosterCommand`s, so no lock is needed.
#[derive(Debug, Default)]
pub struct Roster {
    players: Vec<PlayerRecord>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Apply a position report: update the matching record in place or
    /// append a new one. Reports with a sequence number strictly older
    /// than the last applied are dropped; a record left by a dead session
    /// keeps enforcing its last seq until the sweep evicts it, so senders
    /// seed their counters from the wall clock rather than zero.
    pub fn upsert(
        &mut self,
        username: &str,
        pos_x: f32,
        pos_y: f32,
        seq: u64,
        now: Instant,
    ) -> Upsert {
        if let Some(player) = self.players.iter_mut().find(|p| p.username == username) {
            if seq < player.seq {
                return Upsert::Stale;
            }
            player.pos_x = pos_x;
            player.pos_y = pos_y;
            player.seq = seq;
            player.last_seen = now;
            return Upsert::Updated;
        }

        self.players.push(PlayerRecord {
            username: username.to_string(),
            pos_x,
            pos_y,
            seq,
            last_seen: now,
        });
        Upsert::Inserted
    }

    /// Remove the record for `username`; false when it was absent.
    pub fn remove(&mut self, username: &str) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p.username != username);
        self.players.len() != before
    }

    /// Drop records not heard from for longer than `max_age`, returning
    /// the evicted usernames. `now` is passed in so sweeps are testable.
    pub fn evict_stale(&mut self, max_age: Duration, now: Instant) -> Vec<String> {
        let mut evicted = Vec::new();
        self.players.retain(|p| {
            if now.duration_since(p.last_seen) > max_age {
                evicted.push(p.username.clone());
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Build the full-roster reply, in insertion order.
    pub fn snapshot(&self) -> RosterSnapshot {
        RosterSnapshot {
            num_players: self.players.len(),
            players: self
                .players
                .iter()
                .map(|p| PlayerEntry {
                    username: p.username.clone(),
                    pos_x: p.pos_x,
                    pos_y: p.pos_y,
                })
                .collect(),
        }
    }
}
