//! Connection registry: player identity, liveness, and join lifecycle.
//!
//! One registry per room. Player records are created on admission and
//! retained after a disconnect (scores survive drops) until the room is
//! torn down. The capacity policy lives here rather than in the transport
//! so it can be tested independently.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::message::PlayerId;
use super::transport::JoinError;

/// Default connected-player cap per room.
pub const DEFAULT_MAX_PLAYERS: usize = 8;

/// Default liveness threshold: no signal for this long marks a player
/// disconnected.
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Window in which a repeated join request for a connected id is treated as
/// duplicate delivery of the same logical join, not a second session.
pub const DEFAULT_DEDUPE_WINDOW: Duration = Duration::from_secs(10);

/// A player record within a room.
#[derive(Debug, Clone)]
pub struct Player {
    /// Opaque id, unique within the room for its lifetime.
    pub id: PlayerId,

    /// Name shown on the shared screen.
    pub display_name: String,

    /// Whether the controller currently has a live channel.
    pub connected: bool,

    /// Accumulated score; survives disconnects.
    pub score: u32,

    /// When the player was first admitted.
    pub joined_at: DateTime<Utc>,

    /// Last signal observed from this controller.
    pub last_seen: Instant,
}

impl Player {
    fn new(id: PlayerId, display_name: String) -> Self {
        Self {
            id,
            display_name,
            connected: true,
            score: 0,
            joined_at: Utc::now(),
            last_seen: Instant::now(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "name": self.display_name,
            "connected": self.connected,
            "score": self.score,
        })
    }
}

/// How an admission request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A new record was created.
    New,
    /// Duplicate delivery of a join already admitted; no new record.
    Duplicate,
    /// A disconnected record was revived with its score intact.
    Resumed,
}

/// Tracks all players of one room, ordered by join time.
#[derive(Debug)]
pub struct ConnectionRegistry {
    players: HashMap<PlayerId, Player>,
    join_order: Vec<PlayerId>,
    max_players: usize,
    dedupe_window: Duration,
}

impl ConnectionRegistry {
    pub fn new(max_players: usize) -> Self {
        Self {
            players: HashMap::new(),
            join_order: Vec::new(),
            max_players,
            dedupe_window: DEFAULT_DEDUPE_WINDOW,
        }
    }

    pub fn with_dedupe_window(mut self, window: Duration) -> Self {
        self.dedupe_window = window;
        self
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    /// Admit a player by proposed id.
    ///
    /// Idempotent for an id that is already connected and was seen within
    /// the dedupe window. A connected id outside that window is a second
    /// session and is rejected; a disconnected id is resumed with the same
    /// identity and score, provided a seat is free — reviving a record
    /// counts against the connected cap like any other join. Over-cap
    /// joins are rejected, never queued, and create no record.
    pub fn admit(
        &mut self,
        proposed_id: &str,
        display_name: &str,
    ) -> Result<Admission, JoinError> {
        let connected_now = self.connected_count();
        if let Some(player) = self.players.get_mut(proposed_id) {
            if player.connected {
                if player.last_seen.elapsed() <= self.dedupe_window {
                    player.last_seen = Instant::now();
                    return Ok(Admission::Duplicate);
                }
                return Err(JoinError::DuplicateSession);
            }
            if connected_now >= self.max_players {
                return Err(JoinError::RoomFull);
            }
            // Reconnect: never merged with a different identity, the record
            // is revived as-is apart from the display name.
            player.connected = true;
            player.display_name = display_name.to_string();
            player.last_seen = Instant::now();
            tracing::info!(player = proposed_id, "player resumed");
            return Ok(Admission::Resumed);
        }

        if connected_now >= self.max_players {
            return Err(JoinError::RoomFull);
        }

        self.players.insert(
            proposed_id.to_string(),
            Player::new(proposed_id.to_string(), display_name.to_string()),
        );
        self.join_order.push(proposed_id.to_string());
        tracing::info!(player = proposed_id, name = display_name, "player admitted");
        Ok(Admission::New)
    }

    /// Record a fresh signal from a player.
    pub fn touch(&mut self, player_id: &str) {
        if let Some(player) = self.players.get_mut(player_id) {
            player.last_seen = Instant::now();
        }
    }

    /// Flip a player to disconnected. Idempotent; both the explicit leave
    /// signal and the liveness timeout converge here. Returns whether the
    /// state actually changed.
    pub fn mark_disconnected(&mut self, player_id: &str) -> bool {
        match self.players.get_mut(player_id) {
            Some(player) if player.connected => {
                player.connected = false;
                tracing::info!(player = player_id, "player disconnected");
                true
            }
            _ => false,
        }
    }

    /// Disconnect every player whose last signal is older than `timeout`.
    /// Returns the ids that changed state.
    pub fn expire_stale(&mut self, timeout: Duration) -> Vec<PlayerId> {
        let stale: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| p.connected && p.last_seen.elapsed() > timeout)
            .map(|p| p.id.clone())
            .collect();
        for id in &stale {
            self.mark_disconnected(id);
        }
        stale
    }

    pub fn get(&self, player_id: &str) -> Option<&Player> {
        self.players.get(player_id)
    }

    pub fn get_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.get_mut(player_id)
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    pub fn is_connected(&self, player_id: &str) -> bool {
        self.players.get(player_id).is_some_and(|p| p.connected)
    }

    /// Snapshot of all players in join order. Readers get copies, never a
    /// live handle.
    pub fn snapshot(&self) -> Vec<Player> {
        self.join_order
            .iter()
            .filter_map(|id| self.players.get(id))
            .cloned()
            .collect()
    }

    /// Ids of currently connected players, in join order.
    pub fn connected_ids(&self) -> Vec<PlayerId> {
        self.join_order
            .iter()
            .filter(|id| self.is_connected(id))
            .cloned()
            .collect()
    }

    /// All ids in join order, connected or not.
    pub fn all_ids(&self) -> Vec<PlayerId> {
        self.join_order.clone()
    }

    pub fn connected_count(&self) -> usize {
        self.players.values().filter(|p| p.connected).count()
    }

    pub fn count(&self) -> usize {
        self.players.len()
    }

    /// Release every record (room teardown).
    pub fn clear(&mut self) {
        self.players.clear();
        self.join_order.clear();
    }

    pub fn to_json(&self) -> serde_json::Value {
        let players: Vec<serde_json::Value> =
            self.snapshot().iter().map(|p| p.to_json()).collect();
        serde_json::Value::Array(players)
    }
}
