//! Message envelope for host/player traffic.
//!
//! Every message crossing the room channel is wrapped in a [`Message`]:
//! a string kind tag, an opaque JSON payload, the sender, and a wall-clock
//! timestamp. Envelopes are immutable once sent; a broadcast is delivered
//! as an independent clone per recipient.

use chrono::{DateTime, Utc};

/// Opaque player identifier, unique within a room for the room's lifetime.
pub type PlayerId = String;

/// Engine-level message kinds. Game modules define their own kinds freely
/// (`quiz-question`, `word-submission`, ...); the engine never validates
/// module payload shapes.
pub mod kinds {
    pub const WELCOME: &str = "welcome";
    pub const GAME_START: &str = "game-start";
    pub const GAME_END: &str = "game-end";
    pub const PLAYER_CHANGE: &str = "player-change";
}

/// Who sent a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    /// The authoritative host endpoint.
    Host,
    /// A player controller.
    Player(PlayerId),
}

impl Sender {
    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host)
    }

    /// Player id, or `None` for the host sentinel.
    pub fn player_id(&self) -> Option<&str> {
        match self {
            Self::Host => None,
            Self::Player(id) => Some(id),
        }
    }
}

/// A single wire message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Kind tag (see [`kinds`] for the engine-level set).
    pub kind: String,

    /// Opaque structured payload, interpreted only by its consumer.
    pub data: serde_json::Value,

    /// Originating endpoint.
    pub sender: Sender,

    /// When the message was created.
    pub timestamp: DateTime<Utc>,

    /// Per-recipient delivery sequence, stamped by the router.
    pub seq: Option<u64>,
}

impl Message {
    /// Create a host-originated message.
    pub fn host(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            sender: Sender::Host,
            timestamp: Utc::now(),
            seq: None,
        }
    }

    /// Create a player-originated message.
    pub fn player(
        player_id: impl Into<PlayerId>,
        kind: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            kind: kind.into(),
            data,
            sender: Sender::Player(player_id.into()),
            timestamp: Utc::now(),
            seq: None,
        }
    }

    /// Convert to the wire-level JSON envelope.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "type": self.kind,
            "data": self.data,
            "sender": match &self.sender {
                Sender::Host => serde_json::json!("host"),
                Sender::Player(id) => serde_json::json!(id),
            },
            "timestamp": self.timestamp.to_rfc3339(),
        });
        if let Some(seq) = self.seq {
            obj["seq"] = serde_json::json!(seq);
        }
        obj
    }

    /// Parse a wire-level JSON envelope. Returns `None` for malformed input;
    /// callers drop such messages rather than failing the room.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let kind = value.get("type")?.as_str()?.to_string();
        let data = value.get("data").cloned().unwrap_or(serde_json::Value::Null);
        let sender = match value.get("sender")?.as_str()? {
            "host" => Sender::Host,
            id => Sender::Player(id.to_string()),
        };
        let timestamp = value
            .get("timestamp")
            .and_then(|t| t.as_str())
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))?;
        let seq = value.get("seq").and_then(|s| s.as_u64());
        Some(Self {
            kind,
            data,
            sender,
            timestamp,
            seq,
        })
    }
}
