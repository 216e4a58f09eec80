//! Message router: the host's send surface and the serialization point for
//! everything that crosses the room channel.
//!
//! Broadcast fans out to each connected player independently — one failed
//! delivery never blocks the rest. Per-player order is preserved by a
//! per-player sequence counter stamped into each delivered envelope; no
//! order is guaranteed across different players. Routing never mutates
//! session or player state, it only forwards.

use std::collections::HashMap;
use std::fmt;

use super::message::{Message, PlayerId};
use super::registry::ConnectionRegistry;
use super::transport::{ChannelTransport, DeliveryError, JoinReply, TransportEvent};

/// Routing failure surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// Unicast target is unknown or not connected at send time. Messages
    /// are not queued for later delivery; resynchronization on reconnect is
    /// the game module's responsibility.
    UnknownRecipient(PlayerId),
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRecipient(id) => write!(f, "Unknown recipient: {}", id),
        }
    }
}

impl std::error::Error for RouteError {}

/// Host-facing unicast/broadcast API over a [`ChannelTransport`].
pub struct MessageRouter {
    transport: Box<dyn ChannelTransport>,
    send_seq: HashMap<PlayerId, u64>,
}

impl MessageRouter {
    pub fn new(transport: Box<dyn ChannelTransport>) -> Self {
        Self {
            transport,
            send_seq: HashMap::new(),
        }
    }

    /// Deliver to every currently connected player, independently. Returns
    /// the per-player failures; an empty vec means full delivery.
    pub fn broadcast(
        &mut self,
        registry: &ConnectionRegistry,
        message: &Message,
    ) -> Vec<(PlayerId, DeliveryError)> {
        let mut failures = Vec::new();
        for player_id in registry.connected_ids() {
            if let Err(err) = self.deliver_sequenced(&player_id, message) {
                tracing::warn!(player = %player_id, error = %err, "broadcast delivery failed");
                failures.push((player_id, err));
            }
        }
        failures
    }

    /// Deliver to exactly one connected player.
    pub fn unicast(
        &mut self,
        registry: &ConnectionRegistry,
        player_id: &str,
        message: &Message,
    ) -> Result<(), RouteError> {
        if !registry.is_connected(player_id) {
            return Err(RouteError::UnknownRecipient(player_id.to_string()));
        }
        self.deliver_sequenced(player_id, message)
            .map_err(|_| RouteError::UnknownRecipient(player_id.to_string()))
    }

    /// Stamp the per-player sequence and hand the clone to the transport.
    fn deliver_sequenced(
        &mut self,
        player_id: &str,
        message: &Message,
    ) -> Result<(), DeliveryError> {
        let seq = self
            .send_seq
            .entry(player_id.to_string())
            .and_modify(|s| *s += 1)
            .or_insert(1);
        let mut clone = message.clone();
        clone.seq = Some(*seq);
        self.transport.deliver(player_id, &clone)
    }

    /// Drain transport events for the room loop.
    pub fn poll(&mut self) -> Vec<TransportEvent> {
        self.transport.poll()
    }

    /// Answer a pending join request.
    pub fn reply_join(&mut self, player_id: &str, reply: JoinReply) {
        self.transport.reply_join(player_id, reply);
    }

    /// Close one player's channel and forget its sequence counter. The
    /// counter restarts on reconnect; ordering is per channel lifetime.
    pub fn drop_player(&mut self, player_id: &str) {
        self.send_seq.remove(player_id);
        self.transport.drop_player(player_id);
    }

    /// Stop the underlying discovery loop (room teardown).
    pub fn shutdown(&mut self) {
        self.transport.shutdown();
    }
}

impl fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRouter")
            .field("send_seq", &self.send_seq)
            .finish_non_exhaustive()
    }
}
