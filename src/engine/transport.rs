//! Channel transport between one host and its player controllers.
//!
//! The engine only sees the [`ChannelTransport`] trait: an addressable,
//! best-effort pipe polled by the host. The concrete [`PollingTransport`]
//! models the original discovery substrate (a shared signal board polled on
//! an interval); a push-based socket transport could replace it without
//! touching the engine. Nothing here assumes signals arrive within a fixed
//! latency — a slower poll cadence only makes the room slower, never wrong.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use rand::Rng;

use super::message::{kinds, Message, PlayerId};

/// Why a join request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    /// The room is at its connected-player cap.
    RoomFull,
    /// No host is listening under that room code.
    RoomNotFound,
    /// The proposed id is already held by a live connection.
    DuplicateSession,
}

impl JoinError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoomFull => "room_full",
            Self::RoomNotFound => "room_not_found",
            Self::DuplicateSession => "duplicate_session",
        }
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoomFull => write!(f, "Room is full"),
            Self::RoomNotFound => write!(f, "Room not found"),
            Self::DuplicateSession => write!(f, "Player id already connected"),
        }
    }
}

impl std::error::Error for JoinError {}

/// Delivery failure at the transport level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// No open channel for that player.
    ChannelClosed(PlayerId),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelClosed(id) => write!(f, "Channel closed for player {}", id),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Events surfaced to the host by a poll.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A controller asked to join with a proposed id.
    JoinRequest {
        player_id: PlayerId,
        display_name: String,
    },
    /// A message from an admitted player.
    Inbound {
        player_id: PlayerId,
        message: Message,
    },
    /// Keepalive from a connected controller's poll loop; carries no
    /// payload, only refreshes liveness.
    Heartbeat { player_id: PlayerId },
    /// The controller signalled it is leaving.
    Disconnected { player_id: PlayerId },
}

/// Host answer to a join request. A rejection is an explicit reply so the
/// joining side can distinguish "deny" from "no response".
#[derive(Debug, Clone, PartialEq)]
pub enum JoinReply {
    Accepted { welcome: Message },
    Rejected { reason: JoinError },
}

/// Host-facing transport contract.
pub trait ChannelTransport {
    /// Drain pending signals and inbound messages for this room.
    fn poll(&mut self) -> Vec<TransportEvent>;

    /// Deliver one message to one player's channel.
    fn deliver(&mut self, player_id: &str, message: &Message) -> Result<(), DeliveryError>;

    /// Answer a pending join request.
    fn reply_join(&mut self, player_id: &str, reply: JoinReply);

    /// Close one player's channel.
    fn drop_player(&mut self, player_id: &str);

    /// Stop discovery for this room and release all channels.
    fn shutdown(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
enum Signal {
    JoinRequest {
        player_id: PlayerId,
        display_name: String,
    },
    Heartbeat {
        player_id: PlayerId,
    },
    Leave {
        player_id: PlayerId,
    },
}

/// Per-room mailboxes on the board.
#[derive(Debug, Default)]
struct RoomBox {
    signals: Vec<Signal>,
    to_host: Vec<Message>,
    to_player: HashMap<PlayerId, Vec<Message>>,
    join_replies: HashMap<PlayerId, JoinReply>,
}

#[derive(Debug, Default)]
struct BoardState {
    rooms: HashMap<String, RoomBox>,
}

/// Shared in-memory signal board — the discovery substrate both endpoints
/// poll. Rooms are isolated by code and torn down independently.
#[derive(Debug, Clone, Default)]
pub struct SignalBoard {
    inner: Arc<Mutex<BoardState>>,
}

impl SignalBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BoardState> {
        // Board state is plain data; a poisoned lock would mean a panic in
        // another holder, at which point the process is going down anyway.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a host is currently listening under this code.
    pub fn has_room(&self, room_code: &str) -> bool {
        self.lock().rooms.contains_key(room_code)
    }
}

/// Host endpoint bound to one room on a [`SignalBoard`].
#[derive(Debug)]
pub struct PollingTransport {
    board: SignalBoard,
    room_code: String,
    open: bool,
}

impl PollingTransport {
    /// Register a room on the board and start listening. Returns `None` if
    /// the code is already taken by another host.
    pub fn bind(board: &SignalBoard, room_code: impl Into<String>) -> Option<Self> {
        let room_code = room_code.into();
        let mut state = board.lock();
        if state.rooms.contains_key(&room_code) {
            return None;
        }
        state.rooms.insert(room_code.clone(), RoomBox::default());
        drop(state);
        Some(Self {
            board: board.clone(),
            room_code,
            open: true,
        })
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }
}

impl ChannelTransport for PollingTransport {
    fn poll(&mut self) -> Vec<TransportEvent> {
        if !self.open {
            return Vec::new();
        }
        let mut state = self.board.lock();
        let Some(room) = state.rooms.get_mut(&self.room_code) else {
            return Vec::new();
        };

        let mut events = Vec::new();
        for signal in room.signals.drain(..) {
            events.push(match signal {
                Signal::JoinRequest {
                    player_id,
                    display_name,
                } => TransportEvent::JoinRequest {
                    player_id,
                    display_name,
                },
                Signal::Heartbeat { player_id } => TransportEvent::Heartbeat { player_id },
                Signal::Leave { player_id } => TransportEvent::Disconnected { player_id },
            });
        }
        for message in room.to_host.drain(..) {
            if let Some(player_id) = message.sender.player_id() {
                events.push(TransportEvent::Inbound {
                    player_id: player_id.to_string(),
                    message: message.clone(),
                });
            }
        }
        events
    }

    fn deliver(&mut self, player_id: &str, message: &Message) -> Result<(), DeliveryError> {
        let mut state = self.board.lock();
        let mailbox = state
            .rooms
            .get_mut(&self.room_code)
            .and_then(|room| room.to_player.get_mut(player_id))
            .ok_or_else(|| DeliveryError::ChannelClosed(player_id.to_string()))?;
        mailbox.push(message.clone());
        Ok(())
    }

    fn reply_join(&mut self, player_id: &str, reply: JoinReply) {
        let mut state = self.board.lock();
        if let Some(room) = state.rooms.get_mut(&self.room_code) {
            if matches!(reply, JoinReply::Accepted { .. }) {
                // Open the player's channel so ordinary delivery works.
                room.to_player.entry(player_id.to_string()).or_default();
            }
            room.join_replies.insert(player_id.to_string(), reply);
        }
    }

    fn drop_player(&mut self, player_id: &str) {
        let mut state = self.board.lock();
        if let Some(room) = state.rooms.get_mut(&self.room_code) {
            room.to_player.remove(player_id);
        }
    }

    fn shutdown(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.board.lock().rooms.remove(&self.room_code);
    }
}

impl Drop for PollingTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Join handshake progress as seen by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinStatus {
    /// No reply yet; poll again.
    Pending,
    /// Admitted; the welcome message carries the room snapshot.
    Accepted { welcome: Message },
    /// Denied with a reason.
    Rejected { reason: JoinError },
}

/// Controller-side channel: posts a join request, then exchanges messages
/// with the host over the board.
#[derive(Debug)]
pub struct PlayerChannel {
    board: SignalBoard,
    room_code: String,
    player_id: PlayerId,
    display_name: String,
    joined: bool,
    connected: bool,
}

impl PlayerChannel {
    /// Post a join request for `room_code`. Fails immediately with
    /// `RoomNotFound` when no host is listening under that code.
    pub fn connect(
        board: &SignalBoard,
        room_code: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<Self, JoinError> {
        let room_code = room_code.into();
        let display_name = display_name.into();
        let player_id = generate_player_id();
        let mut channel = Self {
            board: board.clone(),
            room_code,
            player_id,
            display_name,
            joined: false,
            connected: false,
        };
        channel.post_join_request()?;
        Ok(channel)
    }

    /// Resume with a previously assigned id (reconnect after a drop).
    pub fn resume(
        board: &SignalBoard,
        room_code: impl Into<String>,
        player_id: impl Into<PlayerId>,
        display_name: impl Into<String>,
    ) -> Result<Self, JoinError> {
        let mut channel = Self {
            board: board.clone(),
            room_code: room_code.into(),
            player_id: player_id.into(),
            display_name: display_name.into(),
            joined: false,
            connected: false,
        };
        channel.post_join_request()?;
        Ok(channel)
    }

    fn post_join_request(&mut self) -> Result<(), JoinError> {
        let mut state = self.board.lock();
        let room = state
            .rooms
            .get_mut(&self.room_code)
            .ok_or(JoinError::RoomNotFound)?;
        room.signals.push(Signal::JoinRequest {
            player_id: self.player_id.clone(),
            display_name: self.display_name.clone(),
        });
        Ok(())
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Check for the host's answer to the join request.
    pub fn poll_join(&mut self) -> JoinStatus {
        if self.joined {
            if let Some(welcome) = self.take_welcome() {
                return JoinStatus::Accepted { welcome };
            }
            return JoinStatus::Pending;
        }
        let mut state = self.board.lock();
        let Some(room) = state.rooms.get_mut(&self.room_code) else {
            return JoinStatus::Rejected {
                reason: JoinError::RoomNotFound,
            };
        };
        match room.join_replies.remove(&self.player_id) {
            Some(JoinReply::Accepted { welcome }) => {
                self.joined = true;
                self.connected = true;
                JoinStatus::Accepted { welcome }
            }
            Some(JoinReply::Rejected { reason }) => JoinStatus::Rejected { reason },
            None => JoinStatus::Pending,
        }
    }

    fn take_welcome(&mut self) -> Option<Message> {
        let mut state = self.board.lock();
        let reply = state
            .rooms
            .get_mut(&self.room_code)?
            .join_replies
            .remove(&self.player_id)?;
        match reply {
            JoinReply::Accepted { welcome } => Some(welcome),
            JoinReply::Rejected { .. } => None,
        }
    }

    /// Send a message up to the host.
    pub fn send(&mut self, kind: impl Into<String>, data: serde_json::Value) {
        if !self.connected {
            return;
        }
        let message = Message::player(self.player_id.clone(), kind, data);
        let mut state = self.board.lock();
        if let Some(room) = state.rooms.get_mut(&self.room_code) {
            room.to_host.push(message);
        }
    }

    /// Drain messages addressed to this player, in delivery order. Each
    /// poll from a connected channel also posts a keepalive heartbeat, so
    /// a silent-but-polling controller never trips the liveness timeout.
    pub fn poll_messages(&mut self) -> Vec<Message> {
        let mut state = self.board.lock();
        let Some(room) = state.rooms.get_mut(&self.room_code) else {
            self.connected = false;
            return Vec::new();
        };
        let inbox: Vec<Message> = match room.to_player.get_mut(&self.player_id) {
            Some(mailbox) => mailbox.drain(..).collect(),
            None => {
                // Channel was dropped by the host.
                if self.joined {
                    self.connected = false;
                }
                Vec::new()
            }
        };
        if self.connected {
            room.signals.push(Signal::Heartbeat {
                player_id: self.player_id.clone(),
            });
        }
        inbox
    }

    /// Leave the room explicitly.
    pub fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        let mut state = self.board.lock();
        if let Some(room) = state.rooms.get_mut(&self.room_code) {
            room.signals.push(Signal::Leave {
                player_id: self.player_id.clone(),
            });
        }
    }
}

/// Generate a controller-proposed player id: millisecond epoch plus a short
/// random suffix, opaque to everything downstream.
fn generate_player_id() -> PlayerId {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("player-{}-{:06}", millis, suffix)
}

/// Welcome payload helper used by the host when accepting a join.
pub fn welcome_message(room_code: &str, payload: serde_json::Value) -> Message {
    let mut data = serde_json::json!({ "room": room_code });
    if let (Some(obj), Some(extra)) = (data.as_object_mut(), payload.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
    Message::host(kinds::WELCOME, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_is_exclusive() {
        let board = SignalBoard::new();
        let first = PollingTransport::bind(&board, "ABC123").unwrap();
        assert!(PollingTransport::bind(&board, "ABC123").is_none());
        drop(first);
        // Code is free again after shutdown.
        assert!(PollingTransport::bind(&board, "ABC123").is_some());
    }

    #[test]
    fn test_join_handshake() {
        let board = SignalBoard::new();
        let mut host = PollingTransport::bind(&board, "ABC123").unwrap();
        let mut player = PlayerChannel::connect(&board, "ABC123", "Ana").unwrap();

        assert_eq!(player.poll_join(), JoinStatus::Pending);

        let events = host.poll();
        assert_eq!(events.len(), 1);
        let TransportEvent::JoinRequest { player_id, display_name } = &events[0] else {
            panic!("expected join request");
        };
        assert_eq!(display_name, "Ana");
        assert_eq!(player_id, player.player_id());

        host.reply_join(
            player_id,
            JoinReply::Accepted {
                welcome: welcome_message("ABC123", serde_json::json!({})),
            },
        );

        let JoinStatus::Accepted { welcome } = player.poll_join() else {
            panic!("expected acceptance");
        };
        assert_eq!(welcome.kind, kinds::WELCOME);
        assert!(player.is_connected());
    }

    #[test]
    fn test_join_unknown_room() {
        let board = SignalBoard::new();
        let result = PlayerChannel::connect(&board, "NOPE", "Ana");
        assert_eq!(result.err(), Some(JoinError::RoomNotFound));
    }

    #[test]
    fn test_rejection_is_distinguishable() {
        let board = SignalBoard::new();
        let mut host = PollingTransport::bind(&board, "ABC123").unwrap();
        let mut player = PlayerChannel::connect(&board, "ABC123", "Ana").unwrap();

        let events = host.poll();
        let TransportEvent::JoinRequest { player_id, .. } = &events[0] else {
            panic!("expected join request");
        };
        host.reply_join(
            player_id,
            JoinReply::Rejected {
                reason: JoinError::RoomFull,
            },
        );

        assert_eq!(
            player.poll_join(),
            JoinStatus::Rejected {
                reason: JoinError::RoomFull
            }
        );
        assert!(!player.is_connected());
    }

    #[test]
    fn test_message_exchange() {
        let board = SignalBoard::new();
        let mut host = PollingTransport::bind(&board, "ABC123").unwrap();
        let mut player = PlayerChannel::connect(&board, "ABC123", "Ana").unwrap();

        let events = host.poll();
        let TransportEvent::JoinRequest { player_id, .. } = events[0].clone() else {
            panic!("expected join request");
        };
        host.reply_join(
            &player_id,
            JoinReply::Accepted {
                welcome: welcome_message("ABC123", serde_json::json!({})),
            },
        );
        player.poll_join();

        // Host to player.
        host.deliver(&player_id, &Message::host("game-start", serde_json::json!({})))
            .unwrap();
        let inbox = player.poll_messages();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, "game-start");

        // Player to host.
        player.send("quiz-answer", serde_json::json!({"answer": 1}));
        let events = host.poll();
        assert!(events.iter().any(|e| matches!(
            e,
            TransportEvent::Inbound { message, .. } if message.kind == "quiz-answer"
        )));
    }

    #[test]
    fn test_poll_emits_heartbeat_while_connected() {
        let board = SignalBoard::new();
        let mut host = PollingTransport::bind(&board, "ABC123").unwrap();
        let mut player = PlayerChannel::connect(&board, "ABC123", "Ana").unwrap();

        // Not yet admitted: polling stays silent.
        player.poll_messages();
        let events = host.poll();
        assert!(!events
            .iter()
            .any(|e| matches!(e, TransportEvent::Heartbeat { .. })));
        let TransportEvent::JoinRequest { player_id, .. } = events[0].clone() else {
            panic!("expected join request");
        };
        host.reply_join(
            &player_id,
            JoinReply::Accepted {
                welcome: welcome_message("ABC123", serde_json::json!({})),
            },
        );
        player.poll_join();

        // An idle poll from a connected channel keeps liveness fresh.
        player.poll_messages();
        assert_eq!(
            host.poll(),
            vec![TransportEvent::Heartbeat {
                player_id: player_id.clone()
            }]
        );
    }

    #[test]
    fn test_deliver_to_closed_channel_fails() {
        let board = SignalBoard::new();
        let mut host = PollingTransport::bind(&board, "ABC123").unwrap();
        let err = host.deliver("ghost", &Message::host("x", serde_json::json!({})));
        assert!(matches!(err, Err(DeliveryError::ChannelClosed(_))));
    }

    #[test]
    fn test_leave_signal() {
        let board = SignalBoard::new();
        let mut host = PollingTransport::bind(&board, "ABC123").unwrap();
        let mut player = PlayerChannel::connect(&board, "ABC123", "Ana").unwrap();

        let events = host.poll();
        let TransportEvent::JoinRequest { player_id, .. } = events[0].clone() else {
            panic!("expected join request");
        };
        host.reply_join(
            &player_id,
            JoinReply::Accepted {
                welcome: welcome_message("ABC123", serde_json::json!({})),
            },
        );
        player.poll_join();
        player.disconnect();

        let events = host.poll();
        assert_eq!(
            events,
            vec![TransportEvent::Disconnected {
                player_id: player_id.clone()
            }]
        );
    }

    #[test]
    fn test_shutdown_removes_room() {
        let board = SignalBoard::new();
        let mut host = PollingTransport::bind(&board, "ABC123").unwrap();
        assert!(board.has_room("ABC123"));
        host.shutdown();
        assert!(!board.has_room("ABC123"));
        assert_eq!(
            PlayerChannel::connect(&board, "ABC123", "Ana").err(),
            Some(JoinError::RoomNotFound)
        );
    }
}
