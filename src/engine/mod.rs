//! Room session engine.
//!
//! Everything a room needs between "host opens a lobby" and "final ranking
//! on screen": the channel transport, player registry, message router, and
//! the per-room game session state machine. Game rules live in
//! [`crate::games`]; this module is rule-agnostic.
//!
//! ```text
//!                    ┌──────────────────────── Room ───────────────────────┐
//! PlayerChannel ───▶ │ transport ──▶ router ──▶ registry ──▶ session      │
//!  (controller)      │     ▲            │                        │         │
//!                    │     └── deliver ─┴──── GameModule hooks ──┘         │
//!                    └──────────────────────────────────────────────────────┘
//! ```
//!
//! The host drives a [`room::Room`] with `tick()` (pump the channel) and
//! `tick_second()` (advance countdowns). Nothing here spawns threads; all
//! state changes happen on the caller's thread in a deterministic order.

pub mod message;
pub mod registry;
pub mod room;
pub mod router;
pub mod session;
pub mod transport;

pub use message::{Message, PlayerId, Sender};
pub use registry::{Admission, ConnectionRegistry, Player};
pub use room::{Room, RoomConfig, RoomManager};
pub use router::{MessageRouter, RouteError};
pub use session::{GameSession, InvalidTransition, Phase};
pub use transport::{
    ChannelTransport, DeliveryError, JoinError, JoinReply, JoinStatus, PlayerChannel,
    PollingTransport, SignalBoard, TransportEvent,
};
