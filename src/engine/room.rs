//! Room lifecycle and the host-side drive loop.
//!
//! A [`Room`] owns one connection registry, one message router (and through
//! it the transport), and at most one active game session + module. All
//! game-state mutation happens on the host's thread through `tick` /
//! `tick_second`; inbound traffic is serialized here before it touches any
//! shared state.
//!
//! [`RoomManager`] is an arena of rooms keyed by their short code — rooms
//! are isolated instances, never process-wide singletons, and tear down
//! independently.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;

use super::message::{kinds, Message, PlayerId};
use super::registry::{
    Admission, ConnectionRegistry, Player, DEFAULT_DEDUPE_WINDOW, DEFAULT_LIVENESS_TIMEOUT,
    DEFAULT_MAX_PLAYERS,
};
use super::router::MessageRouter;
use super::session::{
    GameSession, InvalidTransition, NextRound, Phase, TimerTick, DEFAULT_RESULTS_DELAY_SECS,
};
use super::transport::{
    welcome_message, ChannelTransport, JoinReply, PollingTransport, SignalBoard, TransportEvent,
};
use crate::games::{EngineRequest, GameModule, ModuleContext, RoundOutcome};

/// Length of generated room codes.
const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Per-room policy knobs.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Connected-player cap; joins beyond it are rejected, not queued.
    pub max_players: usize,

    /// Room-level floor on players needed to start (modules may require
    /// more).
    pub min_players: usize,

    /// No signal for this long marks a player disconnected.
    pub liveness_timeout: Duration,

    /// Window in which a repeated join for the same id is duplicate
    /// delivery, not a second session.
    pub dedupe_window: Duration,

    /// Results-display window between rounds, in seconds.
    pub results_delay_secs: u32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_players: DEFAULT_MAX_PLAYERS,
            min_players: 2,
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            dedupe_window: DEFAULT_DEDUPE_WINDOW,
            results_delay_secs: DEFAULT_RESULTS_DELAY_SECS,
        }
    }
}

/// One isolated game room: a host, its players, and at most one session.
pub struct Room {
    code: String,
    config: RoomConfig,
    registry: ConnectionRegistry,
    router: MessageRouter,
    session: Option<GameSession>,
    module: Option<Box<dyn GameModule>>,
    closed: bool,
}

impl Room {
    pub fn new(
        code: impl Into<String>,
        config: RoomConfig,
        transport: Box<dyn ChannelTransport>,
    ) -> Self {
        let registry = ConnectionRegistry::new(config.max_players)
            .with_dedupe_window(config.dedupe_window);
        Self {
            code: code.into(),
            config,
            registry,
            router: MessageRouter::new(transport),
            session: None,
            module: None,
            closed: false,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Snapshot of the player list for the display collaborator.
    pub fn players(&self) -> Vec<Player> {
        self.registry.snapshot()
    }

    pub fn connected_count(&self) -> usize {
        self.registry.connected_count()
    }

    /// Current session phase, if a session is active.
    pub fn phase(&self) -> Option<Phase> {
        self.session.as_ref().map(|s| s.phase())
    }

    /// Whose turn it is, for turn-based games on the shared screen.
    pub fn active_player(&self) -> Option<PlayerId> {
        self.session.as_ref().and_then(|s| s.active_player().cloned())
    }

    /// Read-only JSON view for rendering: `{room, players, session}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "room": self.code,
            "players": self.registry.to_json(),
            "session": self.session.as_ref().map(|s| s.to_json()),
        })
    }

    /// Drain the discovery/poll substrate: admit or reject joins, dispatch
    /// inbound player messages, and converge disconnects. Call as often as
    /// the poll cadence allows; correctness does not depend on the rate.
    pub fn tick(&mut self) {
        if self.closed {
            return;
        }
        for event in self.router.poll() {
            match event {
                TransportEvent::JoinRequest {
                    player_id,
                    display_name,
                } => self.handle_join(&player_id, &display_name),
                TransportEvent::Inbound { player_id, message } => {
                    self.handle_inbound(&player_id, &message)
                }
                TransportEvent::Heartbeat { player_id } => {
                    self.registry.touch(&player_id)
                }
                TransportEvent::Disconnected { player_id } => {
                    self.handle_disconnect(&player_id)
                }
            }
        }
        for player_id in self.registry.expire_stale(self.config.liveness_timeout) {
            self.router.drop_player(&player_id);
            self.announce_player_change("timeout", &player_id);
        }
    }

    /// Advance all per-second countdowns. Pumps inbound first so a message
    /// arriving in the same instant the timer expires is deterministically
    /// "accepted just before timeout".
    pub fn tick_second(&mut self) {
        self.tick();
        if self.closed || self.session.is_none() {
            return;
        }

        match self.session.as_ref().map(|s| s.phase()) {
            Some(Phase::Paused) => {
                let expired = self
                    .session
                    .as_mut()
                    .is_some_and(|s| s.tick_results_delay());
                if expired {
                    self.leave_results_window();
                }
            }
            Some(Phase::Playing) => {
                let tick = self
                    .session
                    .as_mut()
                    .map(|s| s.tick_timer())
                    .unwrap_or(TimerTick::Idle);
                match tick {
                    TimerTick::Idle => {}
                    TimerTick::Running(remaining) => {
                        self.dispatch(RoundOutcome::Resolved, |module, ctx| {
                            module.on_timer_tick(ctx, remaining)
                        });
                    }
                    TimerTick::Expired => self.handle_round_timeout(),
                }
            }
            _ => {}
        }
    }

    /// Host control: start a game with the given module. Refused (with the
    /// reason) when a session is already active or too few players are
    /// connected.
    pub fn start_game(
        &mut self,
        module: Box<dyn GameModule>,
    ) -> Result<(), InvalidTransition> {
        if let Some(session) = &self.session {
            return Err(InvalidTransition {
                from: session.phase(),
                trigger: "start",
                reason: "a session is already active".to_string(),
            });
        }

        let connected = self.registry.connected_ids();
        let min_players = module.min_players().max(self.config.min_players);
        let mut session = GameSession::new(module.rounds(connected.len()))
            .with_results_delay(self.config.results_delay_secs);
        session.start(connected.clone(), connected.len(), min_players)?;

        // Each session is its own scoring unit.
        for player_id in self.registry.all_ids() {
            if let Some(player) = self.registry.get_mut(&player_id) {
                player.score = 0;
            }
        }

        let game_id = module.id();
        let game_name = module.display_name();
        tracing::info!(room = %self.code, game = game_id, "game started");
        self.session = Some(session);
        self.module = Some(module);

        self.broadcast_engine(
            kinds::GAME_START,
            serde_json::json!({ "game": game_id, "name": game_name }),
        );
        self.dispatch(RoundOutcome::Resolved, |module, ctx| {
            module.on_session_start(ctx)
        });
        self.dispatch(RoundOutcome::Resolved, |module, ctx| {
            module.on_round_start(ctx)
        });
        Ok(())
    }

    /// Host control: end the session and return the room to its lobby.
    /// Always legal, always immediate.
    pub fn end_game(&mut self) {
        if self.session.is_none() {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.abort();
        }
        self.broadcast_engine(
            kinds::GAME_END,
            serde_json::json!({ "ranking": self.ranking_json() }),
        );
        tracing::info!(room = %self.code, "game ended");
        self.session = None;
        self.module = None;
    }

    /// Tear the room down: cancel timers, stop the discovery loop, release
    /// every player record. Safe to invoke mid-transition and repeatedly.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.tear_down();
        }
        self.session = None;
        self.module = None;
        self.router.shutdown();
        self.registry.clear();
        self.closed = true;
        tracing::info!(room = %self.code, "room closed");
    }

    /// Final scores, best first.
    pub fn ranking(&self) -> Vec<Player> {
        let mut players = self.registry.snapshot();
        players.sort_by(|a, b| b.score.cmp(&a.score));
        players
    }

    fn ranking_json(&self) -> serde_json::Value {
        let ranked: Vec<serde_json::Value> =
            self.ranking().iter().map(|p| p.to_json()).collect();
        serde_json::Value::Array(ranked)
    }

    fn handle_join(&mut self, player_id: &str, display_name: &str) {
        match self.registry.admit(player_id, display_name) {
            Ok(admission) => {
                let welcome = welcome_message(
                    &self.code,
                    serde_json::json!({
                        "player_id": player_id,
                        "players": self.registry.to_json(),
                        "game": self.module.as_ref().map(|m| m.id()),
                    }),
                );
                self.router
                    .reply_join(player_id, JoinReply::Accepted { welcome });

                match admission {
                    Admission::Duplicate => {}
                    Admission::New => {
                        self.announce_player_change("joined", player_id);
                        self.notify_module_of_join(player_id);
                    }
                    Admission::Resumed => {
                        self.announce_player_change("resumed", player_id);
                        self.notify_module_of_join(player_id);
                    }
                }
            }
            Err(reason) => {
                tracing::info!(room = %self.code, player = player_id, %reason, "join rejected");
                self.router
                    .reply_join(player_id, JoinReply::Rejected { reason });
            }
        }
    }

    fn notify_module_of_join(&mut self, player_id: &str) {
        let id = player_id.to_string();
        self.dispatch(RoundOutcome::Resolved, move |module, ctx| {
            module.on_player_joined(ctx, &id)
        });
    }

    fn handle_inbound(&mut self, player_id: &str, message: &Message) {
        if !self.registry.contains(player_id) {
            tracing::debug!(player = player_id, "message from unadmitted player dropped");
            return;
        }
        self.registry.touch(player_id);
        let playing = self
            .session
            .as_ref()
            .is_some_and(|s| s.phase() == Phase::Playing);
        if !playing || self.module.is_none() {
            // No round open to receive it: a late arrival from a closed
            // round (or ended session) is a no-op, never fatal.
            tracing::debug!(player = player_id, kind = %message.kind, "stale message dropped");
            return;
        }
        let id = player_id.to_string();
        let msg = message.clone();
        self.dispatch(RoundOutcome::Resolved, move |module, ctx| {
            module.on_inbound_message(ctx, &id, &msg)
        });
    }

    fn handle_disconnect(&mut self, player_id: &str) {
        if self.registry.mark_disconnected(player_id) {
            self.router.drop_player(player_id);
            self.announce_player_change("left", player_id);
        }
    }

    fn handle_round_timeout(&mut self) {
        self.dispatch(RoundOutcome::TimedOut, |module, ctx| {
            module.on_round_timeout(ctx)
        });
        // A module must not leave a round open with no timer armed; if its
        // timeout policy neither resolved nor re-armed, close the round.
        let dangling = self
            .session
            .as_ref()
            .is_some_and(|s| s.phase() == Phase::Playing && s.time_left().is_none());
        if dangling {
            self.finish_round(RoundOutcome::TimedOut);
        }
    }

    fn leave_results_window(&mut self) {
        let next = match self.session.as_mut().map(|s| s.begin_next_round()) {
            Some(Ok(next)) => next,
            _ => return,
        };
        match next {
            NextRound::Playing { .. } => {
                self.dispatch(RoundOutcome::Resolved, |module, ctx| {
                    module.on_round_start(ctx)
                });
            }
            NextRound::Finished => {
                self.broadcast_engine(
                    kinds::GAME_END,
                    serde_json::json!({ "ranking": self.ranking_json() }),
                );
                tracing::info!(room = %self.code, "game finished");
                self.session = None;
                self.module = None;
            }
        }
    }

    /// Run a module hook with a fresh context, then apply whatever phase
    /// requests it queued. Routing inside the hook only forwards; all
    /// phase changes happen here, after the hook returns.
    fn dispatch<F>(&mut self, outcome: RoundOutcome, hook: F)
    where
        F: FnOnce(&mut dyn GameModule, &mut ModuleContext<'_>),
    {
        let (Some(module), Some(session)) = (self.module.as_mut(), self.session.as_mut())
        else {
            return;
        };
        let mut ctx = ModuleContext::new(session, &mut self.registry, &mut self.router);
        hook(module.as_mut(), &mut ctx);
        let requests = ctx.finish();
        for request in requests {
            match request {
                EngineRequest::ResolveRound => self.finish_round(outcome),
                EngineRequest::EndSession => {
                    self.end_game();
                    return;
                }
            }
        }
    }

    /// Close the current round and fire the scoring hook exactly once.
    /// The losing side of a timeout/resolution race lands in the `Err`
    /// branch and is a deliberate no-op.
    fn finish_round(&mut self, outcome: RoundOutcome) {
        let resolved = match self.session.as_mut().map(|s| s.resolve_round()) {
            Some(result) => result,
            None => return,
        };
        match resolved {
            Ok(()) => {
                self.dispatch(RoundOutcome::Resolved, move |module, ctx| {
                    module.on_round_end(ctx, outcome)
                });
            }
            Err(err) => {
                tracing::debug!(room = %self.code, %err, "round already closed (timer race)");
            }
        }
    }

    fn announce_player_change(&mut self, event: &str, player_id: &str) {
        let player = self.registry.get(player_id).map(|p| p.to_json());
        self.broadcast_engine(
            kinds::PLAYER_CHANGE,
            serde_json::json!({ "event": event, "player": player }),
        );
    }

    fn broadcast_engine(&mut self, kind: &str, data: serde_json::Value) {
        let message = Message::host(kind, data);
        self.router.broadcast(&self.registry, &message);
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("code", &self.code)
            .field("closed", &self.closed)
            .field("players", &self.registry.count())
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

/// Arena of rooms keyed by room code.
#[derive(Debug, Default)]
pub struct RoomManager {
    board: SignalBoard,
    config: RoomConfig,
    rooms: HashMap<String, Room>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RoomConfig) -> Self {
        Self {
            board: SignalBoard::new(),
            config,
            rooms: HashMap::new(),
        }
    }

    /// The discovery board controllers connect through.
    pub fn board(&self) -> SignalBoard {
        self.board.clone()
    }

    /// Create a room under a fresh generated code and start listening.
    pub fn create_room(&mut self) -> &mut Room {
        let (code, transport) = loop {
            let candidate = generate_room_code();
            if self.rooms.contains_key(&candidate) {
                continue;
            }
            if let Some(transport) = PollingTransport::bind(&self.board, candidate.clone()) {
                break (candidate, transport);
            }
        };
        let room = Room::new(code.clone(), self.config.clone(), Box::new(transport));
        self.rooms.entry(code).or_insert(room)
    }

    pub fn get(&self, code: &str) -> Option<&Room> {
        self.rooms.get(code)
    }

    pub fn get_mut(&mut self, code: &str) -> Option<&mut Room> {
        self.rooms.get_mut(code)
    }

    /// Tear down one room and forget it.
    pub fn close_room(&mut self, code: &str) -> bool {
        match self.rooms.remove(code) {
            Some(mut room) => {
                room.close();
                true
            }
            None => false,
        }
    }

    /// Drive every open room's poll loop.
    pub fn tick(&mut self) {
        for room in self.rooms.values_mut() {
            room.tick();
        }
    }

    /// Drive every open room's countdowns.
    pub fn tick_second(&mut self) {
        for room in self.rooms.values_mut() {
            room.tick_second();
        }
    }

    /// Sweep rooms already closed elsewhere.
    pub fn cleanup_closed(&mut self) -> Vec<String> {
        let closed: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, room)| room.is_closed())
            .map(|(code, _)| code.clone())
            .collect();
        for code in &closed {
            self.rooms.remove(code);
        }
        closed
    }

    pub fn count(&self) -> usize {
        self.rooms.len()
    }
}

/// Short human-typeable room code, e.g. `ABC123`.
fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ROOM_CODE_CHARSET.len());
            ROOM_CODE_CHARSET[idx] as char
        })
        .collect()
}
