//! Game module contract.
//!
//! Every concrete minigame is a consumer of the session state machine, not
//! a transport or router. A module receives read access to the players and
//! session plus the write capabilities on [`ModuleContext`]; it supplies
//! validation and scoring policy only. The shared phase/timer/turn logic
//! lives in the engine once, instead of being copy-pasted per game.
//!
//! Module obligations:
//! - mutate scores only through [`ModuleContext::add_score`] /
//!   [`ModuleContext::penalize`];
//! - keep cross-round state inside the module struct (and its display
//!   snapshot), nowhere else;
//! - always either resolve the round or leave a timer armed — a round must
//!   never stay open indefinitely.

pub mod drawing;
pub mod quiz;
pub mod reaction;
pub mod story;
pub mod word_chain;

use std::collections::HashSet;

use crate::engine::message::{Message, PlayerId};
use crate::engine::registry::{ConnectionRegistry, Player};
use crate::engine::router::{MessageRouter, RouteError};
use crate::engine::session::{GameSession, TurnAdvance};

pub use drawing::DrawingGame;
pub use quiz::QuizGame;
pub use reaction::ReactionGame;
pub use story::StoryGame;
pub use word_chain::WordChainGame;

/// Which path closed the round. Whichever fired first, the scoring hook
/// runs exactly once; the other path is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The module declared the round resolved early.
    Resolved,
    /// The countdown reached zero.
    TimedOut,
}

/// Phase changes a module may request; applied by the room after the
/// module hook returns, so routing itself never mutates session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EngineRequest {
    ResolveRound,
    EndSession,
}

/// The capability surface handed to a game module hook.
pub struct ModuleContext<'a> {
    session: &'a mut GameSession,
    registry: &'a mut ConnectionRegistry,
    router: &'a mut MessageRouter,
    requests: Vec<EngineRequest>,
}

impl<'a> ModuleContext<'a> {
    pub(crate) fn new(
        session: &'a mut GameSession,
        registry: &'a mut ConnectionRegistry,
        router: &'a mut MessageRouter,
    ) -> Self {
        Self {
            session,
            registry,
            router,
            requests: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> Vec<EngineRequest> {
        self.requests
    }

    // Read surface

    /// Snapshot of all players in join order.
    pub fn players(&self) -> Vec<Player> {
        self.registry.snapshot()
    }

    pub fn connected_players(&self) -> Vec<PlayerId> {
        self.registry.connected_ids()
    }

    pub fn display_name(&self, player_id: &str) -> Option<String> {
        self.registry.get(player_id).map(|p| p.display_name.clone())
    }

    pub fn current_round(&self) -> u32 {
        self.session.current_round()
    }

    pub fn total_rounds(&self) -> u32 {
        self.session.total_rounds()
    }

    pub fn time_left(&self) -> Option<u32> {
        self.session.time_left()
    }

    pub fn active_player(&self) -> Option<PlayerId> {
        self.session.active_player().cloned()
    }

    // Write surface

    /// Broadcast a host message to every connected player.
    pub fn broadcast(&mut self, kind: &str, data: serde_json::Value) {
        let message = Message::host(kind, data);
        self.router.broadcast(self.registry, &message);
    }

    /// Unicast a host message to one player.
    pub fn unicast(
        &mut self,
        player_id: &str,
        kind: &str,
        data: serde_json::Value,
    ) -> Result<(), RouteError> {
        let message = Message::host(kind, data);
        self.router.unicast(self.registry, player_id, &message)
    }

    /// Add points to a player's score. The only sanctioned score path,
    /// together with [`Self::penalize`].
    pub fn add_score(&mut self, player_id: &str, points: u32) {
        if let Some(player) = self.registry.get_mut(player_id) {
            player.score += points;
        }
    }

    /// Deduct points, saturating at zero.
    pub fn penalize(&mut self, player_id: &str, points: u32) {
        if let Some(player) = self.registry.get_mut(player_id) {
            player.score = player.score.saturating_sub(points);
        }
    }

    /// Replace the module's display snapshot on the session.
    pub fn set_data(&mut self, data: serde_json::Value) {
        self.session.data = data;
    }

    /// Arm (or re-arm) the round countdown.
    pub fn arm_timer(&mut self, secs: u32) {
        if let Err(err) = self.session.arm_timer(secs) {
            tracing::debug!(error = %err, "arm_timer ignored");
        }
    }

    /// Point the turn rotation at a specific seat.
    pub fn set_turn_index(&mut self, index: usize) {
        self.session.set_turn_index(index);
    }

    /// Cycle the turn to the next connected player in join order.
    pub fn advance_turn(&mut self) -> Option<TurnAdvance> {
        let connected: HashSet<PlayerId> =
            self.registry.connected_ids().into_iter().collect();
        self.session.advance_turn(&connected)
    }

    /// Request that the current round be closed (early resolution). The
    /// engine applies it after this hook returns and then fires the
    /// scoring hook exactly once.
    pub fn resolve_round(&mut self) {
        self.requests.push(EngineRequest::ResolveRound);
    }

    /// Request that the whole session end after this hook returns.
    pub fn request_end(&mut self) {
        self.requests.push(EngineRequest::EndSession);
    }
}

/// The pluggable interface each concrete minigame implements.
pub trait GameModule {
    /// Stable identifier, used in `game-start` payloads.
    fn id(&self) -> &'static str;

    /// Human-readable name for the shared screen.
    fn display_name(&self) -> &'static str;

    /// Minimum connected players this game needs.
    fn min_players(&self) -> usize;

    /// Round budget for a given player count.
    fn rounds(&self, player_count: usize) -> u32;

    /// Called once, right after `waiting → playing`.
    fn on_session_start(&mut self, ctx: &mut ModuleContext<'_>);

    /// Called at the top of every round, including the first.
    fn on_round_start(&mut self, ctx: &mut ModuleContext<'_>);

    /// An admitted player sent a message while a session is active.
    fn on_inbound_message(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        player_id: &str,
        message: &Message,
    );

    /// The round countdown reached zero. The default policy closes the
    /// round; turn-based modules override this to skip the slow player
    /// instead.
    fn on_round_timeout(&mut self, ctx: &mut ModuleContext<'_>) {
        ctx.resolve_round();
    }

    /// The converged scoring hook: fires exactly once per round, whichever
    /// of early resolution or timeout closed it.
    fn on_round_end(&mut self, ctx: &mut ModuleContext<'_>, outcome: RoundOutcome);

    /// One second elapsed on a running countdown.
    fn on_timer_tick(&mut self, _ctx: &mut ModuleContext<'_>, _remaining: u32) {}

    /// A player joined or resumed mid-session; modules may resync state
    /// with an explicit message here.
    fn on_player_joined(&mut self, _ctx: &mut ModuleContext<'_>, _player_id: &str) {}
}
