//! Game session state machine.
//!
//! Phase lifecycle, round bookkeeping, the per-room countdown timer and
//! turn rotation — generic across all minigames. The session never
//! interprets `data`; that snapshot belongs to the active game module.
//!
//! # Phase diagram
//!
//! ```text
//! ┌─────────┐  start   ┌─────────┐  resolve_round  ┌────────┐
//! │ Waiting │─────────▶│ Playing │────────────────▶│ Paused │
//! └─────────┘          └─────────┘                 └───┬────┘
//!      │                    ▲     begin_next_round     │
//!      │                    └──────────────────────────┤
//!      │ abort                         round budget    │
//!      │               ┌──────────┐    exhausted       │
//!      └──────────────▶│ Finished │◀───────────────────┘
//!                      └──────────┘
//!
//! tear_down() pre-empts any phase, including mid-transition, and lands in
//! the terminal TornDown state.
//! ```

use std::collections::HashSet;
use std::fmt;

use super::message::PlayerId;

/// Default results-display window between rounds, in seconds.
pub const DEFAULT_RESULTS_DELAY_SECS: u32 = 5;

/// Session phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Lobby, pre-game.
    #[default]
    Waiting,
    /// Active round or turn; the countdown may be running.
    Playing,
    /// Round just ended, results window, timer not running.
    Paused,
    /// Terminal; scoring final. Exited only by tearing the session down.
    Finished,
    /// Terminal; room teardown superseded whatever was in flight.
    TornDown,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Finished => "finished",
            Self::TornDown => "torn_down",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::TornDown)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when a phase transition is attempted from an incompatible phase.
/// Always reported to the caller with a reason, never silently ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: Phase,
    pub trigger: &'static str,
    pub reason: String,
}

impl InvalidTransition {
    fn new(from: Phase, trigger: &'static str, reason: impl Into<String>) -> Self {
        Self {
            from,
            trigger,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid transition from {} via {}: {}",
            self.from, self.trigger, self.reason
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// Result of one countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTick {
    /// No timer armed.
    Idle,
    /// Timer decremented; seconds remaining.
    Running(u32),
    /// Timer just reached zero.
    Expired,
}

/// Outcome of leaving the results window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextRound {
    /// A new round began.
    Playing { round: u32 },
    /// The round budget is exhausted; the session is finished.
    Finished,
}

/// A completed turn rotation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnAdvance {
    pub player_id: PlayerId,
    /// Whether the rotation wrapped past the end of the turn order — the
    /// cue for turn-based modules to close the round.
    pub wrapped: bool,
}

/// Per-room game session state. At most one exists per room.
#[derive(Debug, Clone)]
pub struct GameSession {
    phase: Phase,
    current_round: u32,
    total_rounds: u32,
    time_left: Option<u32>,
    results_delay: Option<u32>,
    results_delay_secs: u32,

    /// Turn rotation in join order, captured at start. Disconnected players
    /// stay listed (their scoring history survives) and are skipped when
    /// cycling.
    turn_order: Vec<PlayerId>,
    turn_index: usize,

    /// Module display snapshot; opaque to the engine.
    pub data: serde_json::Value,
}

impl GameSession {
    pub fn new(total_rounds: u32) -> Self {
        Self {
            phase: Phase::Waiting,
            current_round: 0,
            total_rounds,
            time_left: None,
            results_delay: None,
            results_delay_secs: DEFAULT_RESULTS_DELAY_SECS,
            turn_order: Vec::new(),
            turn_index: 0,
            data: serde_json::Value::Null,
        }
    }

    pub fn with_results_delay(mut self, secs: u32) -> Self {
        self.results_delay_secs = secs;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    pub fn time_left(&self) -> Option<u32> {
        self.time_left
    }

    /// `waiting → playing`. Refused when already started or when too few
    /// players are connected; the caller is told why.
    pub fn start(
        &mut self,
        turn_order: Vec<PlayerId>,
        connected_players: usize,
        min_players: usize,
    ) -> Result<(), InvalidTransition> {
        if self.phase != Phase::Waiting {
            return Err(InvalidTransition::new(
                self.phase,
                "start",
                "session already started",
            ));
        }
        if connected_players < min_players {
            return Err(InvalidTransition::new(
                self.phase,
                "start",
                format!(
                    "need {} more player(s) to start",
                    min_players - connected_players
                ),
            ));
        }
        self.turn_order = turn_order;
        self.turn_index = 0;
        self.current_round = 1;
        self.phase = Phase::Playing;
        Ok(())
    }

    /// `playing → paused`. Both the timeout path and early resolution
    /// converge here, so a lost timer race is simply an `InvalidTransition`
    /// the caller can treat as a no-op — the round was already closed.
    pub fn resolve_round(&mut self) -> Result<(), InvalidTransition> {
        if self.phase != Phase::Playing {
            return Err(InvalidTransition::new(
                self.phase,
                "resolve_round",
                "no round in progress",
            ));
        }
        self.phase = Phase::Paused;
        self.time_left = None;
        self.results_delay = Some(self.results_delay_secs);
        Ok(())
    }

    /// `paused → playing` (next round) or `paused → finished` when the
    /// round budget is exhausted.
    pub fn begin_next_round(&mut self) -> Result<NextRound, InvalidTransition> {
        if self.phase != Phase::Paused {
            return Err(InvalidTransition::new(
                self.phase,
                "begin_next_round",
                "not in results window",
            ));
        }
        self.results_delay = None;
        if self.current_round >= self.total_rounds {
            self.phase = Phase::Finished;
            return Ok(NextRound::Finished);
        }
        self.current_round += 1;
        self.phase = Phase::Playing;
        Ok(NextRound::Playing {
            round: self.current_round,
        })
    }

    /// Host-initiated abort: always legal, always immediate.
    pub fn abort(&mut self) {
        if self.phase != Phase::TornDown {
            self.phase = Phase::Finished;
            self.time_left = None;
            self.results_delay = None;
        }
    }

    /// Pre-emptive teardown; supersedes any in-flight transition and is
    /// safe to invoke from any phase, repeatedly.
    pub fn tear_down(&mut self) {
        self.phase = Phase::TornDown;
        self.time_left = None;
        self.results_delay = None;
    }

    /// Arm (or re-arm) the single per-session countdown. Only legal while
    /// playing; there is never more than one active timer per session.
    pub fn arm_timer(&mut self, secs: u32) -> Result<(), InvalidTransition> {
        if self.phase != Phase::Playing {
            return Err(InvalidTransition::new(
                self.phase,
                "arm_timer",
                "timer only runs while playing",
            ));
        }
        self.time_left = Some(secs);
        Ok(())
    }

    pub fn clear_timer(&mut self) {
        self.time_left = None;
    }

    /// Advance the countdown by one second. `time_left` is monotonically
    /// non-increasing between explicit re-arms; expiry fires exactly once.
    pub fn tick_timer(&mut self) -> TimerTick {
        if self.phase != Phase::Playing {
            return TimerTick::Idle;
        }
        match self.time_left {
            None => TimerTick::Idle,
            Some(0) | Some(1) => {
                self.time_left = None;
                TimerTick::Expired
            }
            Some(t) => {
                self.time_left = Some(t - 1);
                TimerTick::Running(t - 1)
            }
        }
    }

    /// Advance the results-display countdown. Returns true when the window
    /// just closed.
    pub fn tick_results_delay(&mut self) -> bool {
        if self.phase != Phase::Paused {
            return false;
        }
        match self.results_delay {
            None => false,
            Some(0) | Some(1) => {
                self.results_delay = None;
                true
            }
            Some(d) => {
                self.results_delay = Some(d - 1);
                false
            }
        }
    }

    /// Turn order as captured at start.
    pub fn turn_order(&self) -> &[PlayerId] {
        &self.turn_order
    }

    /// The player whose turn it is, for turn-based modules.
    pub fn active_player(&self) -> Option<&PlayerId> {
        self.turn_order.get(self.turn_index)
    }

    /// Point the rotation at a specific seat (e.g. a randomly chosen
    /// starting player).
    pub fn set_turn_index(&mut self, index: usize) {
        if index < self.turn_order.len() {
            self.turn_index = index;
        }
    }

    /// Cycle to the next eligible player in join order, wrapping modulo the
    /// turn order. Ineligible (disconnected) players are skipped, not
    /// removed. Returns `None` when nobody is eligible.
    pub fn advance_turn(&mut self, eligible: &HashSet<PlayerId>) -> Option<TurnAdvance> {
        let len = self.turn_order.len();
        if len == 0 {
            return None;
        }
        for step in 1..=len {
            let candidate = (self.turn_index + step) % len;
            if eligible.contains(&self.turn_order[candidate]) {
                let wrapped = self.turn_index + step >= len;
                self.turn_index = candidate;
                return Some(TurnAdvance {
                    player_id: self.turn_order[candidate].clone(),
                    wrapped,
                });
            }
        }
        None
    }

    /// Display snapshot for the host UI.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "phase": self.phase.as_str(),
            "current_round": self.current_round,
            "total_rounds": self.total_rounds,
            "time_left": self.time_left,
            "active_player": self.active_player(),
            "data": self.data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(ids: &[&str]) -> Vec<PlayerId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn eligible(ids: &[&str]) -> HashSet<PlayerId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_start_requires_min_players() {
        let mut session = GameSession::new(3);
        let err = session.start(order(&["p1"]), 1, 2).unwrap_err();
        assert_eq!(err.from, Phase::Waiting);
        assert!(err.reason.contains("1 more"));
        assert_eq!(session.phase(), Phase::Waiting);
    }

    #[test]
    fn test_double_start_refused() {
        let mut session = GameSession::new(3);
        session.start(order(&["p1", "p2"]), 2, 2).unwrap();
        assert_eq!(session.phase(), Phase::Playing);

        let err = session.start(order(&["p1", "p2"]), 2, 2).unwrap_err();
        assert_eq!(err.from, Phase::Playing);
        // State unchanged.
        assert_eq!(session.phase(), Phase::Playing);
        assert_eq!(session.current_round(), 1);
    }

    #[test]
    fn test_phase_totality() {
        let mut session = GameSession::new(1).with_results_delay(1);
        session.start(order(&["p1", "p2"]), 2, 2).unwrap();
        session.resolve_round().unwrap();
        assert_eq!(session.phase(), Phase::Paused);

        assert_eq!(session.begin_next_round(), Ok(NextRound::Finished));
        assert_eq!(session.phase(), Phase::Finished);

        // Terminal: nothing else is legal.
        assert!(session.resolve_round().is_err());
        assert!(session.begin_next_round().is_err());
        assert!(session.start(order(&["p1", "p2"]), 2, 2).is_err());
    }

    #[test]
    fn test_round_cycle() {
        let mut session = GameSession::new(2);
        session.start(order(&["p1", "p2"]), 2, 2).unwrap();
        session.resolve_round().unwrap();
        assert_eq!(
            session.begin_next_round(),
            Ok(NextRound::Playing { round: 2 })
        );
        session.resolve_round().unwrap();
        assert_eq!(session.begin_next_round(), Ok(NextRound::Finished));
    }

    #[test]
    fn test_resolve_round_exactly_once() {
        let mut session = GameSession::new(2);
        session.start(order(&["p1", "p2"]), 2, 2).unwrap();
        session.arm_timer(10).unwrap();

        session.resolve_round().unwrap();
        // The losing path of a timer race sees a refusal, not a double
        // resolution.
        assert!(session.resolve_round().is_err());
        assert_eq!(session.time_left(), None);
    }

    #[test]
    fn test_timer_countdown_and_expiry() {
        let mut session = GameSession::new(1);
        session.start(order(&["p1", "p2"]), 2, 2).unwrap();
        session.arm_timer(3).unwrap();

        assert_eq!(session.tick_timer(), TimerTick::Running(2));
        assert_eq!(session.tick_timer(), TimerTick::Running(1));
        assert_eq!(session.tick_timer(), TimerTick::Expired);
        // Expiry fires once; afterwards the timer is idle.
        assert_eq!(session.tick_timer(), TimerTick::Idle);
    }

    #[test]
    fn test_timer_only_while_playing() {
        let mut session = GameSession::new(1);
        assert!(session.arm_timer(5).is_err());
        session.start(order(&["p1", "p2"]), 2, 2).unwrap();
        session.arm_timer(5).unwrap();
        session.resolve_round().unwrap();
        assert_eq!(session.tick_timer(), TimerTick::Idle);
    }

    #[test]
    fn test_results_delay() {
        let mut session = GameSession::new(2).with_results_delay(2);
        session.start(order(&["p1", "p2"]), 2, 2).unwrap();
        session.resolve_round().unwrap();

        assert!(!session.tick_results_delay());
        assert!(session.tick_results_delay());
        // Window closed; no re-fire.
        assert!(!session.tick_results_delay());
    }

    #[test]
    fn test_turn_rotation_wraps_in_join_order() {
        let mut session = GameSession::new(5);
        session
            .start(order(&["p1", "p2", "p3", "p4"]), 4, 2)
            .unwrap();
        let all = eligible(&["p1", "p2", "p3", "p4"]);

        assert_eq!(session.active_player(), Some(&"p1".to_string()));
        let mut seen = Vec::new();
        for _ in 0..4 {
            let advance = session.advance_turn(&all).unwrap();
            seen.push((advance.player_id, advance.wrapped));
        }
        assert_eq!(
            seen,
            vec![
                ("p2".to_string(), false),
                ("p3".to_string(), false),
                ("p4".to_string(), false),
                ("p1".to_string(), true),
            ]
        );
    }

    #[test]
    fn test_turn_rotation_skips_disconnected() {
        let mut session = GameSession::new(5);
        session
            .start(order(&["p1", "p2", "p3", "p4"]), 4, 2)
            .unwrap();
        // p2 dropped before their turn.
        let connected = eligible(&["p1", "p3", "p4"]);

        let advance = session.advance_turn(&connected).unwrap();
        assert_eq!(advance.player_id, "p3");
        assert!(!advance.wrapped);
        // p2 is skipped, not removed from the order.
        assert_eq!(session.turn_order().len(), 4);
    }

    #[test]
    fn test_turn_rotation_nobody_eligible() {
        let mut session = GameSession::new(5);
        session.start(order(&["p1", "p2"]), 2, 2).unwrap();
        assert_eq!(session.advance_turn(&HashSet::new()), None);
    }

    #[test]
    fn test_abort_always_legal() {
        let mut session = GameSession::new(3);
        session.abort();
        assert_eq!(session.phase(), Phase::Finished);

        let mut session = GameSession::new(3);
        session.start(order(&["p1", "p2"]), 2, 2).unwrap();
        session.arm_timer(10).unwrap();
        session.abort();
        assert_eq!(session.phase(), Phase::Finished);
        assert_eq!(session.time_left(), None);
    }

    #[test]
    fn test_tear_down_supersedes() {
        let mut session = GameSession::new(3);
        session.start(order(&["p1", "p2"]), 2, 2).unwrap();
        session.tear_down();
        assert_eq!(session.phase(), Phase::TornDown);

        // Abort cannot resurrect a torn-down session.
        session.abort();
        assert_eq!(session.phase(), Phase::TornDown);
        session.tear_down();
        assert_eq!(session.phase(), Phase::TornDown);
    }
}
