//! Reaction time: wait for the signal, then tap first.
//!
//! Each challenge arms a hidden countdown of random length. When it fires,
//! every controller gets the go signal and a short tap window opens.
//! Players are ranked by tap arrival order; tapping before the signal is a
//! false start and forfeits the challenge.

use std::collections::HashSet;
use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use crate::engine::message::{Message, PlayerId};
use crate::games::{GameModule, ModuleContext, RoundOutcome};

/// Challenges per session.
pub const REACTION_CHALLENGES: u32 = 6;

/// Tap window after the go signal, in seconds.
pub const REACTION_WINDOW_SECS: u32 = 3;

/// Hidden delay before the go signal, in seconds.
const JITTER_SECS: RangeInclusive<u32> = 3..=8;

/// Which stage of a challenge the clock is counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Pre-signal; taps are false starts.
    Waiting,
    /// Go signal sent; taps are ranked.
    Open,
}

pub struct ReactionGame {
    rng: StdRng,
    challenges: u32,
    window_secs: u32,
    jitter_secs: RangeInclusive<u32>,
    stage: Stage,
    /// Tap arrival order within the open window.
    taps: Vec<PlayerId>,
    /// False starters, out for the current challenge only.
    disqualified: HashSet<PlayerId>,
}

impl ReactionGame {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic variant for replays and tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            challenges: REACTION_CHALLENGES,
            window_secs: REACTION_WINDOW_SECS,
            jitter_secs: JITTER_SECS,
            stage: Stage::Waiting,
            taps: Vec::new(),
            disqualified: HashSet::new(),
        }
    }

    pub fn with_challenges(mut self, challenges: u32) -> Self {
        self.challenges = challenges;
        self
    }

    pub fn with_jitter_secs(mut self, jitter: RangeInclusive<u32>) -> Self {
        self.jitter_secs = jitter;
        self
    }

    /// Score for a 0-based rank: 100, 80, 60... with a floor of 10.
    fn score_for_rank(rank: usize) -> u32 {
        (100u32.saturating_sub(20 * rank as u32)).max(10)
    }

    /// Everyone still in contention has tapped.
    fn all_resolved(&self, ctx: &ModuleContext<'_>) -> bool {
        ctx.connected_players().iter().all(|id| {
            self.taps.contains(id) || self.disqualified.contains(id)
        })
    }
}

impl Default for ReactionGame {
    fn default() -> Self {
        Self::new()
    }
}

impl GameModule for ReactionGame {
    fn id(&self) -> &'static str {
        "reaction"
    }

    fn display_name(&self) -> &'static str {
        "Reaction Time"
    }

    fn min_players(&self) -> usize {
        1
    }

    fn rounds(&self, _player_count: usize) -> u32 {
        self.challenges
    }

    fn on_session_start(&mut self, _ctx: &mut ModuleContext<'_>) {}

    fn on_round_start(&mut self, ctx: &mut ModuleContext<'_>) {
        self.stage = Stage::Waiting;
        self.taps.clear();
        self.disqualified.clear();

        let jitter = self.rng.gen_range(self.jitter_secs.clone());
        let payload = json!({
            "challenge": ctx.current_round(),
            "totalChallenges": ctx.total_rounds(),
        });
        ctx.set_data(payload.clone());
        ctx.broadcast("reaction-wait", payload);
        ctx.arm_timer(jitter);
    }

    fn on_inbound_message(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        player_id: &str,
        message: &Message,
    ) {
        if message.kind != "reaction-tap" {
            return;
        }
        match self.stage {
            Stage::Waiting => {
                // Jumping the signal forfeits this challenge.
                if self.disqualified.insert(player_id.to_string()) {
                    ctx.broadcast(
                        "reaction-false-start",
                        json!({ "player": player_id }),
                    );
                }
            }
            Stage::Open => {
                if self.disqualified.contains(player_id)
                    || self.taps.iter().any(|id| id == player_id)
                {
                    return;
                }
                self.taps.push(player_id.to_string());
                if self.all_resolved(ctx) {
                    ctx.resolve_round();
                }
            }
        }
    }

    fn on_round_timeout(&mut self, ctx: &mut ModuleContext<'_>) {
        match self.stage {
            Stage::Waiting => {
                // Hidden delay elapsed: open the tap window.
                self.stage = Stage::Open;
                ctx.broadcast(
                    "reaction-go",
                    json!({ "window": self.window_secs }),
                );
                ctx.arm_timer(self.window_secs);
            }
            Stage::Open => ctx.resolve_round(),
        }
    }

    fn on_round_end(&mut self, ctx: &mut ModuleContext<'_>, _outcome: RoundOutcome) {
        let mut ranking = Vec::new();
        for (rank, player_id) in self.taps.iter().enumerate() {
            let awarded = Self::score_for_rank(rank);
            ctx.add_score(player_id, awarded);
            ranking.push(json!({
                "player": player_id,
                "rank": rank + 1,
                "awarded": awarded,
            }));
        }
        let scores: Vec<serde_json::Value> =
            ctx.players().iter().map(|p| p.to_json()).collect();
        ctx.broadcast(
            "reaction-result",
            json!({
                "ranking": ranking,
                "falseStarts": self.disqualified.iter().collect::<Vec<_>>(),
                "scores": scores,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::room::{Room, RoomConfig};
    use crate::engine::session::Phase;
    use crate::engine::transport::{JoinStatus, PlayerChannel, PollingTransport, SignalBoard};

    fn harness(names: &[&str]) -> (Room, Vec<PlayerChannel>) {
        let board = SignalBoard::new();
        let transport = PollingTransport::bind(&board, "REACT1").unwrap();
        let config = RoomConfig {
            results_delay_secs: 1,
            ..RoomConfig::default()
        };
        let mut room = Room::new("REACT1", config, Box::new(transport));
        let mut channels = Vec::new();
        for name in names {
            let mut channel = PlayerChannel::connect(&board, "REACT1", *name).unwrap();
            room.tick();
            assert!(matches!(channel.poll_join(), JoinStatus::Accepted { .. }));
            channels.push(channel);
        }
        (room, channels)
    }

    fn fixed_delay_game() -> ReactionGame {
        // Jitter pinned to one second so tests can step to the go signal.
        ReactionGame::with_seed(7).with_jitter_secs(1..=1)
    }

    fn score_of(room: &Room, player_id: &str) -> u32 {
        room.players()
            .iter()
            .find(|p| p.id == player_id)
            .map(|p| p.score)
            .unwrap()
    }

    fn kinds_of(channel: &mut PlayerChannel) -> Vec<String> {
        channel.poll_messages().into_iter().map(|m| m.kind).collect()
    }

    #[test]
    fn test_rank_scores() {
        assert_eq!(ReactionGame::score_for_rank(0), 100);
        assert_eq!(ReactionGame::score_for_rank(1), 80);
        assert_eq!(ReactionGame::score_for_rank(4), 20);
        // Floor kicks in from the sixth tap on.
        assert_eq!(ReactionGame::score_for_rank(5), 10);
        assert_eq!(ReactionGame::score_for_rank(9), 10);
    }

    #[test]
    fn test_go_signal_after_hidden_delay() {
        let (mut room, mut channels) = harness(&["Ana", "Bruno"]);
        room.start_game(Box::new(fixed_delay_game())).unwrap();

        assert!(kinds_of(&mut channels[0]).contains(&"reaction-wait".to_string()));
        room.tick_second();
        assert!(kinds_of(&mut channels[0]).contains(&"reaction-go".to_string()));
        assert_eq!(room.phase(), Some(Phase::Playing));
    }

    #[test]
    fn test_tap_order_ranks_scores() {
        let (mut room, mut channels) = harness(&["Ana", "Bruno"]);
        room.start_game(Box::new(fixed_delay_game())).unwrap();
        let ana = channels[0].player_id().to_string();
        let bruno = channels[1].player_id().to_string();

        room.tick_second(); // go
        channels[0].send("reaction-tap", json!({}));
        channels[1].send("reaction-tap", json!({}));
        room.tick();

        // Everyone tapped: resolved without waiting out the window.
        assert_eq!(room.phase(), Some(Phase::Paused));
        assert_eq!(score_of(&room, &ana), 100);
        assert_eq!(score_of(&room, &bruno), 80);
    }

    #[test]
    fn test_false_start_forfeits_challenge() {
        let (mut room, mut channels) = harness(&["Ana", "Bruno"]);
        room.start_game(Box::new(fixed_delay_game())).unwrap();
        let ana = channels[0].player_id().to_string();
        let bruno = channels[1].player_id().to_string();

        // Ana taps before the signal.
        channels[0].send("reaction-tap", json!({}));
        room.tick();
        assert!(kinds_of(&mut channels[1]).contains(&"reaction-false-start".to_string()));

        room.tick_second(); // go
        channels[0].send("reaction-tap", json!({}));
        channels[1].send("reaction-tap", json!({}));
        room.tick();

        // Ana is out for this challenge; Bruno ranks first.
        assert_eq!(score_of(&room, &ana), 0);
        assert_eq!(score_of(&room, &bruno), 100);
    }

    #[test]
    fn test_window_timeout_scores_partial_taps() {
        let (mut room, mut channels) = harness(&["Ana", "Bruno"]);
        room.start_game(Box::new(fixed_delay_game())).unwrap();
        let ana = channels[0].player_id().to_string();
        let bruno = channels[1].player_id().to_string();

        room.tick_second(); // go; window is REACTION_WINDOW_SECS
        channels[0].send("reaction-tap", json!({}));
        room.tick();
        for _ in 0..REACTION_WINDOW_SECS {
            room.tick_second();
        }

        assert_eq!(room.phase(), Some(Phase::Paused));
        assert_eq!(score_of(&room, &ana), 100);
        assert_eq!(score_of(&room, &bruno), 0);
    }

    #[test]
    fn test_double_tap_counts_once() {
        let (mut room, mut channels) = harness(&["Ana", "Bruno"]);
        room.start_game(Box::new(fixed_delay_game())).unwrap();
        let ana = channels[0].player_id().to_string();

        room.tick_second(); // go
        channels[0].send("reaction-tap", json!({}));
        channels[0].send("reaction-tap", json!({}));
        room.tick();
        for _ in 0..REACTION_WINDOW_SECS {
            room.tick_second();
        }

        assert_eq!(score_of(&room, &ana), 100);
    }

    #[test]
    fn test_challenge_budget() {
        let game = fixed_delay_game().with_challenges(2);
        let (mut room, mut channels) = harness(&["Ana", "Bruno"]);
        room.start_game(Box::new(game)).unwrap();

        for _ in 0..2 {
            room.tick_second(); // go
            channels[0].send("reaction-tap", json!({}));
            channels[1].send("reaction-tap", json!({}));
            room.tick(); // resolved
            room.tick_second(); // results window closes
        }
        assert!(room.phase().is_none());
    }
}
