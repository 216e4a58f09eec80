//! Story builder: collaborative round-robin storytelling.
//!
//! Starting from an opening line, players take turns appending one sentence
//! each. A contribution scores by length up to a cap, so short filler earns
//! little and there is no reward for dumping a paragraph. A lapsed turn
//! appends a placeholder so the story keeps its rhythm, and earns nothing.

use serde_json::json;

use crate::engine::message::{Message, PlayerId};
use crate::games::{GameModule, ModuleContext, RoundOutcome};

/// Per-turn countdown, in seconds.
pub const STORY_TURN_SECS: u32 = 30;

/// Full rotations per session.
pub const STORY_CYCLES: u32 = 3;

/// A sentence never scores more than this many points.
const SENTENCE_POINT_CAP: u32 = 50;

/// Appended in place of a contribution when a turn lapses.
const PLACEHOLDER_SENTENCE: &str = "...";

pub struct StoryGame {
    opening: String,
    turn_secs: u32,
    cycles: u32,
    /// Contributions in order, including placeholders. The author is None
    /// for the opening line and lapsed turns.
    sentences: Vec<(Option<PlayerId>, String)>,
}

impl StoryGame {
    /// Opening lines are supplied by the embedding application, the module
    /// only builds on them.
    pub fn new(opening: impl Into<String>) -> Self {
        let opening = opening.into();
        Self {
            sentences: vec![(None, opening.clone())],
            opening,
            turn_secs: STORY_TURN_SECS,
            cycles: STORY_CYCLES,
        }
    }

    pub fn with_turn_secs(mut self, secs: u32) -> Self {
        self.turn_secs = secs;
        self
    }

    pub fn with_cycles(mut self, cycles: u32) -> Self {
        self.cycles = cycles;
        self
    }

    fn story_text(&self) -> String {
        self.sentences
            .iter()
            .map(|(_, s)| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn points_for(sentence: &str) -> u32 {
        (sentence.chars().count() as u32).min(SENTENCE_POINT_CAP)
    }

    fn prompt_turn(&self, ctx: &mut ModuleContext<'_>) {
        let Some(player_id) = ctx.active_player() else {
            return;
        };
        let payload = json!({
            "player": player_id,
            "name": ctx.display_name(&player_id),
            "story": self.story_text(),
            "round": ctx.current_round(),
            "totalRounds": ctx.total_rounds(),
            "timeLimit": self.turn_secs,
        });
        ctx.set_data(payload.clone());
        ctx.broadcast("story-turn", payload);
        ctx.arm_timer(self.turn_secs);
    }

    fn pass_turn(&mut self, ctx: &mut ModuleContext<'_>) {
        match ctx.advance_turn() {
            Some(advance) if !advance.wrapped => self.prompt_turn(ctx),
            _ => ctx.resolve_round(),
        }
    }
}

impl GameModule for StoryGame {
    fn id(&self) -> &'static str {
        "story"
    }

    fn display_name(&self) -> &'static str {
        "Story Builder"
    }

    fn min_players(&self) -> usize {
        2
    }

    fn rounds(&self, _player_count: usize) -> u32 {
        self.cycles
    }

    fn on_session_start(&mut self, ctx: &mut ModuleContext<'_>) {
        ctx.broadcast("story-opening", json!({ "opening": self.opening }));
    }

    fn on_round_start(&mut self, ctx: &mut ModuleContext<'_>) {
        self.prompt_turn(ctx);
    }

    fn on_inbound_message(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        player_id: &str,
        message: &Message,
    ) {
        if message.kind != "story-sentence" {
            return;
        }
        if ctx.active_player().as_deref() != Some(player_id) {
            tracing::debug!(player = player_id, "out-of-turn sentence dropped");
            return;
        }
        let Some(sentence) = message.data["sentence"].as_str() else {
            return;
        };
        let sentence = sentence.trim();
        if sentence.is_empty() {
            let _ = ctx.unicast(
                player_id,
                "story-rejected",
                json!({ "reason": "empty sentence" }),
            );
            return;
        }

        let points = Self::points_for(sentence);
        ctx.add_score(player_id, points);
        self.sentences
            .push((Some(player_id.to_string()), sentence.to_string()));
        ctx.broadcast(
            "story-added",
            json!({
                "player": player_id,
                "sentence": sentence,
                "points": points,
                "story": self.story_text(),
            }),
        );
        self.pass_turn(ctx);
    }

    fn on_round_timeout(&mut self, ctx: &mut ModuleContext<'_>) {
        if let Some(player_id) = ctx.active_player() {
            // A present player who stalled leaves a gap in the story; a
            // seat that went dark is skipped without one.
            if ctx.connected_players().contains(&player_id) {
                self.sentences
                    .push((None, PLACEHOLDER_SENTENCE.to_string()));
                ctx.broadcast(
                    "story-added",
                    json!({
                        "player": player_id,
                        "sentence": PLACEHOLDER_SENTENCE,
                        "points": 0,
                        "story": self.story_text(),
                    }),
                );
            }
        }
        self.pass_turn(ctx);
    }

    fn on_round_end(&mut self, ctx: &mut ModuleContext<'_>, _outcome: RoundOutcome) {
        let scores: Vec<serde_json::Value> =
            ctx.players().iter().map(|p| p.to_json()).collect();
        ctx.broadcast(
            "story-round-end",
            json!({
                "round": ctx.current_round(),
                "story": self.story_text(),
                "scores": scores,
            }),
        );
    }
}
