//! Word chain: turn-based vocabulary game.
//!
//! Players take turns submitting a word that starts with the last letter of
//! the previously accepted word. An accepted word scores by length; letting
//! the turn clock run out costs a penalty and passes the turn. One round is
//! one full rotation through the turn order; disconnected players are
//! skipped, not waited for.

use std::collections::HashSet;

use serde_json::json;

use crate::engine::message::Message;
use crate::games::{GameModule, ModuleContext, RoundOutcome};

/// Per-turn countdown, in seconds.
pub const CHAIN_TURN_SECS: u32 = 20;

/// Full rotations per session.
pub const CHAIN_CYCLES: u32 = 3;

/// Points per letter of an accepted word.
const POINTS_PER_LETTER: u32 = 5;

/// Deducted when a player's turn times out. Scores never go below zero.
const TIMEOUT_PENALTY: u32 = 10;

pub struct WordChainGame {
    /// Optional dictionary; when present, submissions must appear in it.
    dictionary: Option<HashSet<String>>,
    turn_secs: u32,
    cycles: u32,
    /// Words accepted so far this session; repeats are rejected.
    used_words: HashSet<String>,
    /// Required first letter of the next word. None until the first word
    /// is accepted.
    chain_letter: Option<char>,
}

impl WordChainGame {
    pub fn new() -> Self {
        Self {
            dictionary: None,
            turn_secs: CHAIN_TURN_SECS,
            cycles: CHAIN_CYCLES,
            used_words: HashSet::new(),
            chain_letter: None,
        }
    }

    pub fn with_dictionary(mut self, words: impl IntoIterator<Item = String>) -> Self {
        self.dictionary = Some(words.into_iter().map(|w| w.to_lowercase()).collect());
        self
    }

    pub fn with_turn_secs(mut self, secs: u32) -> Self {
        self.turn_secs = secs;
        self
    }

    pub fn with_cycles(mut self, cycles: u32) -> Self {
        self.cycles = cycles;
        self
    }

    /// Why a submission was refused, or None if it stands.
    fn rejection_reason(&self, word: &str) -> Option<&'static str> {
        if word.len() < 2 || !word.chars().all(|c| c.is_alphabetic()) {
            return Some("not a word");
        }
        if let Some(required) = self.chain_letter {
            if !word.starts_with(required) {
                return Some("wrong starting letter");
            }
        }
        if self.used_words.contains(word) {
            return Some("already used");
        }
        if let Some(dictionary) = &self.dictionary {
            if !dictionary.contains(word) {
                return Some("not in dictionary");
            }
        }
        None
    }

    fn prompt_turn(&self, ctx: &mut ModuleContext<'_>) {
        let Some(player_id) = ctx.active_player() else {
            return;
        };
        let payload = json!({
            "player": player_id,
            "name": ctx.display_name(&player_id),
            "chainLetter": self.chain_letter.map(String::from),
            "round": ctx.current_round(),
            "totalRounds": ctx.total_rounds(),
            "timeLimit": self.turn_secs,
        });
        ctx.set_data(payload.clone());
        ctx.broadcast("chain-turn", payload);
        ctx.arm_timer(self.turn_secs);
    }

    /// Move to the next eligible seat. Closes the round when the rotation
    /// wraps or nobody is left to take a turn.
    fn pass_turn(&mut self, ctx: &mut ModuleContext<'_>) {
        match ctx.advance_turn() {
            Some(advance) if !advance.wrapped => self.prompt_turn(ctx),
            _ => ctx.resolve_round(),
        }
    }
}

impl Default for WordChainGame {
    fn default() -> Self {
        Self::new()
    }
}

impl GameModule for WordChainGame {
    fn id(&self) -> &'static str {
        "word-chain"
    }

    fn display_name(&self) -> &'static str {
        "Word Chain"
    }

    fn min_players(&self) -> usize {
        2
    }

    fn rounds(&self, _player_count: usize) -> u32 {
        self.cycles
    }

    fn on_session_start(&mut self, _ctx: &mut ModuleContext<'_>) {}

    fn on_round_start(&mut self, ctx: &mut ModuleContext<'_>) {
        self.prompt_turn(ctx);
    }

    fn on_inbound_message(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        player_id: &str,
        message: &Message,
    ) {
        if message.kind != "chain-word" {
            return;
        }
        // Only the player whose turn it is may submit.
        if ctx.active_player().as_deref() != Some(player_id) {
            tracing::debug!(player = player_id, "out-of-turn word dropped");
            return;
        }
        let Some(word) = message.data["word"].as_str() else {
            return;
        };
        let word = word.trim().to_lowercase();

        if let Some(reason) = self.rejection_reason(&word) {
            // The turn and its clock keep running; the player may retry.
            let _ = ctx.unicast(player_id, "chain-rejected", json!({ "reason": reason }));
            return;
        }

        let points = POINTS_PER_LETTER * word.chars().count() as u32;
        ctx.add_score(player_id, points);
        self.chain_letter = word.chars().last();
        self.used_words.insert(word.clone());
        ctx.broadcast(
            "chain-accepted",
            json!({
                "player": player_id,
                "word": word,
                "points": points,
                "nextLetter": self.chain_letter.map(String::from),
            }),
        );
        self.pass_turn(ctx);
    }

    fn on_round_timeout(&mut self, ctx: &mut ModuleContext<'_>) {
        // A seat that went dark is skipped without the penalty; only a
        // present player who stalled pays it.
        if let Some(player_id) = ctx.active_player() {
            if ctx.connected_players().contains(&player_id) {
                ctx.penalize(&player_id, TIMEOUT_PENALTY);
                ctx.broadcast(
                    "chain-timeout",
                    json!({
                        "player": player_id,
                        "penalty": TIMEOUT_PENALTY,
                        "nextLetter": self.chain_letter.map(String::from),
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
            "chain-round-end",
            json!({
                "round": ctx.current_round(),
                "scores": scores,
            }),
        );
    }
}
