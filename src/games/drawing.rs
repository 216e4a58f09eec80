//! Drawing & guess: one player draws, everyone else guesses the word.
//!
//! The drawer seat rotates through the turn order, two full passes per
//! session. Only the drawer sees the word; their strokes are relayed to
//! every controller, and the round closes on the first correct guess or
//! when the clock runs out. Guessers score by how early they were right,
//! the drawer earns a cut per correct guess.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use crate::engine::message::{Message, PlayerId};
use crate::games::{GameModule, ModuleContext, RoundOutcome};

/// Round countdown, in seconds.
pub const DRAWING_ROUND_SECS: u32 = 90;

/// Drawer passes through the turn order per session.
const DRAWER_PASSES: u32 = 2;

/// Drawer award per correct guess.
const DRAWER_CUT: u32 = 30;

pub struct DrawingGame {
    rng: StdRng,
    /// Word table supplied by the embedding application.
    words: Vec<String>,
    round_secs: u32,
    used_words: HashSet<usize>,
    current_word: Option<String>,
    drawer: Option<PlayerId>,
    /// Correct guessers in arrival order.
    correct: Vec<PlayerId>,
}

impl DrawingGame {
    pub fn new(words: Vec<String>) -> Self {
        Self::with_rng(words, StdRng::from_entropy())
    }

    /// Deterministic variant for replays and tests.
    pub fn with_seed(words: Vec<String>, seed: u64) -> Self {
        Self::with_rng(words, StdRng::seed_from_u64(seed))
    }

    fn with_rng(words: Vec<String>, rng: StdRng) -> Self {
        Self {
            rng,
            words,
            round_secs: DRAWING_ROUND_SECS,
            used_words: HashSet::new(),
            current_word: None,
            drawer: None,
            correct: Vec::new(),
        }
    }

    pub fn with_round_secs(mut self, secs: u32) -> Self {
        self.round_secs = secs;
        self
    }

    /// Pick an unused word at random; the table recycles once exhausted.
    fn pick_word(&mut self) -> Option<String> {
        if self.words.is_empty() {
            return None;
        }
        if self.used_words.len() == self.words.len() {
            self.used_words.clear();
        }
        loop {
            let idx = self.rng.gen_range(0..self.words.len());
            if self.used_words.insert(idx) {
                return Some(self.words[idx].clone());
            }
        }
    }

    /// Guesser award for a 0-based arrival order: 100, 80... floor 20.
    fn guesser_score(order: usize) -> u32 {
        (100u32.saturating_sub(20 * order as u32)).max(20)
    }

    fn is_correct(&self, guess: &str) -> bool {
        self.current_word
            .as_deref()
            .is_some_and(|w| w.eq_ignore_ascii_case(guess.trim()))
    }
}

impl GameModule for DrawingGame {
    fn id(&self) -> &'static str {
        "drawing"
    }

    fn display_name(&self) -> &'static str {
        "Drawing & Guess"
    }

    fn min_players(&self) -> usize {
        2
    }

    fn rounds(&self, player_count: usize) -> u32 {
        DRAWER_PASSES * player_count as u32
    }

    fn on_session_start(&mut self, _ctx: &mut ModuleContext<'_>) {}

    fn on_round_start(&mut self, ctx: &mut ModuleContext<'_>) {
        self.correct.clear();
        self.drawer = ctx.active_player();
        self.current_word = self.pick_word();
        let (Some(drawer), Some(word)) = (self.drawer.clone(), self.current_word.clone())
        else {
            ctx.resolve_round();
            return;
        };

        let payload = json!({
            "drawer": drawer,
            "drawerName": ctx.display_name(&drawer),
            "round": ctx.current_round(),
            "totalRounds": ctx.total_rounds(),
            "wordLength": word.chars().count(),
            "timeLimit": self.round_secs,
        });
        ctx.set_data(payload.clone());
        ctx.broadcast("drawing-round", payload);
        // Only the drawer learns the word.
        let _ = ctx.unicast(&drawer, "drawing-word", json!({ "word": word }));
        ctx.arm_timer(self.round_secs);
    }

    fn on_inbound_message(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        player_id: &str,
        message: &Message,
    ) {
        let is_drawer = self.drawer.as_deref() == Some(player_id);
        match message.kind.as_str() {
            "drawing-stroke" if is_drawer => {
                // Relay as-is; the engine does not interpret stroke data.
                ctx.broadcast(
                    "drawing-stroke",
                    json!({
                        "drawer": player_id,
                        "stroke": message.data["stroke"].clone(),
                    }),
                );
            }
            "guess" if !is_drawer => {
                let Some(guess) = message.data["guess"].as_str() else {
                    return;
                };
                // First correct guess resolves the round; anything that
                // slips in behind it would be announced but never scored.
                if !self.correct.is_empty() {
                    return;
                }
                if self.is_correct(guess) {
                    self.correct.push(player_id.to_string());
                    ctx.broadcast("guess-correct", json!({ "player": player_id }));
                    ctx.resolve_round();
                } else {
                    // Wrong guesses feed the shared screen's guess ticker.
                    ctx.broadcast(
                        "guess",
                        json!({ "player": player_id, "guess": guess }),
                    );
                }
            }
            _ => {}
        }
    }

    fn on_round_end(&mut self, ctx: &mut ModuleContext<'_>, _outcome: RoundOutcome) {
        let mut ranking = Vec::new();
        for (order, player_id) in self.correct.iter().enumerate() {
            let awarded = Self::guesser_score(order);
            ctx.add_score(player_id, awarded);
            ranking.push(json!({ "player": player_id, "awarded": awarded }));
        }
        if let Some(drawer) = &self.drawer {
            let cut = DRAWER_CUT * self.correct.len() as u32;
            if cut > 0 {
                ctx.add_score(drawer, cut);
            }
        }

        let scores: Vec<serde_json::Value> =
            ctx.players().iter().map(|p| p.to_json()).collect();
        ctx.broadcast(
            "drawing-result",
            json!({
                "word": self.current_word,
                "guessers": ranking,
                "scores": scores,
            }),
        );
        // Next round gets the next drawer in join order.
        ctx.advance_turn();
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
        let transport = PollingTransport::bind(&board, "DRAW01").unwrap();
        let config = RoomConfig {
            results_delay_secs: 1,
            ..RoomConfig::default()
        };
        let mut room = Room::new("DRAW01", config, Box::new(transport));
        let mut channels = Vec::new();
        for name in names {
            let mut channel = PlayerChannel::connect(&board, "DRAW01", *name).unwrap();
            room.tick();
            assert!(matches!(channel.poll_join(), JoinStatus::Accepted { .. }));
            channels.push(channel);
        }
        (room, channels)
    }

    fn one_word_game() -> DrawingGame {
        DrawingGame::with_seed(vec!["cat".into()], 7)
    }

    fn score_of(room: &Room, player_id: &str) -> u32 {
        room.players()
            .iter()
            .find(|p| p.id == player_id)
            .map(|p| p.score)
            .unwrap()
    }

    fn last_of_kind(channel: &mut PlayerChannel, kind: &str) -> Option<serde_json::Value> {
        channel
            .poll_messages()
            .into_iter()
            .filter(|m| m.kind == kind)
            .last()
            .map(|m| m.data)
    }

    #[test]
    fn test_guesser_score_floor() {
        assert_eq!(DrawingGame::guesser_score(0), 100);
        assert_eq!(DrawingGame::guesser_score(1), 80);
        assert_eq!(DrawingGame::guesser_score(4), 20);
        assert_eq!(DrawingGame::guesser_score(7), 20);
    }

    #[test]
    fn test_round_budget_two_passes() {
        let game = one_word_game();
        assert_eq!(game.rounds(3), 6);
        assert_eq!(game.rounds(4), 8);
    }

    #[test]
    fn test_word_only_sent_to_drawer() {
        let (mut room, mut channels) = harness(&["Ana", "Bruno"]);
        room.start_game(Box::new(one_word_game())).unwrap();

        // Ana is the first drawer.
        let word = last_of_kind(&mut channels[0], "drawing-word").unwrap();
        assert_eq!(word["word"], "cat");

        // One drain of Bruno's inbox covers both checks.
        let inbox = channels[1].poll_messages();
        assert!(inbox.iter().all(|m| m.kind != "drawing-word"));
        let round = inbox
            .iter()
            .find(|m| m.kind == "drawing-round")
            .expect("round announcement");
        assert_eq!(round.data["wordLength"], 3);
    }

    #[test]
    fn test_strokes_relayed_from_drawer_only() {
        let (mut room, mut channels) = harness(&["Ana", "Bruno"]);
        room.start_game(Box::new(one_word_game())).unwrap();

        channels[0].send("drawing-stroke", json!({"stroke": [1, 2, 3]}));
        channels[1].send("drawing-stroke", json!({"stroke": [9]}));
        room.tick();

        let stroke = last_of_kind(&mut channels[1], "drawing-stroke").unwrap();
        assert_eq!(stroke["stroke"], json!([1, 2, 3]));
        // Bruno is not the drawer; his stroke was dropped.
        assert!(last_of_kind(&mut channels[0], "drawing-stroke")
            .map(|d| d["stroke"] == json!([1, 2, 3]))
            .unwrap_or(false));
    }

    #[test]
    fn test_correct_guess_resolves_and_scores() {
        let (mut room, mut channels) = harness(&["Ana", "Bruno"]);
        room.start_game(Box::new(one_word_game())).unwrap();
        let ana = channels[0].player_id().to_string();
        let bruno = channels[1].player_id().to_string();

        channels[1].send("guess", json!({"guess": "Cat"}));
        room.tick();

        assert_eq!(room.phase(), Some(Phase::Paused));
        assert_eq!(score_of(&room, &bruno), 100);
        // Drawer's cut: one correct guess.
        assert_eq!(score_of(&room, &ana), 30);

        let result = last_of_kind(&mut channels[0], "drawing-result").unwrap();
        assert_eq!(result["word"], "cat");
    }

    #[test]
    fn test_second_correct_guess_in_same_tick_ignored() {
        let (mut room, mut channels) = harness(&["Ana", "Bruno", "Carlos"]);
        room.start_game(Box::new(one_word_game())).unwrap();
        let ana = channels[0].player_id().to_string();
        let bruno = channels[1].player_id().to_string();
        let carlos = channels[2].player_id().to_string();

        // Both guessers get the word right before the host pumps once.
        channels[1].send("guess", json!({"guess": "cat"}));
        channels[2].send("guess", json!({"guess": "cat"}));
        room.tick();

        assert_eq!(room.phase(), Some(Phase::Paused));
        assert_eq!(score_of(&room, &bruno), 100);
        assert_eq!(score_of(&room, &carlos), 0);
        assert_eq!(score_of(&room, &ana), 30);

        // Only the winning guess was announced.
        let announced: Vec<_> = channels[0]
            .poll_messages()
            .into_iter()
            .filter(|m| m.kind == "guess-correct")
            .collect();
        assert_eq!(announced.len(), 1);
        assert_eq!(announced[0].data["player"], bruno);
    }

    #[test]
    fn test_wrong_guess_feeds_ticker() {
        let (mut room, mut channels) = harness(&["Ana", "Bruno"]);
        room.start_game(Box::new(one_word_game())).unwrap();

        channels[1].send("guess", json!({"guess": "dog"}));
        room.tick();

        assert_eq!(room.phase(), Some(Phase::Playing));
        let echoed = last_of_kind(&mut channels[0], "guess").unwrap();
        assert_eq!(echoed["guess"], "dog");
    }

    #[test]
    fn test_drawer_cannot_guess() {
        let (mut room, mut channels) = harness(&["Ana", "Bruno"]);
        room.start_game(Box::new(one_word_game())).unwrap();
        let ana = channels[0].player_id().to_string();

        channels[0].send("guess", json!({"guess": "cat"}));
        room.tick();

        assert_eq!(room.phase(), Some(Phase::Playing));
        assert_eq!(score_of(&room, &ana), 0);
    }

    #[test]
    fn test_timeout_reveals_word_scores_nothing() {
        let (mut room, mut channels) = harness(&["Ana", "Bruno"]);
        let game = one_word_game().with_round_secs(1);
        room.start_game(Box::new(game)).unwrap();
        let ana = channels[0].player_id().to_string();
        let bruno = channels[1].player_id().to_string();

        room.tick_second();

        assert_eq!(room.phase(), Some(Phase::Paused));
        assert_eq!(score_of(&room, &ana), 0);
        assert_eq!(score_of(&room, &bruno), 0);
        let result = last_of_kind(&mut channels[1], "drawing-result").unwrap();
        assert_eq!(result["word"], "cat");
    }

    #[test]
    fn test_drawer_rotates_between_rounds() {
        let words = vec!["cat".into(), "dog".into()];
        let (mut room, mut channels) = harness(&["Ana", "Bruno"]);
        room.start_game(Box::new(DrawingGame::with_seed(words, 7)))
            .unwrap();
        let bruno = channels[1].player_id().to_string();

        let word = last_of_kind(&mut channels[0], "drawing-word").unwrap();
        channels[1].send("guess", json!({"guess": word["word"].clone()}));
        room.tick(); // round 1 resolved
        room.tick_second(); // results window closes, round 2 starts

        assert_eq!(room.active_player(), Some(bruno));
        assert!(last_of_kind(&mut channels[1], "drawing-word").is_some());
    }
}
