//! Trivia quiz: simultaneous answers, speed-weighted scoring.
//!
//! Every connected player answers the same multiple-choice question within
//! the time limit. A correct answer earns a base award plus a bonus scaled
//! by the seconds left on the clock when the answer landed. The round
//! resolves early once every connected player has answered.

use std::collections::HashMap;

use serde_json::json;

use crate::engine::message::{Message, PlayerId};
use crate::games::{GameModule, ModuleContext, RoundOutcome};

/// Default question countdown, in seconds.
pub const QUIZ_TIME_LIMIT_SECS: u32 = 15;

/// Default question budget per session.
pub const QUIZ_ROUNDS: u32 = 5;

/// One multiple-choice question. Question tables are supplied by the
/// embedding application; the module only consumes them.
#[derive(Debug, Clone)]
pub struct QuizQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    /// Index into `options`.
    pub correct: usize,
    pub category: Option<String>,
}

/// Scoring policy for a correct answer:
/// `base + speed_bonus_max * time_left / time_limit`.
#[derive(Debug, Clone)]
pub struct QuizScoring {
    pub base: u32,
    pub speed_bonus_max: u32,
}

impl Default for QuizScoring {
    fn default() -> Self {
        Self {
            base: 500,
            speed_bonus_max: 500,
        }
    }
}

pub struct QuizGame {
    questions: Vec<QuizQuestion>,
    scoring: QuizScoring,
    time_limit: u32,
    /// Answer index and seconds left at answer time, first answer per
    /// player only.
    answers: HashMap<PlayerId, (usize, u32)>,
}

impl QuizGame {
    pub fn new(questions: Vec<QuizQuestion>) -> Self {
        Self {
            questions,
            scoring: QuizScoring::default(),
            time_limit: QUIZ_TIME_LIMIT_SECS,
            answers: HashMap::new(),
        }
    }

    pub fn with_scoring(mut self, scoring: QuizScoring) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_time_limit(mut self, secs: u32) -> Self {
        self.time_limit = secs;
        self
    }

    fn question(&self, round: u32) -> Option<&QuizQuestion> {
        self.questions.get(round.saturating_sub(1) as usize)
    }

    fn score_for(&self, time_left: u32) -> u32 {
        self.scoring.base + self.scoring.speed_bonus_max * time_left / self.time_limit
    }
}

impl GameModule for QuizGame {
    fn id(&self) -> &'static str {
        "quiz"
    }

    fn display_name(&self) -> &'static str {
        "Quiz"
    }

    fn min_players(&self) -> usize {
        1
    }

    fn rounds(&self, _player_count: usize) -> u32 {
        (self.questions.len() as u32).min(QUIZ_ROUNDS)
    }

    fn on_session_start(&mut self, _ctx: &mut ModuleContext<'_>) {}

    fn on_round_start(&mut self, ctx: &mut ModuleContext<'_>) {
        self.answers.clear();
        let round = ctx.current_round();
        let Some(question) = self.question(round) else {
            ctx.resolve_round();
            return;
        };
        let payload = json!({
            "question": question.prompt,
            "options": question.options,
            "category": question.category,
            "questionNumber": round,
            "totalQuestions": ctx.total_rounds(),
            "timeLimit": self.time_limit,
        });
        ctx.set_data(payload.clone());
        ctx.broadcast("quiz-question", payload);
        ctx.arm_timer(self.time_limit);
    }

    fn on_inbound_message(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        player_id: &str,
        message: &Message,
    ) {
        if message.kind != "quiz-answer" {
            return;
        }
        let Some(answer) = message.data["answer"].as_u64() else {
            tracing::debug!(player = player_id, "malformed quiz answer dropped");
            return;
        };
        let Some(question) = self.question(ctx.current_round()) else {
            return;
        };
        let answer = answer as usize;
        if answer >= question.options.len() {
            tracing::debug!(player = player_id, answer, "out-of-range quiz answer dropped");
            return;
        }
        // First answer counts; later ones are ignored.
        if self.answers.contains_key(player_id) {
            return;
        }
        let time_left = ctx.time_left().unwrap_or(0);
        self.answers
            .insert(player_id.to_string(), (answer, time_left));

        let all_answered = ctx
            .connected_players()
            .iter()
            .all(|id| self.answers.contains_key(id));
        if all_answered {
            ctx.resolve_round();
        }
    }

    fn on_round_end(&mut self, ctx: &mut ModuleContext<'_>, _outcome: RoundOutcome) {
        let Some(question) = self.question(ctx.current_round()) else {
            return;
        };
        let correct = question.correct;

        let mut breakdown = Vec::new();
        let mut awards: Vec<(PlayerId, u32)> = Vec::new();
        for (player_id, (answer, time_left)) in &self.answers {
            let is_correct = *answer == correct;
            let awarded = if is_correct {
                self.score_for(*time_left)
            } else {
                0
            };
            breakdown.push(json!({
                "player": player_id,
                "answer": answer,
                "correct": is_correct,
                "awarded": awarded,
            }));
            if awarded > 0 {
                awards.push((player_id.clone(), awarded));
            }
        }
        for (player_id, awarded) in awards {
            ctx.add_score(&player_id, awarded);
        }

        let scores: Vec<serde_json::Value> =
            ctx.players().iter().map(|p| p.to_json()).collect();
        ctx.broadcast(
            "quiz-result",
            json!({
                "correct": correct,
                "answers": breakdown,
                "scores": scores,
            }),
        );
    }
}
