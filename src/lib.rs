//! GameHub Engine
//!
//! This crate provides the room and session engine for GameHub party games:
//! one shared screen per room, phone browsers as controllers.
//!
//! # Overview
//!
//! The engine module provides:
//!
//! - **Channel Transport** - Room discovery by short code, join handshake,
//!   and bidirectional delivery between the host and each controller.
//!
//! - **Connection Registry** - Player identity and liveness per room, with
//!   scores that survive disconnects and seamless reconnection.
//!
//! - **Message Router** - Broadcast and unicast with per-player ordering;
//!   one failed delivery never blocks the rest.
//!
//! - **Game Session State Machine** - Phases, round budget, countdown timer
//!   and turn rotation, shared by every minigame.
//!
//! The games module provides five minigames built on the
//! [`games::GameModule`] contract: quiz, drawing & guess, word chain,
//! reaction time, and story builder.
//!
//! # Design Principles
//!
//! 1. **State machines validate transitions** - Illegal phase changes are
//!    rejected with a reason, never silently applied.
//!
//! 2. **One drive loop per room** - The host pumps `tick()` and
//!    `tick_second()`; no threads, no shared mutable state across rooms.
//!
//! 3. **Modules supply policy, the engine supplies mechanism** - A game
//!    module validates messages and decides scores; phases, timers and
//!    turns are engine-owned.
//!
//! 4. **Serialization-ready** - All room-visible state converts to JSON
//!    for the shared screen and the controllers.
//!
//! # Example
//!
//! ```rust
//! use gamehub_engine::engine::{PlayerChannel, RoomManager};
//! use gamehub_engine::games::quiz::{QuizGame, QuizQuestion};
//!
//! let mut manager = RoomManager::new();
//! let board = manager.board();
//! let code = manager.create_room().code().to_string();
//!
//! // Two phones join by room code.
//! let mut ana = PlayerChannel::connect(&board, &code, "Ana").unwrap();
//! let mut bruno = PlayerChannel::connect(&board, &code, "Bruno").unwrap();
//! manager.tick();
//! ana.poll_join();
//! bruno.poll_join();
//!
//! // The host starts a quiz.
//! let questions = vec![QuizQuestion {
//!     prompt: "Largest planet?".into(),
//!     options: vec!["Mars".into(), "Jupiter".into()],
//!     correct: 1,
//!     category: None,
//! }];
//! let room = manager.get_mut(&code).unwrap();
//! room.start_game(Box::new(QuizGame::new(questions))).unwrap();
//!
//! // Controllers receive the question and answer.
//! assert!(ana.poll_messages().iter().any(|m| m.kind == "quiz-question"));
//! ana.send("quiz-answer", serde_json::json!({ "answer": 1 }));
//! bruno.send("quiz-answer", serde_json::json!({ "answer": 0 }));
//! manager.tick();
//! ```

pub mod engine;
pub mod games;
