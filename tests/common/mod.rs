#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for Things game client integration tests.
//!
//! Provides a channel-based [`MockTransport`] and helper functions for
//! constructing common server event JSON strings.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use things_game_client::protocol::{GamePhase, GameSnapshot, Player, ServerEvent};
use things_game_client::{ThingsClientError, Transport};

// ── MockTransport ───────────────────────────────────────────────────

/// A channel-based mock transport for integration testing.
///
/// Scripted server responses are consumed in order by `recv()`.
/// All messages sent by the client are recorded in `sent`.
pub struct MockTransport {
    /// Scripted server responses (consumed in order by `recv`).
    incoming: VecDeque<Option<Result<String, ThingsClientError>>>,
    /// Recorded outgoing messages from the client.
    pub sent: Arc<StdMutex<Vec<String>>>,
    /// Whether `close()` has been called.
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a new mock transport with the given scripted incoming messages.
    ///
    /// Returns the transport plus shared handles for inspecting sent messages
    /// and whether close was called.
    pub fn new(
        incoming: Vec<Option<Result<String, ThingsClientError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), ThingsClientError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ThingsClientError>> {
        if let Some(item) = self.incoming.pop_front() {
            // An explicit `None` entry signals a clean transport close.
            item
        } else {
            // All scripted messages delivered — hang until shutdown.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), ThingsClientError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── Snapshot builders ───────────────────────────────────────────────

/// A lobby-phase game containing the given players.
pub fn game_with_players(game_id: &str, players: Vec<Player>) -> GameSnapshot {
    GameSnapshot {
        game_id: game_id.into(),
        name: "test room".into(),
        score_limit: 11,
        players,
        ..Default::default()
    }
}

/// The standard two-player room used across tests: Ann (p1) and Ben (p2).
pub fn two_player_game() -> GameSnapshot {
    game_with_players(
        "MANGO",
        vec![Player::new("p1", "Ann"), Player::new("p2", "Ben")],
    )
}

// ── Event JSON builders ─────────────────────────────────────────────

pub fn player_joined_json(game: GameSnapshot, player: Player) -> String {
    serde_json::to_string(&ServerEvent::PlayerJoined { game, player }).unwrap()
}

pub fn player_left_json(game: GameSnapshot, player: Player) -> String {
    serde_json::to_string(&ServerEvent::PlayerLeft { game, player }).unwrap()
}

pub fn player_removed_json(game: GameSnapshot, player: Player) -> String {
    serde_json::to_string(&ServerEvent::PlayerRemoved { game, player }).unwrap()
}

pub fn player_id_json(player_id: &str, session_key: &str) -> String {
    serde_json::to_string(&ServerEvent::PlayerId {
        player_id: player_id.into(),
        session_key: session_key.into(),
    })
    .unwrap()
}

pub fn game_started_json(mut game: GameSnapshot) -> String {
    game.state = GamePhase::WritingTopic;
    serde_json::to_string(&ServerEvent::GameStarted { game }).unwrap()
}

pub fn topic_set_json(mut game: GameSnapshot, topic: &str) -> String {
    game.state = GamePhase::WritingAnswers;
    game.current_topic = topic.into();
    serde_json::to_string(&ServerEvent::TopicSet { game }).unwrap()
}

pub fn game_update_json(game: Option<GameSnapshot>) -> String {
    serde_json::to_string(&ServerEvent::GameUpdate { game }).unwrap()
}

pub fn error_json(error: &str) -> String {
    serde_json::to_string(&ServerEvent::Error {
        error: error.into(),
    })
    .unwrap()
}
