//! Client-side session and game-state synchronization.
//!
//! [`SessionState`] is the single coherent, renderable view of "current game"
//! that the client folds the server's event stream into. The server is
//! authoritative: every game-bearing event carries a complete
//! [`GameSnapshot`] and the reducer replaces its previous snapshot wholesale,
//! never patching individual fields. Identity-affecting transitions write
//! through to a [`CredentialStore`] so a restart within [`SESSION_TTL`] can
//! silently rejoin.
//!
//! Nothing in [`SessionState::apply`] can fail: a transition the reducer
//! cannot fully apply degrades to a no-op plus a status message, so one
//! poisoned event never breaks the events after it.
//!
//! Secondary view facts (current player, outstanding guessers, normalized
//! topic) are derived on read and never stored — the wholesale snapshot
//! replacement would otherwise need cache invalidation on every event.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::protocol::{GameId, GamePhase, GameSnapshot, Player, PlayerId, ServerEvent};
use crate::storage::{CredentialStore, StoredSession, SESSION_TTL};

/// The client's local view of its session and the current game.
///
/// There is no explicit state tag; the overall session state is implied by
/// field combinations: disconnected (`!is_connected`), connected without a
/// session (`!in_session()`), in a game (`game.is_some()`), game ended
/// (`in_session()` with `game` cleared).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    /// Transport liveness. Never persisted.
    pub is_connected: bool,
    /// Room this client belongs to. Empty = no session.
    pub game_id: GameId,
    /// This client's player id, assigned by the post-join handshake.
    pub player_id: PlayerId,
    /// Server-issued credential for rejoining. May be cleared independently
    /// of `game_id`/`player_id` to force re-authentication.
    pub session_key: String,
    /// The last complete game state declared by the server. `None` = no
    /// known game.
    pub game: Option<GameSnapshot>,
    /// Last human-readable status line; overwritten by each event.
    pub message: String,
    /// Cosmetic, user-chosen player color. Survives restarts via the store.
    pub color: String,
}

impl SessionState {
    /// A fresh state with no session and no connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a state from persisted storage, before any live event arrives.
    ///
    /// An absent or expired record yields the same state as [`new`](Self::new).
    pub fn rehydrate(store: &dyn CredentialStore) -> Self {
        let mut state = Self::new();
        if let Some(stored) = store.read() {
            debug!(game_id = %stored.game_id, "rehydrated session from storage");
            state.game_id = stored.game_id;
            state.player_id = stored.player_id;
            state.session_key = stored.session_key;
            state.color = stored.color;
        }
        state
    }

    // ── Event reducer ───────────────────────────────────────────────

    /// Fold one server event into this state.
    ///
    /// Storage writes happen synchronously here (write-through) on every
    /// identity-affecting transition, so an abrupt shutdown never loses more
    /// than the in-flight event. Storage failures are absorbed by the store.
    pub fn apply(&mut self, event: &ServerEvent, store: &dyn CredentialStore) {
        match event {
            ServerEvent::Connect => {
                self.is_connected = true;
            }
            // Snapshot and identity are retained so the UI can show
            // "reconnecting" instead of dumping the player to the home view.
            ServerEvent::Disconnect { .. } => {
                self.is_connected = false;
            }
            ServerEvent::PlayerJoined { game, player } => {
                self.game_id = game.game_id.clone();
                self.replace_game(game);
                if player.id != self.player_id {
                    self.message = format!("{} joined the game", player.name);
                }
                self.persist(store);
            }
            ServerEvent::PlayerLeft { game, player } => {
                self.replace_game(game);
                self.message = format!("{} left the game", player.name);
            }
            ServerEvent::PlayerRemoved { game, player } => {
                if !self.player_id.is_empty() && player.id == self.player_id {
                    // Destructive path: identity and snapshot clear together.
                    self.reset(store);
                    self.message = "You have been removed from the game".into();
                } else {
                    self.replace_game(game);
                    self.message = format!("{} was removed from the game", player.name);
                }
            }
            ServerEvent::PlayerId {
                player_id,
                session_key,
            } => {
                self.player_id = player_id.clone();
                self.session_key = session_key.clone();
                self.persist(store);
            }
            ServerEvent::GameStarted { game } => {
                self.replace_game(game);
                self.message = "The game has started".into();
            }
            ServerEvent::RoundStarted { game } => {
                self.replace_game(game);
                self.message = "A new round has started".into();
            }
            ServerEvent::TopicSet { game } => {
                self.replace_game(game);
                self.message = "The topic has been set".into();
            }
            ServerEvent::AnswerSubmitted { game } => {
                self.replace_game(game);
                self.message = "An answer has been submitted".into();
            }
            ServerEvent::MatchResult {
                game,
                matched_player_id,
                matched_answer,
            } => {
                self.replace_game(game);
                self.message = if matched_player_id.is_empty() {
                    "The guess did not match".into()
                } else {
                    let name = game
                        .players
                        .iter()
                        .find(|p| &p.id == matched_player_id)
                        .map_or("Someone", |p| p.name.as_str());
                    format!("{name} wrote \"{matched_answer}\"")
                };
            }
            ServerEvent::PointsReset { game } => {
                self.replace_game(game);
                self.message = "Scores have been reset".into();
            }
            ServerEvent::GameUpdate { game: Some(game) } => {
                self.game_id = game.game_id.clone();
                self.replace_game(game);
            }
            // No game in the payload: the room is gone, full reset.
            ServerEvent::GameUpdate { game: None } => {
                self.reset(store);
            }
            // Room listings are lobby data, not session state; consumers
            // read them off the event channel.
            ServerEvent::Games { .. } => {}
            ServerEvent::Error { error } => {
                // No speculative change was made, so nothing to roll back.
                self.message = error.clone();
            }
        }
    }

    /// Record that an inbound frame could not be decoded. The snapshot is
    /// untouched; only the status line reflects the failure.
    pub fn note_protocol_error(&mut self) {
        self.message = "Received an unreadable message from the server".into();
    }

    /// Replace the snapshot wholesale with the server-declared state.
    fn replace_game(&mut self, game: &GameSnapshot) {
        if !self.player_id.is_empty() && !game.players.iter().any(|p| p.id == self.player_id) {
            // Identity not present in the new snapshot. Not fatal: derived
            // views already treat a missing self as "not in game".
            warn!(
                player_id = %self.player_id,
                game_id = %game.game_id,
                "local player id not found in game snapshot"
            );
        }
        self.game = Some(game.clone());
    }

    /// Full atomic reset: identity, snapshot and status clear together, and
    /// the persisted record is removed. Partial clears are a correctness bug.
    fn reset(&mut self, store: &dyn CredentialStore) {
        self.game_id.clear();
        self.player_id.clear();
        self.session_key.clear();
        self.game = None;
        self.message.clear();
        store.clear();
    }

    /// Write the current identity through to storage with the fixed TTL.
    fn persist(&self, store: &dyn CredentialStore) {
        store.write(
            &StoredSession {
                game_id: self.game_id.clone(),
                player_id: self.player_id.clone(),
                session_key: self.session_key.clone(),
                color: self.color.clone(),
            },
            SESSION_TTL,
        );
    }

    // ── Derived view computations ───────────────────────────────────

    /// Whether this client has an active session (room and player known).
    pub fn in_session(&self) -> bool {
        !self.game_id.is_empty() && !self.player_id.is_empty()
    }

    /// This client's player record inside the current snapshot, if any.
    pub fn this_player(&self) -> Option<&Player> {
        if self.player_id.is_empty() {
            return None;
        }
        self.game
            .as_ref()?
            .players
            .iter()
            .find(|p| p.id == self.player_id)
    }

    /// All players except this client, in the server's arrival order.
    pub fn other_players(&self) -> Vec<&Player> {
        self.game
            .as_ref()
            .map(|g| {
                g.players
                    .iter()
                    .filter(|p| p.id != self.player_id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Players other than this client who have locked in an answer that has
    /// not been revealed yet.
    pub fn other_guessers(&self) -> Vec<&Player> {
        self.other_players()
            .into_iter()
            .filter(|p| p.submitted_answer && p.answer.is_empty())
            .collect()
    }

    /// The current topic with its first character lower-cased, for rendering
    /// mid-sentence. Empty when there is no game or no topic.
    pub fn normalized_topic(&self) -> String {
        let topic = self
            .game
            .as_ref()
            .map_or("", |g| g.current_topic.as_str());
        let mut chars = topic.chars();
        match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// The lifecycle phase of the current game, if one is known.
    pub fn phase(&self) -> Option<GamePhase> {
        self.game.as_ref().map(|g| g.state)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    fn snapshot(game_id: &str, players: Vec<Player>) -> GameSnapshot {
        GameSnapshot {
            game_id: game_id.into(),
            players,
            ..Default::default()
        }
    }

    fn two_player_game() -> GameSnapshot {
        snapshot(
            "MANGO",
            vec![Player::new("p1", "Ann"), Player::new("p2", "Ben")],
        )
    }

    /// A state that has completed the join + handshake flow.
    fn in_game_state(store: &MemoryStore) -> SessionState {
        let mut state = SessionState::new();
        state.apply(&ServerEvent::Connect, store);
        state.apply(
            &ServerEvent::PlayerJoined {
                game: two_player_game(),
                player: Player::new("p1", "Ann"),
            },
            store,
        );
        state.apply(
            &ServerEvent::PlayerId {
                player_id: "p1".into(),
                session_key: "k1".into(),
            },
            store,
        );
        state
    }

    #[test]
    fn connect_marks_connected_without_touching_snapshot() {
        let store = MemoryStore::new();
        let mut state = SessionState::new();
        state.game = Some(two_player_game());

        state.apply(&ServerEvent::Connect, &store);
        assert!(state.is_connected);
        assert!(state.game.is_some());
    }

    #[test]
    fn disconnect_retains_snapshot_and_identity() {
        let store = MemoryStore::new();
        let mut state = in_game_state(&store);

        state.apply(&ServerEvent::Disconnect { reason: None }, &store);
        assert!(!state.is_connected);
        assert!(state.game.is_some());
        assert!(state.in_session());
    }

    #[test]
    fn join_then_handshake_establishes_session() {
        let store = MemoryStore::new();
        let mut state = SessionState::new();
        assert!(!state.in_session());

        state.apply(
            &ServerEvent::PlayerJoined {
                game: snapshot("R1", vec![Player::new("p1", "Ann")]),
                player: Player::new("p1", "Ann"),
            },
            &store,
        );
        state.apply(
            &ServerEvent::PlayerId {
                player_id: "p1".into(),
                session_key: "k1".into(),
            },
            &store,
        );

        assert!(state.in_session());
        assert_eq!(state.game_id, "R1");
        assert_eq!(state.session_key, "k1");
        assert_eq!(state.this_player().unwrap().name, "Ann");
    }

    #[test]
    fn player_joined_names_the_joiner() {
        let store = MemoryStore::new();
        let mut state = in_game_state(&store);

        let mut game = two_player_game();
        game.players.push(Player::new("p3", "Cal"));
        state.apply(
            &ServerEvent::PlayerJoined {
                game,
                player: Player::new("p3", "Cal"),
            },
            &store,
        );
        assert_eq!(state.message, "Cal joined the game");
        assert_eq!(state.game.as_ref().unwrap().players.len(), 3);
    }

    #[test]
    fn player_joined_does_not_announce_self() {
        let store = MemoryStore::new();
        let mut state = in_game_state(&store);
        state.message.clear();

        state.apply(
            &ServerEvent::PlayerJoined {
                game: two_player_game(),
                player: Player::new("p1", "Ann"),
            },
            &store,
        );
        assert!(state.message.is_empty());
    }

    #[test]
    fn identity_handshake_persists_session() {
        let store = MemoryStore::new();
        let state = in_game_state(&store);

        let stored = store.read().unwrap();
        assert_eq!(stored.game_id, state.game_id);
        assert_eq!(stored.player_id, "p1");
        assert_eq!(stored.session_key, "k1");
    }

    #[test]
    fn player_left_replaces_snapshot_and_sets_message() {
        let store = MemoryStore::new();
        let mut state = in_game_state(&store);

        state.apply(
            &ServerEvent::PlayerLeft {
                game: snapshot("MANGO", vec![Player::new("p1", "Ann")]),
                player: Player::new("p2", "Ben"),
            },
            &store,
        );
        assert_eq!(state.message, "Ben left the game");
        assert_eq!(state.game.as_ref().unwrap().players.len(), 1);
        assert!(state.in_session());
    }

    #[test]
    fn removal_of_self_clears_everything() {
        let store = MemoryStore::new();
        let mut state = in_game_state(&store);

        state.apply(
            &ServerEvent::PlayerRemoved {
                game: snapshot("MANGO", vec![Player::new("p2", "Ben")]),
                player: Player::new("p1", "Ann"),
            },
            &store,
        );

        assert!(state.game_id.is_empty());
        assert!(state.player_id.is_empty());
        assert!(state.session_key.is_empty());
        assert!(state.game.is_none());
        assert!(!state.in_session());
        assert_eq!(state.message, "You have been removed from the game");
        // Persisted record is gone, so no silent rejoin can happen.
        assert!(store.read().is_none());
    }

    #[test]
    fn removal_of_other_player_keeps_identity() {
        let store = MemoryStore::new();
        let mut state = in_game_state(&store);
        let others_before = state.other_players().len();

        state.apply(
            &ServerEvent::PlayerRemoved {
                game: snapshot("MANGO", vec![Player::new("p1", "Ann")]),
                player: Player::new("p2", "Ben"),
            },
            &store,
        );

        assert!(state.in_session());
        assert_eq!(state.player_id, "p1");
        assert_eq!(state.other_players().len(), others_before - 1);
        assert_eq!(state.message, "Ben was removed from the game");
    }

    #[test]
    fn game_update_without_game_is_a_full_reset() {
        let store = MemoryStore::new();
        let mut state = in_game_state(&store);

        state.apply(&ServerEvent::GameUpdate { game: None }, &store);

        assert!(state.game_id.is_empty());
        assert!(state.player_id.is_empty());
        assert!(state.session_key.is_empty());
        assert!(state.game.is_none());
        assert!(state.message.is_empty());
        assert!(store.read().is_none());
        // Connection liveness is not part of the reset.
        assert!(state.is_connected);
    }

    #[test]
    fn game_update_with_game_replaces_snapshot() {
        let store = MemoryStore::new();
        let mut state = in_game_state(&store);

        let mut game = two_player_game();
        game.state = GamePhase::WritingAnswers;
        game.current_topic = "Things you shouldn't say".into();
        state.apply(&ServerEvent::GameUpdate { game: Some(game) }, &store);

        assert_eq!(state.phase(), Some(GamePhase::WritingAnswers));
        assert!(state.in_session());
    }

    #[test]
    fn error_event_only_sets_message() {
        let store = MemoryStore::new();
        let mut state = in_game_state(&store);
        let before = state.clone();

        state.apply(
            &ServerEvent::Error {
                error: "Incorrect password".into(),
            },
            &store,
        );

        assert_eq!(state.message, "Incorrect password");
        assert_eq!(state.game, before.game);
        assert_eq!(state.game_id, before.game_id);
        assert_eq!(state.player_id, before.player_id);
    }

    #[test]
    fn game_bearing_events_are_idempotent() {
        let store = MemoryStore::new();
        let mut state = in_game_state(&store);

        let event = ServerEvent::RoundStarted {
            game: two_player_game(),
        };
        state.apply(&event, &store);
        let after_first = state.clone();
        state.apply(&event, &store);

        assert_eq!(state, after_first);
    }

    #[test]
    fn snapshot_replace_drops_stale_round_fields() {
        let store = MemoryStore::new();
        let mut state = in_game_state(&store);

        let mut mid_round = two_player_game();
        mid_round.state = GamePhase::WritingAnswers;
        mid_round.current_topic = "Things that are sticky".into();
        state.apply(&ServerEvent::TopicSet { game: mid_round }, &store);
        assert!(!state.normalized_topic().is_empty());

        // Round end sends a complete snapshot with the topic cleared; the
        // wholesale replace must not leave the old topic behind.
        let mut round_end = two_player_game();
        round_end.state = GamePhase::RoundComplete;
        state.apply(&ServerEvent::RoundStarted { game: round_end }, &store);
        assert!(state.normalized_topic().is_empty());
    }

    #[test]
    fn at_most_one_player_matches_local_identity() {
        let store = MemoryStore::new();
        let state = in_game_state(&store);

        let matching = state
            .game
            .as_ref()
            .unwrap()
            .players
            .iter()
            .filter(|p| p.id == state.player_id)
            .count();
        assert_eq!(matching, 1);
    }

    #[test]
    fn this_player_absent_when_no_identity_or_no_game() {
        let mut state = SessionState::new();
        assert!(state.this_player().is_none());

        state.game = Some(two_player_game());
        // Identity unset: empty player id never matches a record.
        assert!(state.this_player().is_none());
    }

    #[test]
    fn other_guessers_excludes_self_and_revealed_answers() {
        let store = MemoryStore::new();
        let mut state = in_game_state(&store);

        let mut game = two_player_game();
        game.players[0].submitted_answer = true; // self, locked in
        game.players[1].submitted_answer = true; // other, locked in
        game.players.push(Player {
            submitted_answer: true,
            answer: "revealed".into(),
            ..Player::new("p3", "Cal")
        });
        game.players.push(Player::new("p4", "Dee")); // nothing submitted
        state.apply(&ServerEvent::GameUpdate { game: Some(game) }, &store);

        let guessers = state.other_guessers();
        assert_eq!(guessers.len(), 1);
        assert_eq!(guessers[0].id, "p2");
    }

    #[test]
    fn other_players_preserve_arrival_order() {
        let store = MemoryStore::new();
        let mut state = in_game_state(&store);

        let game = snapshot(
            "MANGO",
            vec![
                Player::new("p2", "Ben"),
                Player::new("p1", "Ann"),
                Player::new("p3", "Cal"),
            ],
        );
        state.apply(&ServerEvent::GameUpdate { game: Some(game) }, &store);

        let others: Vec<&str> = state.other_players().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(others, vec!["p2", "p3"]);
    }

    #[test]
    fn match_result_names_the_matched_player() {
        let store = MemoryStore::new();
        let mut state = in_game_state(&store);

        state.apply(
            &ServerEvent::MatchResult {
                game: two_player_game(),
                matched_player_id: "p2".into(),
                matched_answer: "a banjo".into(),
            },
            &store,
        );
        assert_eq!(state.message, "Ben wrote \"a banjo\"");

        state.apply(
            &ServerEvent::MatchResult {
                game: two_player_game(),
                matched_player_id: String::new(),
                matched_answer: String::new(),
            },
            &store,
        );
        assert_eq!(state.message, "The guess did not match");
    }

    #[test]
    fn normalized_topic_lowercases_first_character() {
        let store = MemoryStore::new();
        let mut state = in_game_state(&store);

        let mut game = two_player_game();
        game.current_topic = "Things you hide".into();
        state.apply(&ServerEvent::TopicSet { game }, &store);
        assert_eq!(state.normalized_topic(), "things you hide");
    }

    #[test]
    fn normalized_topic_empty_without_game() {
        let state = SessionState::new();
        assert!(state.normalized_topic().is_empty());
        assert!(state.phase().is_none());
    }

    #[test]
    fn rehydrate_seeds_identity_from_store() {
        let store = MemoryStore::new();
        store.write(
            &StoredSession {
                game_id: "MANGO".into(),
                player_id: "p1".into(),
                session_key: "k1".into(),
                color: "teal".into(),
            },
            SESSION_TTL,
        );

        let state = SessionState::rehydrate(&store);
        assert!(state.in_session());
        assert_eq!(state.color, "teal");
        // No live event has arrived yet: no snapshot, not connected.
        assert!(state.game.is_none());
        assert!(!state.is_connected);
    }

    #[test]
    fn rehydrate_ignores_expired_record() {
        let store = MemoryStore::new();
        store.write(
            &StoredSession {
                game_id: "MANGO".into(),
                player_id: "p1".into(),
                session_key: "k1".into(),
                color: String::new(),
            },
            Duration::ZERO,
        );

        let state = SessionState::rehydrate(&store);
        assert!(!state.in_session());
    }

    #[test]
    fn room_listing_leaves_session_untouched() {
        let store = MemoryStore::new();
        let mut state = in_game_state(&store);
        let before = state.clone();

        state.apply(
            &ServerEvent::Games {
                games: vec![crate::protocol::GameListing {
                    id: "PEACH".into(),
                    name: "other room".into(),
                    password_protected: true,
                    password_salt: "s1".into(),
                }],
            },
            &store,
        );

        assert_eq!(state, before);
    }

    #[test]
    fn note_protocol_error_leaves_state_intact() {
        let store = MemoryStore::new();
        let mut state = in_game_state(&store);
        let game_before = state.game.clone();

        state.note_protocol_error();
        assert!(!state.message.is_empty());
        assert_eq!(state.game, game_before);
        assert!(state.in_session());
    }

    #[test]
    fn in_session_requires_both_ids() {
        let mut state = SessionState::new();
        assert!(!state.in_session());
        state.game_id = "MANGO".into();
        assert!(!state.in_session());
        state.player_id = "p1".into();
        assert!(state.in_session());
        // Clearing the session key alone keeps the session linkage.
        state.session_key.clear();
        assert!(state.in_session());
    }
}
