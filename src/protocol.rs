//! Wire types for the Things game protocol.
//!
//! The server speaks socket.io-style named events: every frame is a JSON
//! object of the shape `{"event": "<name>", "data": {...}}`. [`ServerEvent`]
//! and [`ClientRequest`] model the inbound and outbound halves of that
//! envelope as closed enums, so handling a new event kind is a
//! compile-time-checked change rather than a string-keyed lookup.
//!
//! Inbound payloads are deliberately lenient: every field the client can
//! tolerate losing carries `#[serde(default)]`, so a partial payload degrades
//! to defaults instead of poisoning the whole event stream.

use serde::{Deserialize, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for players.
///
/// The server issues short word-list ids, not UUIDs, so ids are plain strings.
/// The empty string denotes "no player".
pub type PlayerId = String;

/// Unique identifier for game rooms. The empty string denotes "no game".
pub type GameId = String;

// ── Enums ───────────────────────────────────────────────────────────

/// Lifecycle phase of a game, as declared by the server.
///
/// The client never drives phase transitions itself; it only reflects the
/// label the server sent. `Unknown` absorbs labels introduced by newer
/// servers so an unrecognized phase never fails deserialization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    /// Lobby: players are gathering, the owner has not started the game.
    #[default]
    NotStarted,
    /// The current topic writer is choosing a topic.
    WritingTopic,
    /// Players are writing answers for the current topic.
    WritingAnswers,
    /// Guessers are matching answers to players.
    Matching,
    /// The round is over; scores have been applied.
    RoundComplete,
    /// A player reached the score limit.
    GameOver,
    /// A phase label this client version does not know about.
    #[serde(other)]
    Unknown,
}

// ── Structs ─────────────────────────────────────────────────────────

/// A player record inside a [`GameSnapshot`].
///
/// Only `id` and `name` are required on the wire; every flag defaults to its
/// zero value when the server omits it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Observers watch the game but never write answers or guess.
    #[serde(default)]
    pub is_observer: bool,
    /// The game owner is the only player allowed to start the game.
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub is_topic_writer: bool,
    #[serde(default)]
    pub is_guessing: bool,
    /// Whether this player has locked in an answer for the current round.
    #[serde(default)]
    pub submitted_answer: bool,
    /// The player's answer, revealed once it has been matched. Empty while
    /// the answer is still hidden (or none was submitted).
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub score: i64,
}

impl Player {
    /// Create a player record with the given id and name; all flags default.
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_observer: false,
            is_owner: false,
            is_topic_writer: false,
            is_guessing: false,
            submitted_answer: false,
            answer: String::new(),
            score: 0,
        }
    }
}

/// The complete current game state as declared by the server.
///
/// Every game-bearing event carries one of these, and the reducer replaces
/// its previous snapshot wholesale — the server is authoritative and sends
/// complete state, so merging fields would risk stale leftovers (e.g. a
/// `current_topic` surviving past round end).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GameSnapshot {
    pub game_id: GameId,
    /// Human-readable room name.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub score_limit: u32,
    #[serde(default)]
    pub state: GamePhase,
    /// Active players in arrival order. Order is significant: turn-taking
    /// display walks this list.
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub observers: Vec<Player>,
    /// The player writing this round's topic, while one is assigned.
    #[serde(default)]
    pub topic_writer: Option<Player>,
    /// The player currently guessing, during the matching phase.
    #[serde(default)]
    pub guesser: Option<Player>,
    /// The round's topic; empty outside a round.
    #[serde(default)]
    pub current_topic: String,
    /// Shuffled answers not yet matched to a player.
    #[serde(default)]
    pub unguessed_answers: Vec<String>,
}

/// One room in the server's public listing, as returned for a
/// [`GetGames`](ClientRequest::GetGames) request.
///
/// `password_salt` is included so a client can hash a password attempt
/// before sending [`JoinGame`](ClientRequest::JoinGame).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GameListing {
    pub id: GameId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password_protected: bool,
    #[serde(default)]
    pub password_salt: String,
}

// ── Inbound events ──────────────────────────────────────────────────

/// Events delivered by the server (plus the two connection-lifecycle events
/// synthesized by the client's transport loop).
///
/// `Connect` and `Disconnect` never appear on the wire — the transport loop
/// injects them around transport liveness changes — but they are variants
/// here so the session reducer is a single exhaustive `match`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Transport came up. Synthesized locally, never parsed off the wire.
    Connect,
    /// Transport went down. Synthesized locally, never parsed off the wire.
    /// `reason` is `None` when the server closed the connection cleanly.
    Disconnect {
        #[serde(default)]
        reason: Option<String>,
    },
    /// A player joined the room (possibly this client).
    PlayerJoined { game: GameSnapshot, player: Player },
    /// A player left the room voluntarily.
    PlayerLeft { game: GameSnapshot, player: Player },
    /// A player was removed from the room (possibly this client).
    PlayerRemoved { game: GameSnapshot, player: Player },
    /// Post-join handshake assigning this client its identity.
    PlayerId {
        player_id: PlayerId,
        #[serde(default)]
        session_key: String,
    },
    /// The owner started the game.
    GameStarted { game: GameSnapshot },
    /// A new round began.
    RoundStarted { game: GameSnapshot },
    /// The topic writer chose a topic.
    TopicSet { game: GameSnapshot },
    /// A player locked in an answer.
    AnswerSubmitted { game: GameSnapshot },
    /// A guesser's match attempt resolved. `matched_player_id` and
    /// `matched_answer` are empty when the guess missed.
    MatchResult {
        game: GameSnapshot,
        #[serde(default)]
        matched_player_id: PlayerId,
        #[serde(default)]
        matched_answer: String,
    },
    /// All scores were reset to zero.
    PointsReset { game: GameSnapshot },
    /// Unsolicited full-state refresh. A missing `game` means the room was
    /// torn down and the client must fully reset.
    GameUpdate {
        #[serde(default)]
        game: Option<GameSnapshot>,
    },
    /// The public room listing, in reply to [`GetGames`](ClientRequest::GetGames).
    /// Not tied to any session; the reducer ignores it.
    Games {
        #[serde(default)]
        games: Vec<GameListing>,
    },
    /// The server rejected a request.
    Error { error: String },
}

// ── Outbound requests ───────────────────────────────────────────────

/// Requests sent by the client, one per server-side handler.
///
/// Only [`RejoinGame`](ClientRequest::RejoinGame) is emitted by the client
/// core itself (silent rejoin after reconnect); the rest are issued through
/// [`ThingsClient`](crate::ThingsClient) API methods.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Request the public room listing; answered with
    /// [`Games`](ServerEvent::Games).
    GetGames,
    /// Create a new room and join it as the owner.
    CreateGame {
        name: String,
        player_name: String,
        #[serde(default)]
        password: String,
        #[serde(default)]
        salt: String,
        #[serde(default)]
        observer: bool,
    },
    /// Join an existing room.
    JoinGame {
        game_id: GameId,
        player_name: String,
        #[serde(default)]
        password: String,
        #[serde(default)]
        observer: bool,
    },
    /// Silently rejoin a room using persisted identity after a reconnect.
    RejoinGame {
        game_id: GameId,
        player_id: PlayerId,
        session_key: String,
    },
    /// Leave the current room.
    LeaveGame { game_id: GameId, player_id: PlayerId },
    /// Start the game (owner only).
    StartGame { game_id: GameId, player_id: PlayerId },
    /// Set the round topic (topic writer only).
    SetTopic {
        game_id: GameId,
        player_id: PlayerId,
        topic: String,
    },
    /// Submit an answer for the current topic.
    SubmitAnswer {
        game_id: GameId,
        player_id: PlayerId,
        answer: String,
    },
    /// Guess which player wrote an answer (current guesser only).
    SubmitMatch {
        game_id: GameId,
        player_id: PlayerId,
        answer: String,
        guessed_player_id: PlayerId,
    },
}
