#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Protocol serialization tests for the Things game client.
//!
//! Verifies the `{"event": ..., "data": ...}` envelope for inbound and
//! outbound messages, JSON fixtures matching real server output, and the
//! lenient-deserialization guarantees (missing optional fields, unknown
//! phase labels).

use things_game_client::protocol::{
    ClientRequest, GameListing, GamePhase, GameSnapshot, Player, ServerEvent,
};

// ── Helper ──────────────────────────────────────────────────────────

/// Serialize `val` to JSON, then deserialize back to `T` and return it.
fn round_trip<T: serde::Serialize + serde::de::DeserializeOwned>(val: &T) -> T {
    let json = serde_json::to_string(val).expect("serialize");
    serde_json::from_str(&json).expect("deserialize")
}

fn sample_game() -> GameSnapshot {
    GameSnapshot {
        game_id: "MANGO".into(),
        name: "Friday night".into(),
        score_limit: 11,
        state: GamePhase::WritingAnswers,
        players: vec![Player::new("p1", "Ann"), Player::new("p2", "Ben")],
        current_topic: "Things that are sticky".into(),
        ..Default::default()
    }
}

// ── Envelope shape ──────────────────────────────────────────────────

#[test]
fn server_event_uses_event_data_envelope() {
    let json = serde_json::to_string(&ServerEvent::PlayerId {
        player_id: "p1".into(),
        session_key: "k1".into(),
    })
    .expect("serialize");
    let raw: serde_json::Value = serde_json::from_str(&json).expect("parse");
    assert_eq!(raw["event"], "player_id");
    assert_eq!(raw["data"]["player_id"], "p1");
    assert_eq!(raw["data"]["session_key"], "k1");
}

#[test]
fn client_request_uses_event_data_envelope() {
    let json = serde_json::to_string(&ClientRequest::JoinGame {
        game_id: "MANGO".into(),
        player_name: "Ann".into(),
        password: String::new(),
        observer: false,
    })
    .expect("serialize");
    let raw: serde_json::Value = serde_json::from_str(&json).expect("parse");
    assert_eq!(raw["event"], "join_game");
    assert_eq!(raw["data"]["game_id"], "MANGO");
    assert_eq!(raw["data"]["player_name"], "Ann");
}

#[test]
fn get_games_serializes_without_data() {
    let json = serde_json::to_string(&ClientRequest::GetGames).expect("serialize");
    assert_eq!(json, r#"{"event":"get_games"}"#);
}

#[test]
fn connect_event_serializes_without_data() {
    let json = serde_json::to_string(&ServerEvent::Connect).expect("serialize");
    assert_eq!(json, r#"{"event":"connect"}"#);
}

// ── Round trips ─────────────────────────────────────────────────────

#[test]
fn player_joined_round_trip() {
    let event = ServerEvent::PlayerJoined {
        game: sample_game(),
        player: Player::new("p2", "Ben"),
    };
    assert_eq!(round_trip(&event), event);
}

#[test]
fn player_removed_round_trip() {
    let event = ServerEvent::PlayerRemoved {
        game: sample_game(),
        player: Player::new("p1", "Ann"),
    };
    assert_eq!(round_trip(&event), event);
}

#[test]
fn match_result_round_trip() {
    let event = ServerEvent::MatchResult {
        game: sample_game(),
        matched_player_id: "p2".into(),
        matched_answer: "a banjo".into(),
    };
    assert_eq!(round_trip(&event), event);
}

#[test]
fn game_update_round_trip_with_and_without_game() {
    let with = ServerEvent::GameUpdate {
        game: Some(sample_game()),
    };
    assert_eq!(round_trip(&with), with);

    let without = ServerEvent::GameUpdate { game: None };
    assert_eq!(round_trip(&without), without);
}

#[test]
fn error_round_trip() {
    let event = ServerEvent::Error {
        error: "Unable to find game".into(),
    };
    assert_eq!(round_trip(&event), event);
}

#[test]
fn rejoin_game_round_trip() {
    let req = ClientRequest::RejoinGame {
        game_id: "MANGO".into(),
        player_id: "p1".into(),
        session_key: "k1".into(),
    };
    assert_eq!(round_trip(&req), req);
}

#[test]
fn submit_match_round_trip() {
    let req = ClientRequest::SubmitMatch {
        game_id: "MANGO".into(),
        player_id: "p1".into(),
        answer: "a banjo".into(),
        guessed_player_id: "p2".into(),
    };
    assert_eq!(round_trip(&req), req);
}

// ── Fixtures matching real server output ────────────────────────────

/// The server's `send_update` emits the full serialized game plus the
/// subject player. This fixture mirrors that exact shape.
#[test]
fn player_joined_fixture_from_server() {
    let json = r#"{
        "event": "player_joined",
        "data": {
            "game": {
                "game_id": "MANGO",
                "name": "Friday night",
                "score_limit": 11,
                "state": "not_started",
                "players": [
                    {"id": "p1", "name": "Ann", "is_owner": true, "score": 0},
                    {"id": "p2", "name": "Ben", "score": 0}
                ],
                "observers": [],
                "topic_writer": null,
                "guesser": null,
                "current_topic": "",
                "unguessed_answers": []
            },
            "player": {"id": "p2", "name": "Ben"}
        }
    }"#;

    let event: ServerEvent = serde_json::from_str(json).expect("deserialize fixture");
    if let ServerEvent::PlayerJoined { game, player } = event {
        assert_eq!(game.game_id, "MANGO");
        assert_eq!(game.state, GamePhase::NotStarted);
        assert_eq!(game.players.len(), 2);
        assert!(game.players[0].is_owner);
        assert_eq!(player.name, "Ben");
    } else {
        panic!("expected PlayerJoined");
    }
}

#[test]
fn mid_round_fixture_carries_round_fields() {
    let json = r#"{
        "event": "topic_set",
        "data": {
            "game": {
                "game_id": "MANGO",
                "state": "writing_answers",
                "players": [
                    {"id": "p1", "name": "Ann", "is_topic_writer": true},
                    {"id": "p2", "name": "Ben", "submitted_answer": true}
                ],
                "topic_writer": {"id": "p1", "name": "Ann", "is_topic_writer": true},
                "current_topic": "Things that are sticky"
            }
        }
    }"#;

    let event: ServerEvent = serde_json::from_str(json).expect("deserialize fixture");
    if let ServerEvent::TopicSet { game } = event {
        assert_eq!(game.state, GamePhase::WritingAnswers);
        assert_eq!(game.current_topic, "Things that are sticky");
        assert_eq!(game.topic_writer.unwrap().id, "p1");
        assert!(game.players[1].submitted_answer);
    } else {
        panic!("expected TopicSet");
    }
}

#[test]
fn games_fixture_carries_password_metadata() {
    let json = r#"{
        "event": "games",
        "data": {
            "games": [
                {"id": "MANGO", "name": "Friday night", "password_protected": false, "password_salt": ""},
                {"id": "PEACH", "name": "locked room", "password_protected": true, "password_salt": "s1"}
            ]
        }
    }"#;

    let event: ServerEvent = serde_json::from_str(json).expect("deserialize fixture");
    if let ServerEvent::Games { games } = event {
        assert_eq!(games.len(), 2);
        assert_eq!(
            games[1],
            GameListing {
                id: "PEACH".into(),
                name: "locked room".into(),
                password_protected: true,
                password_salt: "s1".into(),
            }
        );
    } else {
        panic!("expected Games");
    }
}

#[test]
fn empty_games_listing_deserializes() {
    let json = r#"{"event":"games","data":{"games":[]}}"#;
    let event: ServerEvent = serde_json::from_str(json).expect("deserialize");
    assert_eq!(event, ServerEvent::Games { games: vec![] });
}

#[test]
fn player_id_fixture_without_session_key() {
    // Older servers send only the player id on create_game.
    let json = r#"{"event":"player_id","data":{"player_id":"p1"}}"#;
    let event: ServerEvent = serde_json::from_str(json).expect("deserialize");
    if let ServerEvent::PlayerId {
        player_id,
        session_key,
    } = event
    {
        assert_eq!(player_id, "p1");
        assert!(session_key.is_empty());
    } else {
        panic!("expected PlayerId");
    }
}

// ── Leniency ────────────────────────────────────────────────────────

#[test]
fn minimal_game_payload_deserializes_with_defaults() {
    let json = r#"{"event":"game_update","data":{"game":{"game_id":"MANGO"}}}"#;
    let event: ServerEvent = serde_json::from_str(json).expect("deserialize");
    if let ServerEvent::GameUpdate { game: Some(game) } = event {
        assert_eq!(game.game_id, "MANGO");
        assert_eq!(game.state, GamePhase::NotStarted);
        assert!(game.players.is_empty());
        assert!(game.current_topic.is_empty());
        assert!(game.topic_writer.is_none());
    } else {
        panic!("expected GameUpdate with a game");
    }
}

#[test]
fn game_update_with_missing_game_field_is_none() {
    let json = r#"{"event":"game_update","data":{}}"#;
    let event: ServerEvent = serde_json::from_str(json).expect("deserialize");
    assert_eq!(event, ServerEvent::GameUpdate { game: None });
}

#[test]
fn unknown_phase_label_maps_to_unknown() {
    let json = r#"{"event":"game_update","data":{"game":{"game_id":"M","state":"lightning_round"}}}"#;
    let event: ServerEvent = serde_json::from_str(json).expect("deserialize");
    if let ServerEvent::GameUpdate { game: Some(game) } = event {
        assert_eq!(game.state, GamePhase::Unknown);
    } else {
        panic!("expected GameUpdate with a game");
    }
}

#[test]
fn player_missing_flags_defaults_to_false() {
    let json = r#"{"id":"p1","name":"Ann"}"#;
    let player: Player = serde_json::from_str(json).expect("deserialize");
    assert!(!player.is_owner);
    assert!(!player.submitted_answer);
    assert!(player.answer.is_empty());
    assert_eq!(player.score, 0);
}

#[test]
fn player_missing_required_fields_is_an_error() {
    // id and name are the only required fields; losing them is a real
    // protocol violation, not something to paper over.
    let json = r#"{"score": 3}"#;
    assert!(serde_json::from_str::<Player>(json).is_err());
}

#[test]
fn unrecognized_event_name_is_an_error() {
    let json = r#"{"event":"confetti","data":{}}"#;
    assert!(serde_json::from_str::<ServerEvent>(json).is_err());
}

#[test]
fn phase_labels_serialize_snake_case() {
    assert_eq!(
        serde_json::to_string(&GamePhase::WritingTopic).unwrap(),
        r#""writing_topic""#
    );
    assert_eq!(
        serde_json::to_string(&GamePhase::RoundComplete).unwrap(),
        r#""round_complete""#
    );
    let parsed: GamePhase = serde_json::from_str(r#""game_over""#).unwrap();
    assert_eq!(parsed, GamePhase::GameOver);
}
