#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration-style client tests for the Things game client.
//!
//! Uses the shared `MockTransport` from `tests/common` to script server
//! events and verify that `ThingsClient` folds them into the session
//! correctly: join/handshake flows, destructive resets, reconnect rejoin,
//! and request encoding.

mod common;

use std::sync::Arc;
use std::time::Duration;

use things_game_client::protocol::{ClientRequest, GamePhase, Player, ServerEvent};
use things_game_client::{
    CredentialStore, JoinGameParams, MemoryStore, ThingsClient, ThingsClientError, ThingsConfig,
};

use common::{
    error_json, game_started_json, game_update_json, game_with_players, player_id_json,
    player_joined_json, player_left_json, player_removed_json, topic_set_json, two_player_game,
    MockTransport,
};

// ── Helpers ─────────────────────────────────────────────────────────

/// Start a client over a scripted transport with the given store.
fn start_client(
    incoming: Vec<Option<Result<String, ThingsClientError>>>,
    store: Arc<dyn CredentialStore>,
) -> (
    ThingsClient,
    tokio::sync::mpsc::Receiver<ServerEvent>,
    Arc<std::sync::Mutex<Vec<String>>>,
) {
    let (transport, sent, _closed) = MockTransport::new(incoming);
    let config = ThingsConfig::new().with_store(store);
    let (client, events) = ThingsClient::start(transport, config);
    (client, events, sent)
}

/// The scripted frames for a complete join + identity handshake as p1/Ann.
fn join_flow() -> Vec<Option<Result<String, ThingsClientError>>> {
    vec![
        Some(Ok(player_joined_json(
            two_player_game(),
            Player::new("p1", "Ann"),
        ))),
        Some(Ok(player_id_json("p1", "k1"))),
    ]
}

/// Consume the synthetic Connect event that always arrives first.
async fn drain_connect(rx: &mut tokio::sync::mpsc::Receiver<ServerEvent>) {
    let ev = rx.recv().await.expect("expected Connect event");
    assert!(
        matches!(ev, ServerEvent::Connect),
        "first event should be Connect, got {ev:?}"
    );
}

// ── Join flow ───────────────────────────────────────────────────────

#[tokio::test]
async fn join_flow_establishes_session() {
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
    let (mut client, mut events, _sent) = start_client(join_flow(), Arc::clone(&store));

    drain_connect(&mut events).await;
    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, ServerEvent::PlayerJoined { .. }));
    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, ServerEvent::PlayerId { .. }));

    let session = client.session().await;
    assert!(session.in_session());
    assert_eq!(session.game_id, "MANGO");
    assert_eq!(session.this_player().unwrap().name, "Ann");
    assert_eq!(session.other_players().len(), 1);

    // Identity was written through for silent rejoin.
    let stored = store.read().unwrap();
    assert_eq!(stored.player_id, "p1");
    assert_eq!(stored.session_key, "k1");

    client.shutdown().await;
}

#[tokio::test]
async fn game_progression_updates_phase_and_topic() {
    let mut incoming = join_flow();
    incoming.push(Some(Ok(game_started_json(two_player_game()))));
    incoming.push(Some(Ok(topic_set_json(
        two_player_game(),
        "Things you would never say to your boss",
    ))));

    let (mut client, mut events, _sent) =
        start_client(incoming, Arc::new(MemoryStore::new()));

    drain_connect(&mut events).await;
    let _ = events.recv().await; // PlayerJoined
    let _ = events.recv().await; // PlayerId
    let _ = events.recv().await; // GameStarted
    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, ServerEvent::TopicSet { .. }));

    let session = client.session().await;
    assert_eq!(session.phase(), Some(GamePhase::WritingAnswers));
    assert_eq!(
        session.normalized_topic(),
        "things you would never say to your boss"
    );
    assert_eq!(session.message, "The topic has been set");

    client.shutdown().await;
}

// ── Removal paths ───────────────────────────────────────────────────

#[tokio::test]
async fn third_party_removal_keeps_local_identity() {
    let mut incoming = join_flow();
    incoming.push(Some(Ok(player_removed_json(
        game_with_players("MANGO", vec![Player::new("p1", "Ann")]),
        Player::new("p2", "Ben"),
    ))));

    let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
    let (mut client, mut events, _sent) = start_client(incoming, Arc::clone(&store));

    drain_connect(&mut events).await;
    let _ = events.recv().await; // PlayerJoined
    let _ = events.recv().await; // PlayerId
    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, ServerEvent::PlayerRemoved { .. }));

    let session = client.session().await;
    assert!(session.in_session());
    assert!(session.other_players().is_empty());
    assert_eq!(session.message, "Ben was removed from the game");
    assert!(store.read().is_some());

    client.shutdown().await;
}

#[tokio::test]
async fn self_removal_fully_resets() {
    let mut incoming = join_flow();
    incoming.push(Some(Ok(player_removed_json(
        game_with_players("MANGO", vec![Player::new("p2", "Ben")]),
        Player::new("p1", "Ann"),
    ))));

    let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
    let (mut client, mut events, _sent) = start_client(incoming, Arc::clone(&store));

    drain_connect(&mut events).await;
    let _ = events.recv().await; // PlayerJoined
    let _ = events.recv().await; // PlayerId
    let _ = events.recv().await; // PlayerRemoved

    let session = client.session().await;
    assert!(!session.in_session());
    assert!(session.game.is_none());
    assert!(session.session_key.is_empty());
    assert_eq!(session.message, "You have been removed from the game");
    // The persisted record must be gone too: no zombie rejoin.
    assert!(store.read().is_none());

    client.shutdown().await;
}

#[tokio::test]
async fn game_teardown_fully_resets() {
    let mut incoming = join_flow();
    incoming.push(Some(Ok(game_update_json(None))));

    let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
    let (mut client, mut events, _sent) = start_client(incoming, Arc::clone(&store));

    drain_connect(&mut events).await;
    let _ = events.recv().await; // PlayerJoined
    let _ = events.recv().await; // PlayerId
    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, ServerEvent::GameUpdate { game: None }));

    let session = client.session().await;
    assert!(!session.in_session());
    assert!(session.game.is_none());
    assert!(session.message.is_empty());
    assert!(store.read().is_none());

    client.shutdown().await;
}

// ── Reconnect / rejoin ──────────────────────────────────────────────

#[tokio::test]
async fn restart_with_persisted_session_rejoins() {
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());

    // First run: join, then shut down (simulating a page close).
    {
        let (mut client, mut events, _sent) = start_client(join_flow(), Arc::clone(&store));
        drain_connect(&mut events).await;
        let _ = events.recv().await; // PlayerJoined
        let _ = events.recv().await; // PlayerId
        client.shutdown().await;
    }

    // Second run over the same store: the loop must emit rejoin_game
    // before anything else, using the persisted identity.
    let (mut client, mut events, sent) = start_client(vec![], Arc::clone(&store));
    drain_connect(&mut events).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    {
        let messages = sent.lock().unwrap();
        assert_eq!(messages.len(), 1);
        let req: ClientRequest = serde_json::from_str(&messages[0]).unwrap();
        assert_eq!(
            req,
            ClientRequest::RejoinGame {
                game_id: "MANGO".into(),
                player_id: "p1".into(),
                session_key: "k1".into(),
            }
        );
    }

    client.shutdown().await;
}

#[tokio::test]
async fn disconnect_preserves_session_for_reconnecting_view() {
    let mut incoming = join_flow();
    incoming.push(None); // server closes the connection

    let (mut client, mut events, _sent) =
        start_client(incoming, Arc::new(MemoryStore::new()));

    drain_connect(&mut events).await;
    let _ = events.recv().await; // PlayerJoined
    let _ = events.recv().await; // PlayerId
    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, ServerEvent::Disconnect { reason: None }));

    let session = client.session().await;
    assert!(!session.is_connected);
    assert!(session.in_session());
    assert!(session.game.is_some());

    client.shutdown().await;
}

// ── Error handling ──────────────────────────────────────────────────

#[tokio::test]
async fn server_error_surfaces_as_message_only() {
    let mut incoming = join_flow();
    incoming.push(Some(Ok(error_json("Incorrect password"))));

    let (mut client, mut events, _sent) =
        start_client(incoming, Arc::new(MemoryStore::new()));

    drain_connect(&mut events).await;
    let _ = events.recv().await; // PlayerJoined
    let _ = events.recv().await; // PlayerId
    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, ServerEvent::Error { .. }));

    let session = client.session().await;
    assert_eq!(session.message, "Incorrect password");
    assert!(session.in_session());
    assert!(session.game.is_some());

    client.shutdown().await;
}

#[tokio::test]
async fn poisoned_frame_does_not_break_subsequent_events() {
    let mut incoming: Vec<Option<Result<String, ThingsClientError>>> =
        vec![Some(Ok(r#"{"event":"player_joined","data":{}}"#.into()))];
    incoming.extend(join_flow());

    let (mut client, mut events, _sent) =
        start_client(incoming, Arc::new(MemoryStore::new()));

    drain_connect(&mut events).await;
    // The un-decodable frame (player_joined without a game) produced no
    // event, but left a status message behind and the stream kept flowing.
    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, ServerEvent::PlayerJoined { .. }));
    let _ = events.recv().await; // PlayerId

    assert!(client.session().await.in_session());

    client.shutdown().await;
}

// ── Request encoding ────────────────────────────────────────────────

#[tokio::test]
async fn requests_are_wire_encoded_with_event_envelope() {
    let (mut client, mut events, sent) =
        start_client(join_flow(), Arc::new(MemoryStore::new()));

    drain_connect(&mut events).await;
    let _ = events.recv().await; // PlayerJoined
    let _ = events.recv().await; // PlayerId

    client.set_topic("Things that smell").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    {
        let messages = sent.lock().unwrap();
        let raw: serde_json::Value = serde_json::from_str(messages.last().unwrap()).unwrap();
        assert_eq!(raw["event"], "set_topic");
        assert_eq!(raw["data"]["game_id"], "MANGO");
        assert_eq!(raw["data"]["player_id"], "p1");
        assert_eq!(raw["data"]["topic"], "Things that smell");
    }

    client.shutdown().await;
}

#[tokio::test]
async fn submit_match_carries_guessed_player() {
    let (mut client, mut events, sent) =
        start_client(join_flow(), Arc::new(MemoryStore::new()));

    drain_connect(&mut events).await;
    let _ = events.recv().await; // PlayerJoined
    let _ = events.recv().await; // PlayerId

    client.submit_match("a banjo", "p2").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    {
        let messages = sent.lock().unwrap();
        let req: ClientRequest = serde_json::from_str(messages.last().unwrap()).unwrap();
        assert_eq!(
            req,
            ClientRequest::SubmitMatch {
                game_id: "MANGO".into(),
                player_id: "p1".into(),
                answer: "a banjo".into(),
                guessed_player_id: "p2".into(),
            }
        );
    }

    client.shutdown().await;
}

#[tokio::test]
async fn leave_game_uses_session_identity() {
    let (mut client, mut events, sent) =
        start_client(join_flow(), Arc::new(MemoryStore::new()));

    drain_connect(&mut events).await;
    let _ = events.recv().await; // PlayerJoined
    let _ = events.recv().await; // PlayerId

    client.leave_game().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    {
        let messages = sent.lock().unwrap();
        let req: ClientRequest = serde_json::from_str(messages.last().unwrap()).unwrap();
        assert_eq!(
            req,
            ClientRequest::LeaveGame {
                game_id: "MANGO".into(),
                player_id: "p1".into(),
            }
        );
    }

    client.shutdown().await;
}

#[tokio::test]
async fn join_game_rejected_after_shutdown() {
    let (mut client, mut events, _sent) = start_client(vec![], Arc::new(MemoryStore::new()));
    drain_connect(&mut events).await;

    client.shutdown().await;

    assert!(matches!(
        client.join_game(JoinGameParams::new("MANGO", "Ann")),
        Err(ThingsClientError::NotConnected)
    ));
}

#[tokio::test]
async fn room_listing_flows_through_without_touching_session() {
    let mut incoming = join_flow();
    incoming.push(Some(Ok(
        r#"{"event":"games","data":{"games":[{"id":"PEACH","name":"locked room","password_protected":true,"password_salt":"s1"}]}}"#.into(),
    )));

    let (mut client, mut events, sent) = start_client(incoming, Arc::new(MemoryStore::new()));

    drain_connect(&mut events).await;
    let _ = events.recv().await; // PlayerJoined
    let _ = events.recv().await; // PlayerId
    let before = client.session().await;

    client.get_games().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let ev = events.recv().await.unwrap();
    if let ServerEvent::Games { games } = ev {
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].id, "PEACH");
        assert!(games[0].password_protected);
    } else {
        panic!("expected Games event, got {ev:?}");
    }

    // The listing is lobby data; the session snapshot is unchanged.
    assert_eq!(client.session().await, before);
    assert_eq!(
        sent.lock().unwrap().last().unwrap(),
        r#"{"event":"get_games"}"#
    );

    client.shutdown().await;
}

// ── Player flow events ──────────────────────────────────────────────

#[tokio::test]
async fn player_left_shrinks_other_players() {
    let mut incoming = join_flow();
    incoming.push(Some(Ok(player_left_json(
        game_with_players("MANGO", vec![Player::new("p1", "Ann")]),
        Player::new("p2", "Ben"),
    ))));

    let (mut client, mut events, _sent) =
        start_client(incoming, Arc::new(MemoryStore::new()));

    drain_connect(&mut events).await;
    let _ = events.recv().await; // PlayerJoined
    let _ = events.recv().await; // PlayerId
    let _ = events.recv().await; // PlayerLeft

    let session = client.session().await;
    assert!(session.other_players().is_empty());
    assert_eq!(session.message, "Ben left the game");

    client.shutdown().await;
}

#[tokio::test]
async fn late_joiner_is_announced() {
    let mut incoming = join_flow();
    let mut bigger = two_player_game();
    bigger.players.push(Player::new("p3", "Cal"));
    incoming.push(Some(Ok(player_joined_json(
        bigger,
        Player::new("p3", "Cal"),
    ))));

    let (mut client, mut events, _sent) =
        start_client(incoming, Arc::new(MemoryStore::new()));

    drain_connect(&mut events).await;
    let _ = events.recv().await; // PlayerJoined (self)
    let _ = events.recv().await; // PlayerId
    let _ = events.recv().await; // PlayerJoined (Cal)

    let session = client.session().await;
    assert_eq!(session.message, "Cal joined the game");
    assert_eq!(session.other_players().len(), 2);

    client.shutdown().await;
}
