//! Async client for the Things game protocol.
//!
//! [`ThingsClient`] is a thin handle that communicates with a background
//! transport loop task via an unbounded MPSC channel. Server events are
//! folded into a shared [`SessionState`] and then emitted on a bounded
//! channel ([`tokio::sync::mpsc::Receiver<ServerEvent>`]) returned from
//! [`ThingsClient::start`].
//!
//! All inbound events are processed one at a time, in arrival order, by the
//! single transport loop task — the session snapshot is never mutated
//! concurrently, which is what keeps its atomic-clear invariants intact.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect("ws://localhost:5000/ws").await?;
//! let config = ThingsConfig::new().with_store(Arc::new(FileStore::new("session.json")));
//! let (client, mut events) = ThingsClient::start(transport, config);
//!
//! client.join_game(JoinGameParams::new("MANGO", "Ann"))?;
//!
//! while let Some(event) = events.recv().await {
//!     let session = client.session().await;
//!     match event {
//!         ServerEvent::PlayerId { .. } => { /* session.in_session() is now true */ }
//!         ServerEvent::Disconnect { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};

use crate::error::{Result, ThingsClientError};
use crate::protocol::{ClientRequest, GameId, PlayerId, ServerEvent};
use crate::session::SessionState;
use crate::storage::{CredentialStore, MemoryStore};
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`ThingsClient`] connection.
///
/// All fields have defaults; supply a persistent [`CredentialStore`] via
/// [`with_store`](Self::with_store) if sessions should survive a restart
/// (the default [`MemoryStore`] lives only as long as the process).
///
/// # Example
///
/// ```
/// use things_game_client::client::ThingsConfig;
/// use std::time::Duration;
///
/// let config = ThingsConfig::new()
///     .with_color("teal")
///     .with_event_channel_capacity(512)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.color, "teal");
/// ```
#[derive(Clone)]
pub struct ThingsConfig {
    /// Cosmetic player color seeded into the session state.
    ///
    /// Empty means "keep whatever the rehydrated session had".
    pub color: String,
    /// Storage backing silent-rejoin identity persistence.
    pub store: Arc<dyn CredentialStore>,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up with incoming server events, events
    /// are dropped (with a warning logged) to avoid blocking the transport
    /// loop. The `Disconnect` event is always delivered regardless of
    /// capacity. Note that dropped events only skip *notification* — the
    /// session state has already been updated by the time an event is
    /// dropped, so no state is lost.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`ThingsClient::shutdown`] is called, the background transport
    /// loop is given this much time to close the transport and emit a final
    /// `Disconnect` event. If the timeout expires the task is aborted.
    ///
    /// Defaults to **1 second**. A zero timeout aborts the transport loop
    /// immediately without waiting for graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl ThingsConfig {
    /// Create a configuration with default values and an in-memory store.
    pub fn new() -> Self {
        Self {
            color: String::new(),
            store: Arc::new(MemoryStore::new()),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the cosmetic player color.
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Set the credential store used for identity persistence.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = store;
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    ///
    /// Defaults to **1 second**. A zero timeout aborts the transport loop
    /// immediately without waiting for graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for ThingsConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ThingsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThingsConfig")
            .field("color", &self.color)
            .field("event_channel_capacity", &self.event_channel_capacity)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

// ── Join/create parameters ──────────────────────────────────────────

/// Parameters for creating a new game room.
///
/// # Example
///
/// ```
/// use things_game_client::client::CreateGameParams;
///
/// let params = CreateGameParams::new("Friday night", "Ann").with_observer(true);
/// assert_eq!(params.player_name, "Ann");
/// assert!(params.observer);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CreateGameParams {
    /// Display name for the new room.
    pub name: String,
    /// Display name for the creating player (becomes owner).
    pub player_name: String,
    /// Password hash protecting the room; empty = open room.
    pub password: String,
    /// Salt used to derive `password`.
    pub salt: String,
    /// Join as a non-playing observer.
    pub observer: bool,
}

impl CreateGameParams {
    /// Create new parameters with the required fields.
    pub fn new(name: impl Into<String>, player_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            player_name: player_name.into(),
            ..Default::default()
        }
    }

    /// Protect the room with a password hash and salt.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>, salt: impl Into<String>) -> Self {
        self.password = password.into();
        self.salt = salt.into();
        self
    }

    /// Join as a non-playing observer.
    #[must_use]
    pub fn with_observer(mut self, observer: bool) -> Self {
        self.observer = observer;
        self
    }
}

/// Parameters for joining an existing game room.
#[derive(Debug, Clone, Default)]
pub struct JoinGameParams {
    /// Id of the room to join.
    pub game_id: GameId,
    /// Display name for the joining player.
    pub player_name: String,
    /// Password hash for a protected room; empty = open room.
    pub password: String,
    /// Join as a non-playing observer.
    pub observer: bool,
}

impl JoinGameParams {
    /// Create new parameters with the required fields.
    pub fn new(game_id: impl Into<GameId>, player_name: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            player_name: player_name.into(),
            ..Default::default()
        }
    }

    /// Supply the room's password hash.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Join as a non-playing observer.
    #[must_use]
    pub fn with_observer(mut self, observer: bool) -> Self {
        self.observer = observer;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// Internal shared state between the client handle and the transport loop.
struct ClientShared {
    connected: AtomicBool,
    /// The session snapshot. Only the transport loop mutates it (single
    /// writer); the handle takes read locks for accessors.
    session: Mutex<SessionState>,
    store: Arc<dyn CredentialStore>,
}

impl ClientShared {
    fn new(session: SessionState, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            connected: AtomicBool::new(true),
            session: Mutex::new(session),
            store,
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Async client handle for the Things game protocol.
///
/// Created via [`ThingsClient::start`], which rehydrates any persisted
/// session, spawns a background transport loop and returns this handle
/// together with an event receiver.
///
/// All request methods serialize a [`ClientRequest`] and send it to the
/// transport loop over an unbounded channel. They return once the message is
/// queued (no round-trip await). Methods that act on the current game read
/// the session identity first and fail with [`ThingsClientError::NotInGame`]
/// when there is none.
pub struct ThingsClient {
    /// Sender half of the command channel to the transport loop.
    cmd_tx: mpsc::UnboundedSender<ClientRequest>,
    /// Shared state updated by the transport loop.
    state: Arc<ClientShared>,
    /// Handle to the background transport loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the transport loop to shut down gracefully.
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    /// Timeout for the graceful shutdown.
    shutdown_timeout: Duration,
}

impl ThingsClient {
    /// Start the client transport loop and return a handle plus event receiver.
    ///
    /// Before any live event arrives, identity is rehydrated from the
    /// configured [`CredentialStore`]. If a non-expired session was found,
    /// the transport loop emits a `rejoin_game` request right after the
    /// synthetic `Connect` event, so a reload silently rejoins its room.
    ///
    /// # Arguments
    ///
    /// * `transport` — A connected [`Transport`] implementation.
    /// * `config` — Client configuration including the credential store.
    ///
    /// # Returns
    ///
    /// A tuple of `(client_handle, event_receiver)`. The event receiver
    /// yields [`ServerEvent`]s until the transport closes or the client
    /// shuts down.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        transport: impl Transport,
        config: ThingsConfig,
    ) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientRequest>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<ServerEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let mut session = SessionState::rehydrate(config.store.as_ref());
        if !config.color.is_empty() {
            session.color = config.color;
        }

        let state = Arc::new(ClientShared::new(session, Arc::clone(&config.store)));
        let loop_state = Arc::clone(&state);

        let task = tokio::spawn(transport_loop(
            transport,
            cmd_rx,
            event_tx,
            loop_state,
            shutdown_rx,
        ));

        let client = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (client, event_rx)
    }

    // ── Public API methods ──────────────────────────────────────────

    /// Request the public room listing. The reply arrives as a
    /// [`Games`](ServerEvent::Games) event; no session is required.
    ///
    /// # Errors
    ///
    /// Returns [`ThingsClientError::NotConnected`] if the transport has closed.
    pub fn get_games(&self) -> Result<()> {
        self.send(ClientRequest::GetGames)
    }

    /// Create a new room and join it as the owner.
    ///
    /// # Errors
    ///
    /// Returns [`ThingsClientError::NotConnected`] if the transport has closed.
    pub fn create_game(&self, params: CreateGameParams) -> Result<()> {
        self.send(ClientRequest::CreateGame {
            name: params.name,
            player_name: params.player_name,
            password: params.password,
            salt: params.salt,
            observer: params.observer,
        })
    }

    /// Join an existing room.
    ///
    /// # Errors
    ///
    /// Returns [`ThingsClientError::NotConnected`] if the transport has closed.
    pub fn join_game(&self, params: JoinGameParams) -> Result<()> {
        self.send(ClientRequest::JoinGame {
            game_id: params.game_id,
            player_name: params.player_name,
            password: params.password,
            observer: params.observer,
        })
    }

    /// Explicitly request a rejoin using the current session identity.
    ///
    /// Usually unnecessary — the transport loop rejoins automatically on
    /// connect when a persisted session exists.
    ///
    /// # Errors
    ///
    /// Returns [`ThingsClientError::NotInGame`] if there is no session, or
    /// [`ThingsClientError::NotConnected`] if the transport has closed.
    pub async fn rejoin_game(&self) -> Result<()> {
        let session = self.state.session.lock().await;
        if !session.in_session() {
            return Err(ThingsClientError::NotInGame);
        }
        let req = ClientRequest::RejoinGame {
            game_id: session.game_id.clone(),
            player_id: session.player_id.clone(),
            session_key: session.session_key.clone(),
        };
        drop(session);
        self.send(req)
    }

    /// Leave the current room.
    ///
    /// # Errors
    ///
    /// Returns [`ThingsClientError::NotInGame`] if there is no session, or
    /// [`ThingsClientError::NotConnected`] if the transport has closed.
    pub async fn leave_game(&self) -> Result<()> {
        let (game_id, player_id) = self.identity().await?;
        self.send(ClientRequest::LeaveGame { game_id, player_id })
    }

    /// Start the game. The server rejects this unless this player owns the
    /// room and enough players have joined.
    ///
    /// # Errors
    ///
    /// Returns [`ThingsClientError::NotInGame`] if there is no session, or
    /// [`ThingsClientError::NotConnected`] if the transport has closed.
    pub async fn start_game(&self) -> Result<()> {
        let (game_id, player_id) = self.identity().await?;
        self.send(ClientRequest::StartGame { game_id, player_id })
    }

    /// Set the round topic. The server rejects this unless this player is
    /// the current topic writer.
    ///
    /// # Errors
    ///
    /// Returns [`ThingsClientError::NotInGame`] if there is no session, or
    /// [`ThingsClientError::NotConnected`] if the transport has closed.
    pub async fn set_topic(&self, topic: impl Into<String>) -> Result<()> {
        let (game_id, player_id) = self.identity().await?;
        self.send(ClientRequest::SetTopic {
            game_id,
            player_id,
            topic: topic.into(),
        })
    }

    /// Submit an answer for the current topic.
    ///
    /// # Errors
    ///
    /// Returns [`ThingsClientError::NotInGame`] if there is no session, or
    /// [`ThingsClientError::NotConnected`] if the transport has closed.
    pub async fn submit_answer(&self, answer: impl Into<String>) -> Result<()> {
        let (game_id, player_id) = self.identity().await?;
        self.send(ClientRequest::SubmitAnswer {
            game_id,
            player_id,
            answer: answer.into(),
        })
    }

    /// Guess which player wrote `answer`.
    ///
    /// # Errors
    ///
    /// Returns [`ThingsClientError::NotInGame`] if there is no session, or
    /// [`ThingsClientError::NotConnected`] if the transport has closed.
    pub async fn submit_match(
        &self,
        answer: impl Into<String>,
        guessed_player_id: impl Into<PlayerId>,
    ) -> Result<()> {
        let (game_id, player_id) = self.identity().await?;
        self.send(ClientRequest::SubmitMatch {
            game_id,
            player_id,
            answer: answer.into(),
            guessed_player_id: guessed_player_id.into(),
        })
    }

    /// Shut down the client, closing the transport and stopping the
    /// background task.
    ///
    /// After calling this method, the event receiver will yield `None` once
    /// the transport loop exits.
    pub async fn shutdown(&mut self) {
        debug!("ThingsClient: shutdown requested");

        // Signal the transport loop to shut down gracefully.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the transport loop with a timeout. If it doesn't exit in time,
        // abort it so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("transport loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("transport loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("transport loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` if the transport is believed to be connected.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Returns a clone of the current session snapshot.
    ///
    /// Derived view values (`this_player`, `other_guessers`, …) are computed
    /// on the returned value.
    pub async fn session(&self) -> SessionState {
        self.state.session.lock().await.clone()
    }

    /// Returns `true` if the client currently has a room and player identity.
    pub async fn in_session(&self) -> bool {
        self.state.session.lock().await.in_session()
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Read the current room/player identity or fail with `NotInGame`.
    async fn identity(&self) -> Result<(GameId, PlayerId)> {
        let session = self.state.session.lock().await;
        if !session.in_session() {
            return Err(ThingsClientError::NotInGame);
        }
        Ok((session.game_id.clone(), session.player_id.clone()))
    }

    /// Queue a `ClientRequest` to the transport loop.
    fn send(&self, req: ClientRequest) -> Result<()> {
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(ThingsClientError::NotConnected);
        }
        self.cmd_tx
            .send(req)
            .map_err(|_| ThingsClientError::NotConnected)
    }
}

impl std::fmt::Debug for ThingsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThingsClient")
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for ThingsClient {
    fn drop(&mut self) {
        // `Drop` is synchronous so we cannot await a graceful shutdown.
        // The only safe action is to abort the spawned task, which causes
        // the transport loop future to be dropped immediately.  The
        // `shutdown_tx` oneshot is intentionally *not* sent here: sending
        // it would trigger a graceful path that calls async `transport.close()`,
        // but there is no executor context to drive it inside `Drop`.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Background transport loop that multiplexes send/receive via `tokio::select!`.
///
/// This is the connection lifecycle bridge: it synthesizes `Connect` /
/// `Disconnect` events around transport liveness, folds every inbound event
/// into the shared session (single writer, arrival order) and then forwards
/// the event to the consumer channel.
///
/// Exits when:
/// - The command channel closes (client handle dropped or shutdown called)
/// - The transport returns `None` (server closed connection)
/// - A transport error occurs
async fn transport_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientRequest>,
    event_tx: mpsc::Sender<ServerEvent>,
    state: Arc<ClientShared>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    debug!("transport loop started");

    // Synthesize Connect before entering the select loop.
    apply_event(&state, &ServerEvent::Connect).await;
    emit_event(&event_tx, ServerEvent::Connect).await;

    // If a persisted session was rehydrated, silently rejoin it. The reply
    // arrives as ordinary player_joined / player_id / error events.
    let rejoin = {
        let session = state.session.lock().await;
        session.in_session().then(|| ClientRequest::RejoinGame {
            game_id: session.game_id.clone(),
            player_id: session.player_id.clone(),
            session_key: session.session_key.clone(),
        })
    };
    if let Some(req) = rejoin {
        debug!("rejoining persisted session");
        if !send_request(&mut transport, &req).await {
            emit_disconnected(&event_tx, &state, Some("transport send error".into())).await;
            return;
        }
    }

    loop {
        tokio::select! {
            // Branch 1: outgoing request from the client handle
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(req) => {
                        debug!("sending client request: {:?}", std::mem::discriminant(&req));
                        if !send_request(&mut transport, &req).await {
                            emit_disconnected(
                                &event_tx,
                                &state,
                                Some("transport send error".into()),
                            ).await;
                            break;
                        }
                    }
                    // Command channel closed — client handle dropped.
                    None => {
                        debug!("command channel closed, shutting down transport loop");
                        let _ = transport.close().await;
                        emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                        break;
                    }
                }
            }

            // Branch 2: shutdown signal
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                break;
            }

            // Branch 3: incoming event from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => {
                                // Fold into the session first, then notify,
                                // so consumers reading the session on event
                                // receipt see the post-event state.
                                apply_event(&state, &event).await;
                                emit_event(&event_tx, event).await;
                            }
                            Err(e) => {
                                warn!("failed to deserialize server event: {e} — raw: {text}");
                                state.session.lock().await.note_protocol_error();
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        emit_disconnected(
                            &event_tx,
                            &state,
                            Some(format!("transport receive error: {e}")),
                        ).await;
                        break;
                    }
                    // Transport closed cleanly.
                    None => {
                        debug!("transport closed by server");
                        emit_disconnected(&event_tx, &state, None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("transport loop exited");
}

/// Serialize and send one request. Returns `false` on a transport send error
/// (the loop must then disconnect); serialization failures are programming
/// bugs and only logged.
async fn send_request(transport: &mut impl Transport, req: &ClientRequest) -> bool {
    match serde_json::to_string(req) {
        Ok(json) => {
            if let Err(e) = transport.send(json).await {
                error!("transport send error: {e}");
                return false;
            }
            true
        }
        Err(e) => {
            error!("failed to serialize ClientRequest: {e}");
            true
        }
    }
}

/// Fold one event into the shared session state.
async fn apply_event(state: &ClientShared, event: &ServerEvent) {
    match event {
        ServerEvent::Connect => state.connected.store(true, Ordering::Release),
        ServerEvent::Disconnect { .. } => state.connected.store(false, Ordering::Release),
        _ => {}
    }
    let mut session = state.session.lock().await;
    session.apply(event, state.store.as_ref());
}

/// Emit an event to the event channel. If the channel is full, log a warning
/// and drop the event to avoid blocking the transport loop.
async fn emit_event(event_tx: &mpsc::Sender<ServerEvent>, event: ServerEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Fold and emit a [`Disconnect`](ServerEvent::Disconnect) event.
///
/// Uses `send().await` (blocking) instead of `try_send` because `Disconnect`
/// is always the last event on the channel and must never be silently dropped.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<ServerEvent>,
    state: &ClientShared,
    reason: Option<String>,
) {
    let event = ServerEvent::Disconnect { reason };
    apply_event(state, &event).await;
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
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
    use crate::protocol::{GameSnapshot, Player};
    use crate::storage::{StoredSession, SESSION_TTL};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// A mock transport that records sent messages and replays scripted responses.
    struct MockTransport {
        /// Messages that `recv()` will yield in order.
        incoming: VecDeque<Option<std::result::Result<String, ThingsClientError>>>,
        /// Recorded outgoing messages.
        sent: Arc<StdMutex<Vec<String>>>,
        /// Whether `close()` was called.
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<String, ThingsClientError>>>,
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
        async fn send(&mut self, message: String) -> std::result::Result<(), ThingsClientError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, ThingsClientError>> {
            if let Some(item) = self.incoming.pop_front() {
                // An explicit `None` entry signals a clean transport close;
                // `Some(result)` delivers the scripted message or error.
                item
            } else {
                // All scripted messages have been delivered — hang forever
                // so the transport loop stays alive until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), ThingsClientError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn game() -> GameSnapshot {
        GameSnapshot {
            game_id: "MANGO".into(),
            players: vec![Player::new("p1", "Ann"), Player::new("p2", "Ben")],
            ..Default::default()
        }
    }

    fn player_joined_json() -> String {
        serde_json::to_string(&ServerEvent::PlayerJoined {
            game: game(),
            player: Player::new("p1", "Ann"),
        })
        .unwrap()
    }

    fn player_id_json() -> String {
        serde_json::to_string(&ServerEvent::PlayerId {
            player_id: "p1".into(),
            session_key: "k1".into(),
        })
        .unwrap()
    }

    fn error_json() -> String {
        serde_json::to_string(&ServerEvent::Error {
            error: "Unable to find game".into(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn connect_is_first_event() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);

        let (mut client, mut events) = ThingsClient::start(transport, ThingsConfig::new());

        let first = events.recv().await.unwrap();
        assert!(
            matches!(first, ServerEvent::Connect),
            "expected Connect as first event, got {first:?}"
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn session_updates_before_event_is_emitted() {
        let (transport, _sent, _closed) =
            MockTransport::new(vec![Some(Ok(player_joined_json())), Some(Ok(player_id_json()))]);

        let (mut client, mut events) = ThingsClient::start(transport, ThingsConfig::new());

        let _ = events.recv().await; // Connect
        let _ = events.recv().await; // PlayerJoined
        let ev = events.recv().await.unwrap(); // PlayerId
        assert!(matches!(ev, ServerEvent::PlayerId { .. }));

        // Session reflects both events by the time PlayerId is observed.
        let session = client.session().await;
        assert!(session.in_session());
        assert_eq!(session.game_id, "MANGO");
        assert_eq!(session.this_player().unwrap().name, "Ann");

        client.shutdown().await;
    }

    #[tokio::test]
    async fn join_game_sends_correct_request() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);

        let (mut client, mut events) = ThingsClient::start(transport, ThingsConfig::new());
        let _ = events.recv().await; // Connect

        client
            .join_game(JoinGameParams::new("MANGO", "Ann").with_password("pw"))
            .unwrap();

        // Give the loop a moment to process.
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            assert_eq!(messages.len(), 1);
            let req: ClientRequest = serde_json::from_str(&messages[0]).unwrap();
            if let ClientRequest::JoinGame {
                game_id,
                player_name,
                password,
                observer,
            } = req
            {
                assert_eq!(game_id, "MANGO");
                assert_eq!(player_name, "Ann");
                assert_eq!(password, "pw");
                assert!(!observer);
            } else {
                panic!("expected JoinGame request, got {req:?}");
            }
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn create_game_sends_correct_request() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);

        let (mut client, mut events) = ThingsClient::start(transport, ThingsConfig::new());
        let _ = events.recv().await; // Connect

        client
            .create_game(CreateGameParams::new("Friday night", "Ann").with_observer(true))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let req: ClientRequest = serde_json::from_str(messages.last().unwrap()).unwrap();
            assert!(matches!(
                req,
                ClientRequest::CreateGame { observer: true, .. }
            ));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn get_games_needs_no_session() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);

        let (mut client, mut events) = ThingsClient::start(transport, ThingsConfig::new());
        let _ = events.recv().await; // Connect

        client.get_games().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0], r#"{"event":"get_games"}"#);
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn rehydrated_session_triggers_rejoin_on_connect() {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
        store.write(
            &StoredSession {
                game_id: "MANGO".into(),
                player_id: "p1".into(),
                session_key: "k1".into(),
                color: String::new(),
            },
            SESSION_TTL,
        );

        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let config = ThingsConfig::new().with_store(Arc::clone(&store));
        let (mut client, mut events) = ThingsClient::start(transport, config);

        let _ = events.recv().await; // Connect
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            assert_eq!(messages.len(), 1, "expected exactly the rejoin request");
            let req: ClientRequest = serde_json::from_str(&messages[0]).unwrap();
            if let ClientRequest::RejoinGame {
                game_id,
                player_id,
                session_key,
            } = req
            {
                assert_eq!(game_id, "MANGO");
                assert_eq!(player_id, "p1");
                assert_eq!(session_key, "k1");
            } else {
                panic!("expected RejoinGame request, got {req:?}");
            }
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn fresh_session_does_not_rejoin() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = ThingsClient::start(transport, ThingsConfig::new());

        let _ = events.recv().await; // Connect
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(sent.lock().unwrap().is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn game_ops_require_session() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = ThingsClient::start(transport, ThingsConfig::new());
        let _ = events.recv().await; // Connect

        assert!(matches!(
            client.leave_game().await,
            Err(ThingsClientError::NotInGame)
        ));
        assert!(matches!(
            client.set_topic("Things").await,
            Err(ThingsClientError::NotInGame)
        ));
        assert!(matches!(
            client.rejoin_game().await,
            Err(ThingsClientError::NotInGame)
        ));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn submit_answer_carries_identity() {
        let (transport, sent, _closed) =
            MockTransport::new(vec![Some(Ok(player_joined_json())), Some(Ok(player_id_json()))]);

        let (mut client, mut events) = ThingsClient::start(transport, ThingsConfig::new());
        let _ = events.recv().await; // Connect
        let _ = events.recv().await; // PlayerJoined
        let _ = events.recv().await; // PlayerId

        client.submit_answer("a banjo").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let req: ClientRequest = serde_json::from_str(messages.last().unwrap()).unwrap();
            if let ClientRequest::SubmitAnswer {
                game_id,
                player_id,
                answer,
            } = req
            {
                assert_eq!(game_id, "MANGO");
                assert_eq!(player_id, "p1");
                assert_eq!(answer, "a banjo");
            } else {
                panic!("expected SubmitAnswer request, got {req:?}");
            }
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn disconnect_on_transport_close_retains_session() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(player_joined_json())),
            Some(Ok(player_id_json())),
            // Clean transport close.
            None,
        ]);

        let (mut client, mut events) = ThingsClient::start(transport, ThingsConfig::new());

        let _ = events.recv().await; // Connect
        let _ = events.recv().await; // PlayerJoined
        let _ = events.recv().await; // PlayerId
        let ev = events.recv().await.unwrap();
        assert!(matches!(ev, ServerEvent::Disconnect { reason: None }));

        assert!(!client.is_connected());
        // Identity and snapshot survive the disconnect for the
        // "reconnecting" view.
        let session = client.session().await;
        assert!(session.in_session());
        assert!(session.game.is_some());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn transport_recv_error_emits_disconnect_with_reason() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Err(
            ThingsClientError::TransportReceive("boom".into()),
        ))]);

        let (mut client, mut events) = ThingsClient::start(transport, ThingsConfig::new());

        let _ = events.recv().await; // Connect
        let event = events.recv().await.unwrap();
        if let ServerEvent::Disconnect { reason } = event {
            assert!(reason.unwrap().contains("boom"));
        } else {
            panic!("expected Disconnect event, got {event:?}");
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_frame_is_survivable() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok("{not json".into())),
            Some(Ok(player_joined_json())),
            Some(Ok(player_id_json())),
        ]);

        let (mut client, mut events) = ThingsClient::start(transport, ThingsConfig::new());

        let _ = events.recv().await; // Connect
        // The malformed frame produced no event; the next two still arrive.
        let ev = events.recv().await.unwrap();
        assert!(matches!(ev, ServerEvent::PlayerJoined { .. }));
        let ev = events.recv().await.unwrap();
        assert!(matches!(ev, ServerEvent::PlayerId { .. }));

        assert!(client.session().await.in_session());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn error_event_sets_status_message() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(error_json()))]);

        let (mut client, mut events) = ThingsClient::start(transport, ThingsConfig::new());

        let _ = events.recv().await; // Connect
        let ev = events.recv().await.unwrap();
        assert!(matches!(ev, ServerEvent::Error { .. }));
        assert_eq!(client.session().await.message, "Unable to find game");

        client.shutdown().await;
    }

    #[tokio::test]
    async fn not_connected_error_after_shutdown() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);

        let (mut client, mut events) = ThingsClient::start(transport, ThingsConfig::new());
        let _ = events.recv().await; // Connect

        client.shutdown().await;

        let result = client.join_game(JoinGameParams::new("MANGO", "Ann"));
        assert!(matches!(result, Err(ThingsClientError::NotConnected)));
    }

    #[tokio::test]
    async fn shutdown_emits_disconnect_and_closes_transport() {
        let (transport, _sent, closed) = MockTransport::new(vec![]);

        let (mut client, mut events) = ThingsClient::start(transport, ThingsConfig::new());
        let _ = events.recv().await; // Connect

        client.shutdown().await;

        let event = events.recv().await.unwrap();
        if let ServerEvent::Disconnect { reason } = event {
            assert_eq!(reason.as_deref(), Some("client shut down"));
        } else {
            panic!("expected Disconnect event, got {event:?}");
        }
        assert!(closed.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);

        let (mut client, mut events) = ThingsClient::start(transport, ThingsConfig::new());
        let _ = events.recv().await; // Connect

        client.shutdown().await;
        client.shutdown().await; // should not panic
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);

        let (client, mut events) = ThingsClient::start(transport, ThingsConfig::new());
        let _ = events.recv().await; // Connect

        // Drop the client without calling shutdown.
        drop(client);

        // The transport loop should eventually exit; the event channel
        // will close. We just verify we don't hang or panic.
        while let Some(_event) = events.recv().await {}
    }

    #[tokio::test]
    async fn event_channel_backpressure_does_not_block() {
        // More events than the channel capacity; the loop must keep going.
        let mut incoming: Vec<Option<std::result::Result<String, ThingsClientError>>> = Vec::new();
        for _ in 0..20 {
            incoming.push(Some(Ok(error_json())));
        }
        incoming.push(None);

        let (transport, _sent, _closed) = MockTransport::new(incoming);

        let config = ThingsConfig::new().with_event_channel_capacity(1);
        let (mut client, mut events) = ThingsClient::start(transport, config);

        // Let the channel fill up and events get dropped.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut count = 0;
        while let Some(_event) = events.recv().await {
            count += 1;
        }
        // Connect arrives (first try_send succeeds) and Disconnect is always
        // delivered via the blocking send; intermediate events may drop.
        assert!(count >= 2, "expected at least 2 events, got {count}");
        assert!(
            count < 22,
            "expected backpressure to drop some events, but got all {count}"
        );

        // State was still folded for every event, dropped or not.
        assert_eq!(client.session().await.message, "Unable to find game");

        client.shutdown().await;
    }

    #[tokio::test]
    async fn config_defaults() {
        let config = ThingsConfig::new();
        assert!(config.color.is_empty());
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn event_channel_capacity_is_clamped_to_one() {
        let config = ThingsConfig::new().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn config_color_seeds_session() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let config = ThingsConfig::new().with_color("teal");
        let (mut client, mut events) = ThingsClient::start(transport, config);

        let _ = events.recv().await; // Connect
        assert_eq!(client.session().await.color, "teal");

        client.shutdown().await;
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);

        let (mut client, mut events) = ThingsClient::start(transport, ThingsConfig::new());
        let _ = events.recv().await; // Connect

        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("ThingsClient"));
        assert!(debug_str.contains("connected"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn create_game_params_builder() {
        let params = CreateGameParams::new("Friday night", "Ann")
            .with_password("hash", "salt")
            .with_observer(true);
        assert_eq!(params.name, "Friday night");
        assert_eq!(params.player_name, "Ann");
        assert_eq!(params.password, "hash");
        assert_eq!(params.salt, "salt");
        assert!(params.observer);
    }

    #[tokio::test]
    async fn join_game_params_default() {
        let params = JoinGameParams::new("MANGO", "Ann");
        assert!(params.password.is_empty());
        assert!(!params.observer);
    }
}
