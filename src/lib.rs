//! # Things Game Client
//!
//! Transport-agnostic Rust client for the Things party-game protocol.
//!
//! The server is authoritative: it pushes named JSON events describing the
//! complete current game state, and this crate folds that stream into one
//! coherent, renderable [`SessionState`] snapshot — tolerating reconnects,
//! process restarts (via a TTL-bounded [`CredentialStore`]) and players being
//! removed mid-session.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] trait for any backend
//! - **Event-driven** — receive typed [`ServerEvent`]s via a channel while the
//!   client keeps the session snapshot in sync
//! - **Silent rejoin** — persisted identity rehydrates on start and the client
//!   rejoins its room automatically within the session TTL
//! - **WebSocket built-in** — default `transport-websocket` feature provides
//!   `WebSocketTransport`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use things_game_client::{JoinGameParams, ThingsClient, ThingsConfig, WebSocketTransport};
//!
//! let transport = WebSocketTransport::connect("ws://localhost:5000/ws").await?;
//! let (client, mut events) = ThingsClient::start(transport, ThingsConfig::new());
//!
//! client.join_game(JoinGameParams::new("MANGO", "Ann"))?;
//!
//! while let Some(event) = events.recv().await {
//!     let session = client.session().await;
//!     // render from `session` + its derived views
//! }
//! ```

pub mod client;
pub mod error;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{CreateGameParams, JoinGameParams, ThingsClient, ThingsConfig};
pub use error::ThingsClientError;
pub use protocol::{ClientRequest, GameListing, GamePhase, GameSnapshot, Player, ServerEvent};
pub use session::SessionState;
pub use storage::{CredentialStore, FileStore, MemoryStore, StoredSession, SESSION_TTL};
pub use transport::Transport;

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
