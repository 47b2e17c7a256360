//! Collaborative Checkmate Session Sync
//!
//! This crate keeps one participant's client in sync with a Collaborative
//! Checkmate session server.
//!
//! # Overview
//!
//! - **Session State Store** - Seats, readiness, phase, turn clock and the
//!   shared board position, with seat exclusivity enforced on every mutation.
//!
//! - **Message Interpreter** - Maps inbound server events to store mutations
//!   and a human-readable session log, applying partial updates field by field.
//!
//! - **Connection Manager** - Owns the WebSocket, reconnects with capped
//!   exponential backoff and jitter, and dispatches events to one handler.
//!
//! - **Reconciliation Controller** - After a reconnect, compares the last known
//!   seat and readiness against the fresh server state and sends what is needed
//!   to restore them.
//!
//! # Design Principles
//!
//! 1. **The server is authoritative** - Local state is a replica. Proposals are
//!    kept apart as speculative state and superseded by the next snapshot.
//!
//! 2. **One owner per resource** - The connection driver task alone owns the
//!    transport, the reconnect timer and the event handler.
//!
//! 3. **Events apply in arrival order** - No batching or reordering.
//!
//! 4. **Failures become log entries** - Only exhausting reconnect attempts is
//!    terminal, and even that leaves the client in a marked state.
//!
//! # Example
//!
//! ```rust,ignore
//! use checkmate_sync::{SessionClient, SyncConfig, WsConnector, SeatKey};
//!
//! let config = SyncConfig::new("game-42", "alice").with_private(true);
//! let client = SessionClient::start(WsConnector, config)?;
//!
//! // After the first snapshot arrives
//! client.take_seat(SeatKey::T1P1)?;
//! client.ready()?;
//!
//! for entry in client.log().entries() {
//!     println!("[{}] {}", entry.kind.as_str(), entry.message);
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod interpreter;
pub mod protocol;
pub mod reconcile;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{MoveIntent, SessionClient};
pub use config::{ReconcileTiming, ReconnectPolicy, SyncConfig};
pub use connection::{
    ConnectionEvent, ConnectionManager, ConnectionState, Connector, LinkPhase, Transport,
    WsConnector,
};
pub use error::{IntentError, Result, SyncError};
pub use interpreter::MessageInterpreter;
pub use protocol::{Command, ServerEvent};
pub use reconcile::{decide, CommandSink, Decision, ReconciliationController, RememberedParticipation};
pub use state::*;
