//! Replicated session state.
//!
//! This module provides the pure, synchronous state types:
//!
//! - `seat` - Seat occupancy and readiness
//! - `phase` - Server-driven session phase
//! - `clock` - Turn clock and local countdown
//! - `store` - The session store combining all of the above
//! - `log` - Append-only user-visible session log
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          SessionStore                            │
//! │                                                                  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────────┐  │
//! │  │   SeatMap    │  │ SessionPhase │  │ Clock (remaining,epoch)│  │
//! │  │              │  │              │  └────────────────────────┘  │
//! │  │ t1p1 t1p2    │  │ server-owned │  ┌────────────────────────┐  │
//! │  │ t2p1 t2p2    │  │              │  │ ArtifactSnapshot       │  │
//! │  │ {id, ready}  │  └──────────────┘  │   + Speculative        │  │
//! │  └──────────────┘                    └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here talks to the network. The interpreter mutates the store from
//! server events; user-intent handlers only touch the speculative part.

pub mod clock;
pub mod log;
pub mod phase;
pub mod seat;
pub mod store;

// Re-export commonly used types
pub use clock::{
    spawn_countdown, Clock, Countdown, CountdownView, EpochKey, DEFAULT_COUNTDOWN_TICK,
};
pub use log::{LogEntry, LogKind, SessionLog};
pub use phase::SessionPhase;
pub use seat::{Orientation, ParticipantId, Seat, SeatKey, SeatMap, SeatPatch, Side, SEAT_COUNT};
pub use store::{
    ArtifactSnapshot, BoardView, Participation, SessionStore, Speculative, Transition,
    INITIAL_POSITION,
};
