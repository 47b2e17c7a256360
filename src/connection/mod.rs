//! Connection management.
//!
//! Owns the transport to the session server, reconnects with exponential
//! backoff after abnormal closes, and dispatches inbound events to a single
//! registered handler.
//!
//! # Link State Diagram
//!
//! ```text
//! ┌──────────────┐  dial   ┌────────────┐  opened  ┌───────────┐
//! │ Disconnected │────────▶│ Connecting │─────────▶│ Connected │
//! └──────────────┘         └─────┬──────┘          └─────┬─────┘
//!                                │ lost                  │ lost
//!                                ▼                       │
//!                         ┌──────────────┐◀──────────────┘
//!                         │ Reconnecting │── dial ──▶ Connecting
//!                         └──────┬───────┘
//!                                │ give up
//!                                ▼
//!                           ┌────────┐        close (from any live state)
//!                           │ Failed │        ──────────▶ ┌────────┐
//!                           └────────┘                    │ Closed │
//!                                                         └────────┘
//! ```

use std::fmt;

use serde::Serialize;

use crate::protocol::ServerEvent;

pub mod backoff;
pub mod manager;
pub mod transport;

pub use backoff::Backoff;
pub use manager::{ConnectionManager, EventHandler, PendingDriver, WeakConnection};
pub use transport::{Connector, Frame, Transport, WsConnector, WsTransport};

/// Transport lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPhase {
    /// Never connected
    #[default]
    Disconnected,

    /// Dial in progress
    Connecting,

    /// Transport open
    Connected,

    /// Lost the transport, waiting to redial
    Reconnecting,

    /// Reconnect attempts exhausted; no further automatic action
    Failed,

    /// Closed on purpose by the local user
    Closed,
}

impl LinkPhase {
    /// Check if no further automatic action will happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }

    /// Apply an event in place, returning error if invalid.
    pub fn apply_mut(&mut self, event: LinkEvent) -> Result<(), InvalidTransition> {
        *self = self.apply(event)?;
        Ok(())
    }

    /// Phase after `event`, or error if the transition is invalid.
    pub fn apply(&self, event: LinkEvent) -> Result<LinkPhase, InvalidTransition> {
        use LinkEvent::*;
        use LinkPhase::*;

        let invalid = |reason: &'static str| InvalidTransition {
            from: *self,
            event,
            reason,
        };

        match (self, event) {
            (Connecting, Dial) => Err(invalid("Dial already in progress")),
            (Connected, Dial) => Err(invalid("Already connected")),
            (_, Dial) => Ok(Connecting),

            (Connecting, Opened) => Ok(Connected),
            (_, Opened) => Err(invalid("Not dialing")),

            (Connecting | Connected | Reconnecting, Lost) => Ok(Reconnecting),
            (_, Lost) => Err(invalid("No live connection to lose")),

            (Reconnecting, GiveUp) => Ok(Failed),
            (_, GiveUp) => Err(invalid("Not reconnecting")),

            (Closed, Close) => Err(invalid("Already closed")),
            (_, Close) => Ok(Closed),
        }
    }
}

impl fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Reconnecting => "Reconnecting",
            Self::Failed => "Failed",
            Self::Closed => "Closed",
        };
        f.write_str(name)
    }
}

/// Link state transition events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Dial,
    Opened,
    Lost,
    GiveUp,
    Close,
}

/// Error when a link transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: LinkPhase,
    pub event: LinkEvent,
    pub reason: &'static str,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid transition from {} via {:?}: {}",
            self.from, self.event, self.reason
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// Observable connection state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub connected: bool,
    pub reconnecting: bool,
    pub reconnect_attempts: u32,
    pub link: LinkPhase,
}

/// What the connection manager reports to its handler.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Transport opened. `reconnected` is set when this follows a lost connection.
    Opened { reconnected: bool },

    /// Inbound server event, in arrival order
    Message(ServerEvent),

    /// Transport closed. `intentional` closes never trigger a reconnect.
    Closed { intentional: bool },

    /// Reconnect attempts exhausted
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut link = LinkPhase::default();
        link.apply_mut(LinkEvent::Dial).unwrap();
        link.apply_mut(LinkEvent::Opened).unwrap();
        assert_eq!(link, LinkPhase::Connected);

        link.apply_mut(LinkEvent::Lost).unwrap();
        link.apply_mut(LinkEvent::Dial).unwrap();
        link.apply_mut(LinkEvent::Lost).unwrap();
        assert_eq!(link, LinkPhase::Reconnecting);

        link.apply_mut(LinkEvent::GiveUp).unwrap();
        assert!(link.is_terminal());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut link = LinkPhase::Connected;
        let err = link.apply_mut(LinkEvent::Dial).unwrap_err();
        assert_eq!(err.reason, "Already connected");
        assert_eq!(link, LinkPhase::Connected);

        assert!(LinkPhase::Disconnected.apply(LinkEvent::Lost).is_err());
        assert!(LinkPhase::Connected.apply(LinkEvent::GiveUp).is_err());
        assert!(LinkPhase::Closed.apply(LinkEvent::Close).is_err());
    }

    #[test]
    fn test_manual_redial_from_terminal() {
        assert_eq!(
            LinkPhase::Failed.apply(LinkEvent::Dial),
            Ok(LinkPhase::Connecting)
        );
        assert_eq!(
            LinkPhase::Closed.apply(LinkEvent::Dial),
            Ok(LinkPhase::Connecting)
        );
    }

    #[test]
    fn test_display() {
        let err = LinkPhase::Connected.apply(LinkEvent::Opened).unwrap_err();
        assert_eq!(
            format!("{}", err),
            "Invalid transition from Connected via Opened: Not dialing"
        );
    }
}
