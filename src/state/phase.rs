//! Session phase.
//!
//! The phase is replicated from the server and never inferred locally.
//!
//! ```text
//! Setup ─▶ Side1Selecting ─▶ Side1Computing ─▶ Side2Selecting ─▶ Side2Computing
//!                ▲                                                     │
//!                └──────────────────────── Cooldown ◀──────────────────┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use super::seat::Side;

/// Server-driven session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionPhase {
    #[serde(rename = "setup")]
    Setup,
    #[serde(rename = "team1_selection")]
    Side1Selecting,
    #[serde(rename = "team1_computing")]
    Side1Computing,
    #[serde(rename = "team2_selection")]
    Side2Selecting,
    #[serde(rename = "team2_computing")]
    Side2Computing,
    #[default]
    #[serde(rename = "cooldown")]
    Cooldown,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Side1Selecting => "team1_selection",
            Self::Side1Computing => "team1_computing",
            Self::Side2Selecting => "team2_selection",
            Self::Side2Computing => "team2_computing",
            Self::Cooldown => "cooldown",
        }
    }

    /// Parse a wire name. Unknown names yield `None`.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "setup" => Some(Self::Setup),
            "team1_selection" => Some(Self::Side1Selecting),
            "team1_computing" => Some(Self::Side1Computing),
            "team2_selection" => Some(Self::Side2Selecting),
            "team2_computing" => Some(Self::Side2Computing),
            "cooldown" => Some(Self::Cooldown),
            _ => None,
        }
    }

    /// Human-readable name used in the session log.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Setup => "Setup",
            Self::Side1Selecting => "White Selection",
            Self::Side1Computing => "White Computing",
            Self::Side2Selecting => "Black Selection",
            Self::Side2Computing => "Black Computing",
            Self::Cooldown => "Cooldown",
        }
    }

    /// Side allowed to propose moves in this phase.
    pub fn selecting_side(&self) -> Option<Side> {
        match self {
            Self::Side1Selecting => Some(Side::One),
            Self::Side2Selecting => Some(Side::Two),
            _ => None,
        }
    }

    /// Check if the engine is choosing among submitted moves.
    pub fn is_computing(&self) -> bool {
        matches!(self, Self::Side1Computing | Self::Side2Computing)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
