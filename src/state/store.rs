//! Session state store.
//!
//! Holds the replicated session state for one participant's view: seats,
//! phase, clock, the confirmed board position and any speculative local
//! proposal. Mutations never fail; a request that would break an invariant is
//! a no-op.

use serde::Serialize;

use super::clock::{Clock, EpochKey};
use super::phase::SessionPhase;
use super::seat::{Orientation, ParticipantId, SeatKey, SeatMap, SeatPatch, Side};

/// Standard chess start position.
pub const INITIAL_POSITION: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// A from/to square pair, used for last-move and proposal highlights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: String,
    pub to: String,
}

impl Transition {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Parse a UCI move such as `e2e4` or `e7e8q`.
    pub fn from_uci(uci: &str) -> Option<Self> {
        let uci = uci.trim();
        if uci.len() < 4 || !uci.is_ascii() {
            return None;
        }
        Some(Self::new(&uci[0..2], &uci[2..4]))
    }
}

/// Server-confirmed shared artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSnapshot {
    /// Serialized position (FEN)
    pub position: String,

    /// Last transition, presentation only
    pub annotation: Option<Transition>,
}

impl Default for ArtifactSnapshot {
    fn default() -> Self {
        Self {
            position: INITIAL_POSITION.to_string(),
            annotation: None,
        }
    }
}

/// Unconfirmed local state, superseded by the next authoritative position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Speculative {
    pub proposed: Option<Transition>,
    pub move_selected: bool,
    pub locked_in: bool,
}

/// Everything a board renderer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardView {
    pub position: String,
    pub orientation: Orientation,
    pub view_only: bool,
    pub movable_side: Option<Side>,
    pub highlight: Option<Transition>,
}

/// The local participant's seat and readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participation {
    pub seat: SeatKey,
    pub ready: bool,
}

/// Replicated session state.
#[derive(Debug, Clone)]
pub struct SessionStore {
    local_id: ParticipantId,
    phase: SessionPhase,
    clock: Clock,
    artifact: ArtifactSnapshot,
    seats: SeatMap,
    speculative: Speculative,
}

impl SessionStore {
    /// Create an empty store for the local participant.
    pub fn new(local_id: impl Into<ParticipantId>) -> Self {
        Self {
            local_id: local_id.into(),
            phase: SessionPhase::default(),
            clock: Clock::default(),
            artifact: ArtifactSnapshot::default(),
            seats: SeatMap::new(),
            speculative: Speculative::default(),
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    // Phase and clock

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: SessionPhase) {
        self.phase = phase;
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Update the clock. Returns `true` when a new epoch started.
    pub fn set_clock(&mut self, remaining: f64, epoch: Option<EpochKey>) -> bool {
        self.clock.set(remaining, epoch)
    }

    // Shared artifact

    pub fn artifact(&self) -> &ArtifactSnapshot {
        &self.artifact
    }

    /// Replace the confirmed position. Clears the annotation and any
    /// speculative proposal, which the new position supersedes.
    pub fn set_artifact(&mut self, position: impl Into<String>) {
        self.artifact.position = position.into();
        self.artifact.annotation = None;
        self.speculative.proposed = None;
    }

    pub fn set_transition_annotation(&mut self, annotation: Option<Transition>) {
        self.artifact.annotation = annotation;
    }

    pub fn speculative(&self) -> &Speculative {
        &self.speculative
    }

    /// Record a locally proposed move. The confirmed position is untouched.
    pub fn propose_move(&mut self, transition: Transition) {
        self.speculative.proposed = Some(transition);
        self.speculative.move_selected = true;
    }

    pub fn lock_in(&mut self) {
        self.speculative.locked_in = true;
    }

    /// Reset per-turn selection flags.
    pub fn clear_selection(&mut self) {
        self.speculative.move_selected = false;
        self.speculative.locked_in = false;
    }

    // Seats

    pub fn seats(&self) -> &SeatMap {
        &self.seats
    }

    /// Claim a seat, vacating any other seat the occupant holds.
    /// A seat held by someone else is left alone.
    pub fn claim_seat(&mut self, seat: SeatKey, occupant: &str) -> &SeatMap {
        self.seats.claim(seat, occupant);
        &self.seats
    }

    pub fn set_seat_ready(&mut self, seat: SeatKey, ready: bool) {
        self.seats.set_ready(seat, ready);
    }

    /// Apply an authoritative partial seat update. Returns whether it changed anything.
    pub fn apply_seat_patch(&mut self, seat: SeatKey, patch: SeatPatch) -> bool {
        self.seats.apply_patch(seat, patch)
    }

    /// Whether `occupant` may claim `seat`.
    ///
    /// False while the occupant is ready in a different seat; otherwise true
    /// when the seat is empty or already theirs.
    pub fn can_claim_seat(&self, seat: SeatKey, occupant: &str) -> bool {
        if let Some(current) = self.seats.seat_of(occupant) {
            if current != seat && self.seats.get(current).ready {
                return false;
            }
        }
        let target = self.seats.get(seat);
        target.is_empty() || target.is_held_by(occupant)
    }

    pub fn current_seat_of(&self, occupant: &str) -> Option<SeatKey> {
        self.seats.seat_of(occupant)
    }

    // Local participant views

    pub fn local_participation(&self) -> Option<Participation> {
        let seat = self.seats.seat_of(&self.local_id)?;
        Some(Participation {
            seat,
            ready: self.seats.get(seat).ready,
        })
    }

    pub fn is_local_ready(&self) -> bool {
        self.local_participation().is_some_and(|p| p.ready)
    }

    pub fn local_side(&self) -> Option<Side> {
        self.local_participation().map(|p| p.seat.side())
    }

    pub fn orientation(&self) -> Orientation {
        self.local_side()
            .map(|side| side.orientation())
            .unwrap_or_default()
    }

    /// Whether the local participant may propose a move right now.
    pub fn can_make_move(&self) -> bool {
        match (self.phase.selecting_side(), self.local_side()) {
            (Some(turn), Some(side)) => turn == side && !self.speculative.locked_in,
            _ => false,
        }
    }

    /// Renderer input. The proposal highlight wins over the last-move annotation.
    pub fn board_view(&self) -> BoardView {
        BoardView {
            position: self.artifact.position.clone(),
            orientation: self.orientation(),
            view_only: !self.can_make_move(),
            movable_side: self.local_side(),
            highlight: self
                .speculative
                .proposed
                .clone()
                .or_else(|| self.artifact.annotation.clone()),
        }
    }

    /// Convert to JSON for presentation layers.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "player_id": self.local_id,
            "game_phase": self.phase.as_str(),
            "phase_name": self.phase.display_name(),
            "time_remaining": self.clock.remaining,
            "time_remaining_key": self.clock.epoch,
            "fen": self.artifact.position,
            "last_move": self.artifact.annotation,
            "players": self.seats.to_json(),
            "seats_taken": self.seats.occupied_count(),
            "seats_ready": self.seats.ready_count(),
            "orientation": self.orientation().as_str(),
            "selected_move": self.speculative.move_selected,
            "locked_in": self.speculative.locked_in
        })
    }
}
