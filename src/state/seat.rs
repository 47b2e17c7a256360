//! Seat occupancy and readiness.
//!
//! A session has four named seats, two per side. Each seat holds at most one
//! participant and a ready flag. A participant occupies at most one seat.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Participant identifier as issued by the session server.
pub type ParticipantId = String;

/// Number of seats in a session.
pub const SEAT_COUNT: usize = 4;

/// One side of the board. Side one plays white.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    One,
    Two,
}

impl Side {
    /// Board orientation for a participant seated on this side.
    pub fn orientation(&self) -> Orientation {
        match self {
            Self::One => Orientation::White,
            Self::Two => Orientation::Black,
        }
    }
}

/// Board orientation handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    White,
    Black,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }
}

/// Named seat slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatKey {
    T1P1,
    T1P2,
    T2P1,
    T2P2,
}

impl SeatKey {
    /// All seats in wire order.
    pub const ALL: [SeatKey; SEAT_COUNT] = [Self::T1P1, Self::T1P2, Self::T2P1, Self::T2P2];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::T1P1 => "t1p1",
            Self::T1P2 => "t1p2",
            Self::T2P1 => "t2p1",
            Self::T2P2 => "t2p2",
        }
    }

    /// Parse a wire name (`t1p1` …).
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|seat| seat.as_str() == name)
    }

    pub fn side(&self) -> Side {
        match self {
            Self::T1P1 | Self::T1P2 => Side::One,
            Self::T2P1 | Self::T2P2 => Side::Two,
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::T1P1 => 0,
            Self::T1P2 => 1,
            Self::T2P1 => 2,
            Self::T2P2 => 3,
        }
    }
}

impl fmt::Display for SeatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single seat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Seat {
    /// Current occupant, if any
    pub occupant: Option<ParticipantId>,

    /// Whether the occupant has signalled ready
    pub ready: bool,
}

impl Seat {
    pub fn is_empty(&self) -> bool {
        self.occupant.is_none()
    }

    pub fn is_held_by(&self, participant: &str) -> bool {
        self.occupant.as_deref() == Some(participant)
    }
}

/// Partial seat update from an authoritative snapshot.
///
/// `occupant: Some(None)` vacates the seat, `None` leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeatPatch {
    pub occupant: Option<Option<ParticipantId>>,
    pub ready: Option<bool>,
}

impl SeatPatch {
    pub fn is_empty(&self) -> bool {
        self.occupant.is_none() && self.ready.is_none()
    }
}

/// All four seats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeatMap {
    seats: [Seat; SEAT_COUNT],
}

impl SeatMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, seat: SeatKey) -> &Seat {
        &self.seats[seat.index()]
    }

    fn get_mut(&mut self, seat: SeatKey) -> &mut Seat {
        &mut self.seats[seat.index()]
    }

    /// Iterate seats in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (SeatKey, &Seat)> {
        SeatKey::ALL.into_iter().zip(self.seats.iter())
    }

    /// Seat held by a participant.
    pub fn seat_of(&self, participant: &str) -> Option<SeatKey> {
        self.iter()
            .find(|(_, seat)| seat.is_held_by(participant))
            .map(|(key, _)| key)
    }

    /// Claim a seat for a participant.
    ///
    /// No-op when another participant holds the seat. Otherwise any other
    /// seat the participant holds is vacated (and un-readied) first.
    pub fn claim(&mut self, seat: SeatKey, participant: &str) -> bool {
        let target = self.get(seat);
        if target.is_held_by(participant) {
            return false;
        }
        if !target.is_empty() {
            return false;
        }
        self.assign(seat, participant.to_string());
        true
    }

    /// Place a participant in a seat regardless of its current occupant,
    /// keeping the one-seat-per-participant invariant.
    fn assign(&mut self, seat: SeatKey, participant: ParticipantId) {
        for (key, held) in SeatKey::ALL.into_iter().zip(self.seats.iter_mut()) {
            if key != seat && held.is_held_by(&participant) {
                held.occupant = None;
                held.ready = false;
            }
        }
        self.get_mut(seat).occupant = Some(participant);
    }

    /// Set the ready flag. Returns whether it changed.
    pub fn set_ready(&mut self, seat: SeatKey, ready: bool) -> bool {
        let target = self.get_mut(seat);
        let changed = target.ready != ready;
        target.ready = ready;
        changed
    }

    /// Apply an authoritative partial update. Returns whether anything changed.
    pub fn apply_patch(&mut self, seat: SeatKey, patch: SeatPatch) -> bool {
        let before = self.clone();

        match patch.occupant {
            Some(Some(participant)) => {
                if !self.get(seat).is_held_by(&participant) {
                    self.assign(seat, participant);
                }
            }
            Some(None) => {
                let target = self.get_mut(seat);
                target.occupant = None;
                target.ready = false;
            }
            None => {}
        }
        if let Some(ready) = patch.ready {
            self.get_mut(seat).ready = ready;
        }

        *self != before
    }

    /// Count occupied seats.
    pub fn occupied_count(&self) -> usize {
        self.seats.iter().filter(|s| !s.is_empty()).count()
    }

    /// Count ready seats.
    pub fn ready_count(&self) -> usize {
        self.seats.iter().filter(|s| s.ready).count()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        for (key, seat) in self.iter() {
            obj.insert(
                key.as_str().to_string(),
                serde_json::json!({
                    "id": seat.occupant,
                    "ready": seat.ready
                }),
            );
        }
        serde_json::Value::Object(obj)
    }
}
