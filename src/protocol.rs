//! Wire protocol.
//!
//! Outbound [`Command`]s and inbound [`ServerEvent`]s are JSON objects with a
//! `type` discriminator.
//!
//! Inbound fields are all optional and decoded leniently: a number may arrive
//! as text, a flag as `"true"`, and a field that cannot be decoded is treated
//! as absent (with a warning) instead of failing the whole event. This keeps
//! one malformed field from discarding an otherwise valid snapshot, at the cost
//! of silently ignoring that field.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

use crate::state::{EpochKey, SeatKey, SeatPatch, SessionPhase};

/// Close code for an intentional, user-initiated disconnect.
pub const NORMAL_CLOSURE: u16 = 1000;

// ── Outbound ────────────────────────────────────────────────────────

/// Command sent to the session server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    TakeSeat {
        seat: SeatKey,
    },
    Ready {
        player_id: String,
    },
    LockInMove {
        player_id: String,
    },
    /// `move` is the full resulting position; the server decides legality.
    SubmitMove {
        player_id: String,
        #[serde(rename = "move")]
        position: String,
    },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TakeSeat { .. } => "take_seat",
            Self::Ready { .. } => "ready",
            Self::LockInMove { .. } => "lock_in_move",
            Self::SubmitMove { .. } => "submit_move",
        }
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ── Inbound ─────────────────────────────────────────────────────────

/// Event received from the session server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    ConnectionEstablished,
    MoveSubmitted(PlayerRef),
    PlayerReady(PlayerRef),
    GameStateUpdate(StateSnapshot),
    TimerUpdate(TimerUpdate),
    MoveSelected(MoveSelected),
    PlayerDisconnected(PlayerRef),
    GameOver(GameOver),
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Decode one inbound text frame.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Event naming a participant.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlayerRef {
    #[serde(default, deserialize_with = "lenient_text")]
    pub player_id: Option<String>,
}

/// Full (possibly partial) state snapshot.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StateSnapshot {
    #[serde(default, deserialize_with = "lenient_phase")]
    pub game_phase: Option<SessionPhase>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub fen: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub last_move: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub t1p1_seat: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub t1p1_ready: Option<bool>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub t1p2_seat: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub t1p2_ready: Option<bool>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub t2p1_seat: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub t2p1_ready: Option<bool>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub t2p2_seat: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub t2p2_ready: Option<bool>,
}

impl StateSnapshot {
    /// Seat fields present for `seat`. An empty occupant string vacates.
    pub fn seat_patch(&self, seat: SeatKey) -> SeatPatch {
        let (occupant, ready) = match seat {
            SeatKey::T1P1 => (&self.t1p1_seat, self.t1p1_ready),
            SeatKey::T1P2 => (&self.t1p2_seat, self.t1p2_ready),
            SeatKey::T2P1 => (&self.t2p1_seat, self.t2p1_ready),
            SeatKey::T2P2 => (&self.t2p2_seat, self.t2p2_ready),
        };
        SeatPatch {
            occupant: occupant
                .as_ref()
                .map(|id| if id.is_empty() { None } else { Some(id.clone()) }),
            ready,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TimerUpdate {
    #[serde(default, deserialize_with = "lenient_number")]
    pub seconds_remaining: Option<f64>,
    #[serde(default, deserialize_with = "lenient_epoch")]
    pub key: Option<EpochKey>,
}

/// Engine's pick among submitted moves.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MoveSelected {
    #[serde(default, rename = "move", deserialize_with = "lenient")]
    pub chosen: Option<ChosenMove>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChosenMove {
    #[serde(default, deserialize_with = "lenient_text")]
    pub from: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub to: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub submitted_by: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GameOver {
    #[serde(default, deserialize_with = "lenient_text")]
    pub result: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_moves: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub team_coordination: Option<TeamCoordination>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub final_position: Option<String>,
}

/// How often each side's members agreed on a move.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TeamCoordination {
    #[serde(default, deserialize_with = "lenient_number")]
    pub team1_same_moves: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub team2_same_moves: Option<f64>,
}

// ── Lenient field decoding ──────────────────────────────────────────

fn raw<'de, D: Deserializer<'de>>(d: D) -> Result<Option<serde_json::Value>, D::Error> {
    Ok(Option::<serde_json::Value>::deserialize(d)?.filter(|v| !v.is_null()))
}

/// Decode any structured field, treating a mismatch as absent.
fn lenient<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(raw(d)?.and_then(|value| match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed field");
            None
        }
    }))
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(raw(d)?.and_then(|value| match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        other => {
            tracing::warn!(value = %other, "ignoring non-text field");
            None
        }
    }))
}

fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(raw(d)?.and_then(|value| {
        let parsed = parse_number(&value);
        if parsed.is_none() {
            tracing::warn!(value = %value, "ignoring unparseable number");
        }
        parsed
    }))
}

fn lenient_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(raw(d)?.and_then(|value| {
        let parsed = parse_flag(&value);
        if parsed.is_none() {
            tracing::warn!(value = %value, "ignoring unparseable flag");
        }
        parsed
    }))
}

fn lenient_phase<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SessionPhase>, D::Error> {
    Ok(lenient_text(d)?.and_then(|name| {
        let phase = SessionPhase::from_wire(&name);
        if phase.is_none() {
            tracing::warn!(phase = %name, "ignoring unknown phase");
        }
        phase
    }))
}

fn lenient_epoch<'de, D: Deserializer<'de>>(d: D) -> Result<Option<EpochKey>, D::Error> {
    Ok(lenient_text(d)?.map(EpochKey))
}

/// Parse a finite number from a JSON number or numeric text.
pub fn parse_number(value: &serde_json::Value) -> Option<f64> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Parse a flag from a JSON bool or `"true"`/`"false"` text.
pub fn parse_flag(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::String(s) => match s.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_command_wire_format() {
        let cmd = Command::SubmitMove {
            player_id: "alice".into(),
            position: "8/8/8/8/8/8/8/8 w - - 0 1".into(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&cmd.to_json_string().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "submit_move", "player_id": "alice", "move": "8/8/8/8/8/8/8/8 w - - 0 1"})
        );

        let seat = serde_json::to_value(Command::TakeSeat { seat: SeatKey::T2P1 }).unwrap();
        assert_eq!(seat, json!({"type": "take_seat", "seat": "t2p1"}));
    }

    #[test]
    fn test_snapshot_lenient_fields() {
        let event = ServerEvent::from_json(
            r#"{"type": "game_state_update", "game_phase": "team2_selection",
                "duration": "12.5", "t1p1_ready": "true", "t2p2_seat": ""}"#,
        )
        .unwrap();

        let ServerEvent::GameStateUpdate(snapshot) = event else {
            panic!("expected snapshot, got {:?}", event);
        };
        assert_eq!(snapshot.game_phase, Some(SessionPhase::Side2Selecting));
        assert_eq!(snapshot.duration, Some(12.5));
        assert_eq!(
            snapshot.seat_patch(SeatKey::T1P1),
            SeatPatch {
                occupant: None,
                ready: Some(true)
            }
        );
        assert_eq!(snapshot.seat_patch(SeatKey::T2P2).occupant, Some(None));
        assert!(snapshot.seat_patch(SeatKey::T1P2).is_empty());
    }

    #[test]
    fn test_bad_field_does_not_fail_event() {
        let event = ServerEvent::from_json(
            r#"{"type": "game_state_update", "duration": "soon", "game_phase": "overtime",
                "fen": "8/8/8/8/8/8/8/8 w - - 0 1", "t1p2_ready": 7}"#,
        )
        .unwrap();

        let ServerEvent::GameStateUpdate(snapshot) = event else {
            panic!("expected snapshot");
        };
        assert_eq!(snapshot.duration, None);
        assert_eq!(snapshot.game_phase, None);
        assert_eq!(snapshot.t1p2_ready, None);
        assert_eq!(snapshot.fen.as_deref(), Some("8/8/8/8/8/8/8/8 w - - 0 1"));
    }

    #[test]
    fn test_timer_update_key_forms() {
        let event =
            ServerEvent::from_json(r#"{"type": "timer_update", "seconds_remaining": "9.5", "key": 42}"#)
                .unwrap();
        assert_eq!(
            event,
            ServerEvent::TimerUpdate(TimerUpdate {
                seconds_remaining: Some(9.5),
                key: Some(EpochKey::new("42")),
            })
        );
    }

    #[test]
    fn test_move_selected_malformed_move() {
        let event = ServerEvent::from_json(r#"{"type": "move_selected", "move": "e2e4"}"#).unwrap();
        assert_eq!(event, ServerEvent::MoveSelected(MoveSelected { chosen: None }));
    }

    #[test]
    fn test_unknown_type() {
        let event = ServerEvent::from_json(r#"{"type": "chat", "text": "hi"}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown);
        assert!(ServerEvent::from_json(r#"{"text": "no type"}"#).is_err());
    }

    #[test]
    fn test_parse_number_strictness() {
        assert_eq!(parse_number(&json!(" 3.25 ")), Some(3.25));
        assert_eq!(parse_number(&json!("3s")), None);
        assert_eq!(parse_number(&json!("NaN")), None);
        assert_eq!(parse_number(&json!(true)), None);
    }
}
