//! Message interpreter.
//!
//! Maps each inbound [`ServerEvent`] to store mutations and log entries.
//! Events are applied strictly in arrival order; later partial updates rely on
//! earlier ones.

use crate::protocol::{GameOver, MoveSelected, ServerEvent, StateSnapshot, TimerUpdate};
use crate::state::{LogEntry, LogKind, SeatKey, SessionLog, SessionStore, Transition};

/// Stateless interpreter for one local participant.
#[derive(Debug, Clone)]
pub struct MessageInterpreter {
    local_id: String,
}

impl MessageInterpreter {
    pub fn new(local_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
        }
    }

    /// Apply one event to the store, appending log entries as needed.
    pub fn apply(&self, event: &ServerEvent, store: &mut SessionStore, log: &SessionLog) {
        match event {
            ServerEvent::ConnectionEstablished => {
                tracing::debug!(player_id = %self.local_id, "connection acknowledged");
            }
            ServerEvent::MoveSubmitted(player) => {
                let actor = player.player_id.as_deref().unwrap_or("someone");
                log.push(
                    LogEntry::new(LogKind::Move, format!("{} submitted a move", actor))
                        .with_actor(actor),
                );
            }
            ServerEvent::PlayerReady(player) => self.player_ready(player.player_id.as_deref(), store, log),
            ServerEvent::GameStateUpdate(snapshot) => self.state_update(snapshot, store, log),
            ServerEvent::TimerUpdate(timer) => self.timer_update(timer, store),
            ServerEvent::MoveSelected(selected) => self.move_selected(selected, store, log),
            ServerEvent::PlayerDisconnected(player) => {
                let actor = player.player_id.as_deref().unwrap_or("someone");
                if let Some(seat) = player.player_id.as_deref().and_then(|id| store.current_seat_of(id)) {
                    store.set_seat_ready(seat, false);
                }
                log.push(
                    LogEntry::new(LogKind::System, format!("{} disconnected", actor)).with_actor(actor),
                );
            }
            ServerEvent::GameOver(over) => self.game_over(over, store, log),
            ServerEvent::Unknown => {
                tracing::debug!("ignoring unknown event type");
            }
        }
    }

    fn player_ready(&self, player_id: Option<&str>, store: &mut SessionStore, log: &SessionLog) {
        let Some(player_id) = player_id else {
            tracing::warn!("player_ready without player_id");
            return;
        };

        let seat = store.current_seat_of(player_id);
        if let Some(seat) = seat {
            store.set_seat_ready(seat, true);
        }

        if seat.is_some() && player_id == self.local_id {
            log.record(
                LogKind::System,
                "You are now ready. You cannot change seats until the game ends.",
            );
        } else {
            log.push(
                LogEntry::new(LogKind::System, format!("{} is ready", player_id)).with_actor(player_id),
            );
        }
    }

    fn state_update(&self, snapshot: &StateSnapshot, store: &mut SessionStore, log: &SessionLog) {
        if let Some(phase) = snapshot.game_phase {
            store.set_phase(phase);
            log.record(LogKind::Phase, format!("Phase: {}", phase.display_name()));
        }

        if let Some(duration) = snapshot.duration {
            store.set_clock(duration, None);
        }

        if let Some(fen) = &snapshot.fen {
            store.set_artifact(fen.clone());
            store.clear_selection();
        }

        if let Some(last_move) = &snapshot.last_move {
            match Transition::from_uci(last_move) {
                Some(transition) => store.set_transition_annotation(Some(transition)),
                None => tracing::warn!(last_move = %last_move, "ignoring malformed last_move"),
            }
        }

        let mut seats_changed = false;
        for seat in SeatKey::ALL {
            let patch = snapshot.seat_patch(seat);
            if !patch.is_empty() {
                seats_changed |= store.apply_seat_patch(seat, patch);
            }
        }
        if seats_changed {
            log.record(LogKind::System, "Player seats updated");
        }
    }

    fn timer_update(&self, timer: &TimerUpdate, store: &mut SessionStore) {
        if let Some(remaining) = timer.seconds_remaining {
            if store.set_clock(remaining, timer.key.clone()) {
                tracing::debug!(epoch = ?timer.key, remaining, "new countdown epoch");
            }
        }
    }

    fn move_selected(&self, selected: &MoveSelected, store: &mut SessionStore, log: &SessionLog) {
        store.clear_selection();

        let Some(chosen) = &selected.chosen else {
            log.record(LogKind::Engine, "Engine selected a move");
            return;
        };
        let from = chosen.from.as_deref().unwrap_or("?");
        let to = chosen.to.as_deref().unwrap_or("?");
        let by = chosen.submitted_by.as_deref().unwrap_or("unknown");

        log.push(
            LogEntry::new(
                LogKind::Engine,
                format!("Engine selected move: {} to {} (by {})", from, to, by),
            )
            .with_actor(by),
        );
    }

    fn game_over(&self, over: &GameOver, store: &mut SessionStore, log: &SessionLog) {
        let message = match (&over.message, &over.result) {
            (Some(message), _) => message.clone(),
            (None, Some(result)) => format!("Game Over! {}", result),
            (None, None) => "Game Over!".to_string(),
        };
        log.record(LogKind::GameOver, message);

        if let Some(total) = over.total_moves {
            log.record(LogKind::System, format!("Total moves: {}", total));
        }

        if let Some(team) = &over.team_coordination {
            let fmt = |n: Option<f64>| n.map_or_else(|| "?".to_string(), |n| n.to_string());
            log.record(
                LogKind::System,
                format!(
                    "Team coordination - Team 1: {}, Team 2: {}",
                    fmt(team.team1_same_moves),
                    fmt(team.team2_same_moves)
                ),
            );
        }

        if let Some(position) = &over.final_position {
            store.set_artifact(position.clone());
        }
    }
}
