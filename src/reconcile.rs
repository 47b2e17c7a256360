//! Post-reconnect reconciliation.
//!
//! The controller remembers the local participant's last seat and readiness.
//! After a reconnect that followed a lost connection it compares that memory
//! against the freshly synced store and sends what is needed to restore it.
//!
//! ```text
//!  lost ──▶ freeze memory ──▶ reconnected ──▶ grace ──▶ decide(memory, store)
//!                                                          │
//!        same seat, ready dropped ──▶ +500ms ready ◀───────┤
//!        not seated ──▶ take_seat (──▶ +1000ms ready) ◀────┤
//!        different seat / already restored ──▶ log only ◀──┘
//! ```
//!
//! The memory is a hint. The server's placement always wins; the controller
//! never tries to move the participant out of a seat the server assigned.

use std::time::Duration;

use crate::config::ReconcileTiming;
use crate::connection::ConnectionManager;
use crate::protocol::Command;
use crate::state::{LogKind, Participation, ParticipantId, SeatKey, SessionLog};

/// Anything that can send a command, dropping it when not connected.
pub trait CommandSink: Send + Sync {
    fn send(&self, command: Command) -> bool;
}

impl CommandSink for ConnectionManager {
    fn send(&self, command: Command) -> bool {
        ConnectionManager::send(self, command)
    }
}

/// Last known local participation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RememberedParticipation {
    pub last_seat: SeatKey,
    pub last_ready: bool,
}

impl From<Participation> for RememberedParticipation {
    fn from(p: Participation) -> Self {
        Self {
            last_seat: p.seat,
            last_ready: p.ready,
        }
    }
}

/// Holds the remembered participation and the pending reconciliation.
///
/// The pending value stays frozen from the first abnormal close until a
/// reconciliation run for the current cycle finishes. A loss while a run is
/// in flight starts a new cycle with the same frozen value.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationController {
    memory: Option<RememberedParticipation>,
    pending: Option<RememberedParticipation>,
    cycle: u64,
}

/// One reconciliation handed out on reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileRun {
    pub cycle: u64,
    pub remembered: Option<RememberedParticipation>,
}

impl ReconciliationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current participation. An unseated participation keeps the
    /// previous memory.
    pub fn remember(&mut self, current: Option<Participation>) {
        if let Some(current) = current {
            self.memory = Some(current.into());
        }
    }

    pub fn remembered(&self) -> Option<RememberedParticipation> {
        self.memory
    }

    /// Frozen value the next reconciliation will restore.
    pub fn pending(&self) -> Option<RememberedParticipation> {
        self.pending
    }

    /// Freeze the memory as of the abnormal close. Later losses keep the
    /// first snapshot until a run finishes.
    pub fn on_connection_lost(&mut self) {
        self.cycle += 1;
        if self.pending.is_none() {
            self.pending = self.memory;
        }
    }

    /// Drop any pending reconciliation (intentional disconnect).
    pub fn cancel_pending(&mut self) {
        self.cycle += 1;
        self.pending = None;
    }

    /// Hand out the pending reconciliation. It stays frozen until
    /// [`finish`](Self::finish) is called with the returned run.
    pub fn on_reconnected(&self) -> ReconcileRun {
        ReconcileRun {
            cycle: self.cycle,
            remembered: self.pending,
        }
    }

    /// Release the frozen value once `run` completed. A run from an earlier
    /// cycle is ignored.
    pub fn finish(&mut self, run: ReconcileRun) -> bool {
        if run.cycle != self.cycle {
            return false;
        }
        self.pending = None;
        true
    }
}

/// What reconciliation decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing remembered
    Nothing,

    /// Same seat and readiness as before
    Restored { seat: SeatKey, ready: bool },

    /// Same seat, but readiness was dropped
    ReassertReady { seat: SeatKey },

    /// The server put us elsewhere; accepted as is
    DifferentSeat { current: SeatKey, remembered: SeatKey },

    /// Not seated; claim the remembered seat, then ready up if we were ready
    Reclaim { seat: SeatKey, ready: bool },
}

impl Decision {
    /// Number of commands this decision sends.
    pub fn command_count(&self) -> usize {
        match self {
            Self::Nothing | Self::Restored { .. } | Self::DifferentSeat { .. } => 0,
            Self::ReassertReady { .. } => 1,
            Self::Reclaim { ready, .. } => 1 + usize::from(*ready),
        }
    }
}

/// Compare memory with the current participation.
pub fn decide(
    remembered: Option<RememberedParticipation>,
    current: Option<Participation>,
) -> Decision {
    let Some(remembered) = remembered else {
        return Decision::Nothing;
    };

    match current {
        Some(current) if current.seat == remembered.last_seat => {
            if remembered.last_ready && !current.ready {
                Decision::ReassertReady { seat: current.seat }
            } else {
                Decision::Restored {
                    seat: current.seat,
                    ready: current.ready,
                }
            }
        }
        Some(current) => Decision::DifferentSeat {
            current: current.seat,
            remembered: remembered.last_seat,
        },
        None => Decision::Reclaim {
            seat: remembered.last_seat,
            ready: remembered.last_ready,
        },
    }
}

/// Runs one reconciliation pass.
#[derive(Debug, Clone)]
pub struct Reconciler {
    local_id: ParticipantId,
    timing: ReconcileTiming,
    log: SessionLog,
}

impl Reconciler {
    pub fn new(local_id: impl Into<ParticipantId>, timing: ReconcileTiming, log: SessionLog) -> Self {
        Self {
            local_id: local_id.into(),
            timing,
            log,
        }
    }

    /// Wait for the post-reconnect snapshot, then restore `remembered`.
    ///
    /// `current` is read after the grace period, not before. Commands go
    /// through `sink`; if the connection drops meanwhile they are dropped and
    /// the pass still completes.
    pub async fn run<S, F>(
        &self,
        remembered: Option<RememberedParticipation>,
        current: F,
        sink: &S,
    ) -> Decision
    where
        S: CommandSink + ?Sized,
        F: Fn() -> Option<Participation>,
    {
        let Some(memory) = remembered else {
            self.log.record(LogKind::System, "No previous seat to restore");
            return Decision::Nothing;
        };

        self.log.record(
            LogKind::System,
            format!("Checking if seat {} is still available...", memory.last_seat),
        );
        tokio::time::sleep(self.timing.grace()).await;

        let decision = decide(Some(memory), current());
        tracing::debug!(?decision, "reconciling participation");

        match decision {
            Decision::Nothing => {}
            Decision::Restored { seat, ready } => {
                self.checking_ready(seat);
                self.log.record(
                    LogKind::System,
                    format!("State fully restored! (seat: {}, ready: {})", seat, ready),
                );
            }
            Decision::ReassertReady { seat } => {
                self.checking_ready(seat);
                self.send_ready_after(self.timing.ready_reassert(), sink, "Restoring ready state...")
                    .await;
            }
            Decision::DifferentSeat {
                current,
                remembered,
            } => {
                self.log.record(
                    LogKind::System,
                    format!("Found in different seat {} (was {})", current, remembered),
                );
            }
            Decision::Reclaim { seat, ready } => {
                self.log.record(
                    LogKind::System,
                    format!("Not in any seat - attempting to retake {}...", seat),
                );
                if !sink.send(Command::TakeSeat { seat }) {
                    tracing::debug!(%seat, "take_seat dropped: not connected");
                }
                if ready {
                    self.send_ready_after(
                        self.timing.ready_after_claim(),
                        sink,
                        "Attempting to restore ready state...",
                    )
                    .await;
                }
            }
        }

        decision
    }

    fn checking_ready(&self, seat: SeatKey) {
        self.log.record(
            LogKind::System,
            format!("Already in seat {} - checking ready state...", seat),
        );
    }

    async fn send_ready_after<S: CommandSink + ?Sized>(
        &self,
        delay: Duration,
        sink: &S,
        message: &str,
    ) {
        tokio::time::sleep(delay).await;
        let sent = sink.send(Command::Ready {
            player_id: self.local_id.clone(),
        });
        if !sent {
            tracing::debug!("ready dropped: not connected");
        }
        self.log.record(LogKind::System, message);
    }
}
