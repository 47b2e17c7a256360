//! Session client.
//!
//! Wires the store, interpreter, connection manager, reconciliation and
//! countdown together for one participant in one session, and validates
//! user intents before anything is sent.
//!
//! ```text
//!                 ┌───────────────────── handler (driver task) ──────────────────────┐
//!  transport ──▶  │ Message ──▶ interpreter ──▶ store ──▶ remember ──▶ clock watch   │
//!                 │ Closed ──▶ abort reconciliation, freeze or drop memory           │
//!                 │ Opened{reconnected} ──▶ spawn reconciliation ──▶ send commands   │
//!                 └──────────────────────────────────────────────────────────────────┘
//!  intents ──▶ validate against store ──▶ ConnectionManager::send
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState, Connector};
use crate::error::{IntentError, Result};
use crate::interpreter::MessageInterpreter;
use crate::protocol::Command;
use crate::reconcile::{Reconciler, ReconciliationController, RememberedParticipation};
use crate::state::{
    spawn_countdown, BoardView, Clock, CountdownView, LogKind, SeatKey, SessionLog, SessionStore,
    Transition,
};

/// A move the local participant wants to propose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveIntent {
    pub from: String,
    pub to: String,
    /// Full position after the move. The server decides legality.
    pub resulting_position: String,
}

impl MoveIntent {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        resulting_position: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            resulting_position: resulting_position.into(),
        }
    }
}

/// One participant's live view of one session.
pub struct SessionClient {
    participant_id: String,
    store: Arc<Mutex<SessionStore>>,
    log: SessionLog,
    connection: ConnectionManager,
    controller: Arc<Mutex<ReconciliationController>>,
    countdown: watch::Receiver<CountdownView>,
    countdown_task: JoinHandle<()>,
}

impl SessionClient {
    /// Start a client. Must be called within a Tokio runtime.
    pub fn start<C: Connector>(connector: C, config: SyncConfig) -> Result<Self> {
        let participant_id = config.participant_id.clone();
        let log = SessionLog::new();
        let store = Arc::new(Mutex::new(SessionStore::new(participant_id.clone())));
        let controller = Arc::new(Mutex::new(ReconciliationController::new()));

        let (clock_tx, clock_rx) = watch::channel(Clock::default());
        let (countdown, countdown_task) = spawn_countdown(clock_rx, config.countdown_tick());

        let (connection, driver) = ConnectionManager::prepare(connector, &config, log.clone())?;

        let interpreter = MessageInterpreter::new(participant_id.clone());
        let reconciler = Reconciler::new(participant_id.clone(), config.reconcile.clone(), log.clone());
        let weak = connection.downgrade();
        let handler_store = Arc::clone(&store);
        let handler_controller = Arc::clone(&controller);
        let handler_log = log.clone();

        let mut reconciling: Option<JoinHandle<()>> = None;

        connection.on_event(move |event| match event {
            ConnectionEvent::Message(event) => {
                let mut store = handler_store.lock();
                interpreter.apply(&event, &mut store, &handler_log);
                handler_controller.lock().remember(store.local_participation());
                clock_tx.send_if_modified(|clock| {
                    if *clock == *store.clock() {
                        return false;
                    }
                    *clock = store.clock().clone();
                    true
                });
            }
            ConnectionEvent::Opened { reconnected: true } => {
                let run = handler_controller.lock().on_reconnected();
                let Some(sink) = weak.upgrade() else {
                    return;
                };
                let reconciler = reconciler.clone();
                let store = Arc::clone(&handler_store);
                let controller = Arc::clone(&handler_controller);
                if let Some(stale) = reconciling.take() {
                    stale.abort();
                }
                reconciling = Some(tokio::spawn(async move {
                    reconciler
                        .run(run.remembered, || store.lock().local_participation(), &sink)
                        .await;
                    controller.lock().finish(run);
                }));
            }
            ConnectionEvent::Opened { reconnected: false } => {}
            ConnectionEvent::Closed { intentional } => {
                // A run cut short by a close must not send on the next link.
                if let Some(running) = reconciling.take() {
                    running.abort();
                }
                let mut controller = handler_controller.lock();
                if intentional {
                    controller.cancel_pending();
                } else {
                    controller.on_connection_lost();
                }
            }
            ConnectionEvent::Failed => {
                tracing::warn!("giving up on the session connection");
            }
        });
        driver.start();

        Ok(Self {
            participant_id,
            store,
            log,
            connection,
            controller,
            countdown,
            countdown_task,
        })
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    // Connection

    pub fn connect(&self) {
        self.connection.connect();
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Stop the connection and countdown tasks.
    pub async fn shutdown(&self) {
        self.connection.shutdown().await;
        self.countdown_task.abort();
    }

    // Intents

    /// Ask for a seat. Rejected locally when offline or when the seat is taken
    /// or we are ready elsewhere.
    pub fn take_seat(&self, seat: SeatKey) -> std::result::Result<(), IntentError> {
        if !self.connection.is_connected() {
            return Err(self.reject("Cannot take seat", IntentError::NotConnected));
        }
        if !self.store.lock().can_claim_seat(seat, &self.participant_id) {
            self.log.record(LogKind::Error, "Cannot take this seat");
            return Err(IntentError::SeatUnavailable(seat));
        }
        self.send("Cannot take seat", Command::TakeSeat { seat })
    }

    pub fn ready(&self) -> std::result::Result<(), IntentError> {
        if !self.connection.is_connected() {
            return Err(self.reject("Cannot ready up", IntentError::NotConnected));
        }
        if self.store.lock().local_participation().is_none() {
            return Err(self.reject("Cannot ready up", IntentError::NotSeated));
        }
        self.send(
            "Cannot ready up",
            Command::Ready {
                player_id: self.participant_id.clone(),
            },
        )
    }

    pub fn lock_in_move(&self) -> std::result::Result<(), IntentError> {
        if !self.connection.is_connected() {
            return Err(self.reject("Cannot lock in", IntentError::NotConnected));
        }
        if !self.store.lock().can_make_move() {
            return Err(self.reject("Cannot lock in", IntentError::NotYourTurn));
        }
        self.send(
            "Cannot lock in",
            Command::LockInMove {
                player_id: self.participant_id.clone(),
            },
        )?;
        self.store.lock().lock_in();
        Ok(())
    }

    /// Propose a move. The confirmed position stays as is; the proposal is
    /// kept as speculative state until the next authoritative snapshot.
    pub fn submit_move(&self, intent: MoveIntent) -> std::result::Result<(), IntentError> {
        if !self.connection.is_connected() {
            return Err(self.reject("Cannot submit move", IntentError::NotConnected));
        }
        if !self.store.lock().can_make_move() {
            return Err(self.reject("Cannot submit move", IntentError::NotYourTurn));
        }
        self.send(
            "Cannot submit move",
            Command::SubmitMove {
                player_id: self.participant_id.clone(),
                position: intent.resulting_position,
            },
        )?;
        self.store
            .lock()
            .propose_move(Transition::new(intent.from, intent.to));
        Ok(())
    }

    // Views

    /// Copy of the current store.
    pub fn snapshot(&self) -> SessionStore {
        self.store.lock().clone()
    }

    pub fn board_view(&self) -> BoardView {
        self.store.lock().board_view()
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    /// Displayed remaining seconds and progress, updated every countdown tick.
    pub fn countdown(&self) -> watch::Receiver<CountdownView> {
        self.countdown.clone()
    }

    /// Remembered participation used after a reconnect.
    pub fn remembered(&self) -> Option<RememberedParticipation> {
        self.controller.lock().remembered()
    }

    fn send(&self, action: &str, command: Command) -> std::result::Result<(), IntentError> {
        if self.connection.send(command) {
            Ok(())
        } else {
            Err(self.reject(action, IntentError::NotConnected))
        }
    }

    fn reject(&self, action: &str, error: IntentError) -> IntentError {
        self.log
            .record(LogKind::Error, format!("{}: {}", action, error));
        error
    }
}
