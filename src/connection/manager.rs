//! Connection manager.
//!
//! A [`ConnectionManager`] is a cheap handle to a driver task. The driver is
//! the only owner of the transport, the pending (re)connect timer and the
//! registered handler; handles talk to it over a command channel.
//!
//! ```text
//!  handle ──Connect/Disconnect/Send/SetHandler──▶ ┌────────┐ ◀── frames ── transport
//!                                                 │ driver │ ◀── timer (one slot)
//!  state() ◀──────── Arc<RwLock<ConnectionState>> └───┬────┘
//!                                                     └──▶ handler(ConnectionEvent)
//! ```

use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use url::Url;

use super::backoff::Backoff;
use super::transport::{Connector, Frame, Transport};
use super::{ConnectionEvent, ConnectionState, LinkEvent, LinkPhase};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::protocol::{Command, ServerEvent, NORMAL_CLOSURE};
use crate::state::{LogKind, SessionLog};

/// Single subscriber for connection events. Runs on the driver task.
pub type EventHandler = Box<dyn FnMut(ConnectionEvent) + Send + 'static>;

enum DriverCommand {
    Connect,
    Disconnect,
    Send(String),
    SetHandler(EventHandler),
    Shutdown,
}

/// Handle to a running connection driver. Clones share the same driver.
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<DriverCommand>,
    state: Arc<RwLock<ConnectionState>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ConnectionManager {
    /// Start the driver. Must be called within a Tokio runtime.
    ///
    /// With `auto_connect` set, the first dial happens after
    /// `initial_connect_delay`.
    pub fn spawn<C: Connector>(connector: C, config: &SyncConfig, log: SessionLog) -> Result<Self> {
        let (manager, driver) = Self::prepare(connector, config, log)?;
        driver.start();
        Ok(manager)
    }

    /// Build the handle and an unstarted driver. Commands issued before
    /// [`PendingDriver::start`] are processed first, so a handler registered
    /// here sees every event.
    pub fn prepare<C: Connector>(
        connector: C,
        config: &SyncConfig,
        log: SessionLog,
    ) -> Result<(Self, PendingDriver<C>)> {
        config.validate()?;
        let endpoint = config.endpoint()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(ConnectionState::default()));
        let task = Arc::new(Mutex::new(None));

        let driver = Driver {
            connector,
            endpoint,
            backoff: Backoff::new(config.reconnect.clone()),
            log,
            shared: Arc::clone(&state),
            commands: rx,
            handler: None,
            transport: None,
            timer: None,
            state: ConnectionState::default(),
        };
        let pending = PendingDriver {
            driver,
            initial_delay: config.auto_connect.then(|| config.initial_connect_delay()),
            task: Arc::clone(&task),
        };

        Ok((
            Self {
                commands: tx,
                state,
                task,
            },
            pending,
        ))
    }

    /// A handle that does not keep the driver alive.
    pub fn downgrade(&self) -> WeakConnection {
        WeakConnection {
            commands: self.commands.downgrade(),
            state: Arc::clone(&self.state),
            task: Arc::clone(&self.task),
        }
    }

    /// Open the transport now. Ignored while connected; cancels a pending timer.
    pub fn connect(&self) {
        self.dispatch(DriverCommand::Connect);
    }

    /// Close with [`NORMAL_CLOSURE`] and stop reconnecting.
    pub fn disconnect(&self) {
        self.dispatch(DriverCommand::Disconnect);
    }

    /// Send a command if connected. Returns `false` (and drops the command)
    /// otherwise; nothing is queued for later.
    pub fn send(&self, command: Command) -> bool {
        if !self.state.read().connected {
            tracing::debug!(kind = command.kind(), "dropping command while disconnected");
            return false;
        }
        match command.to_json_string() {
            Ok(text) => self.commands.send(DriverCommand::Send(text)).is_ok(),
            Err(e) => {
                tracing::warn!(kind = command.kind(), error = %e, "failed to encode command");
                false
            }
        }
    }

    /// Register the event handler, replacing any earlier one.
    pub fn on_event<F>(&self, handler: F)
    where
        F: FnMut(ConnectionEvent) + Send + 'static,
    {
        self.dispatch(DriverCommand::SetHandler(Box::new(handler)));
    }

    pub fn state(&self) -> ConnectionState {
        self.state.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().connected
    }

    /// Stop the driver, closing the transport and clearing any timer.
    pub async fn shutdown(&self) {
        self.dispatch(DriverCommand::Shutdown);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "connection driver ended abnormally");
            }
        }
    }

    fn dispatch(&self, command: DriverCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!("connection driver already stopped");
        }
    }
}

/// Driver built by [`ConnectionManager::prepare`], not yet running.
pub struct PendingDriver<C: Connector> {
    driver: Driver<C>,
    initial_delay: Option<Duration>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<C: Connector> PendingDriver<C> {
    /// Spawn the driver task. Must be called within a Tokio runtime.
    pub fn start(self) {
        let mut driver = self.driver;
        driver.timer = self
            .initial_delay
            .map(|delay| Box::pin(tokio::time::sleep(delay)));
        let handle = tokio::spawn(driver.run());
        *self.task.lock() = Some(handle);
    }
}

/// Non-owning connection handle. See [`ConnectionManager::downgrade`].
#[derive(Clone)]
pub struct WeakConnection {
    commands: mpsc::WeakUnboundedSender<DriverCommand>,
    state: Arc<RwLock<ConnectionState>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl WeakConnection {
    /// The full handle, if the driver is still reachable.
    pub fn upgrade(&self) -> Option<ConnectionManager> {
        Some(ConnectionManager {
            commands: self.commands.upgrade()?,
            state: Arc::clone(&self.state),
            task: Arc::clone(&self.task),
        })
    }
}

enum Wake {
    Command(Option<DriverCommand>),
    Timer,
    Frame(Frame),
}

enum Dialing<T> {
    Done(Result<T>),
    Abandoned { shutdown: bool },
}

struct Driver<C: Connector> {
    connector: C,
    endpoint: Url,
    backoff: Backoff,
    log: SessionLog,
    shared: Arc<RwLock<ConnectionState>>,
    commands: mpsc::UnboundedReceiver<DriverCommand>,
    handler: Option<EventHandler>,
    transport: Option<C::Transport>,
    /// The only pending dial. Replacing it cancels the previous one.
    timer: Option<Pin<Box<Sleep>>>,
    state: ConnectionState,
}

impl<C: Connector> Driver<C> {
    async fn run(mut self) {
        tracing::debug!(endpoint = %self.endpoint, "connection driver started");

        loop {
            // Commands first, so a disconnect wins over frames that are already queued.
            let wake = tokio::select! {
                biased;
                command = self.commands.recv() => Wake::Command(command),
                () = fire(&mut self.timer) => Wake::Timer,
                frame = next_frame(&mut self.transport) => Wake::Frame(frame),
            };

            let flow = match wake {
                Wake::Command(None) | Wake::Command(Some(DriverCommand::Shutdown)) => {
                    ControlFlow::Break(())
                }
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::Timer => {
                    self.timer = None;
                    self.dial().await
                }
                Wake::Frame(frame) => {
                    self.handle_frame(frame);
                    ControlFlow::Continue(())
                }
            };
            if flow.is_break() {
                break;
            }
        }

        self.teardown().await;
        tracing::debug!(endpoint = %self.endpoint, "connection driver stopped");
    }

    async fn handle_command(&mut self, command: DriverCommand) -> ControlFlow<()> {
        match command {
            DriverCommand::Connect => {
                if self.transport.is_some() {
                    tracing::debug!("connect ignored: already connected");
                    return ControlFlow::Continue(());
                }
                self.timer = None;
                if self.state.link.is_terminal() {
                    self.state.reconnect_attempts = 0;
                }
                return self.dial().await;
            }
            DriverCommand::Disconnect => self.disconnect().await,
            DriverCommand::Send(text) => {
                let Some(transport) = self.transport.as_mut() else {
                    tracing::debug!("dropping queued send: transport closed");
                    return ControlFlow::Continue(());
                };
                let sent = transport.send_text(text).await;
                if let Err(e) = sent {
                    tracing::warn!(error = %e, "send failed");
                    self.transport = None;
                    self.emit(ConnectionEvent::Closed { intentional: false });
                    self.connection_lost();
                }
            }
            DriverCommand::SetHandler(handler) => self.handler = Some(handler),
            DriverCommand::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Dial once. Commands keep being served while the handshake is in
    /// flight; a disconnect or shutdown drops the dial.
    async fn dial(&mut self) -> ControlFlow<()> {
        let reconnected = matches!(self.state.link, LinkPhase::Reconnecting | LinkPhase::Failed);
        self.transition(LinkEvent::Dial);
        self.publish();

        let dialing = {
            let connect = self.connector.connect(&self.endpoint);
            tokio::pin!(connect);
            loop {
                tokio::select! {
                    biased;
                    command = self.commands.recv() => match command {
                        None | Some(DriverCommand::Shutdown) => {
                            break Dialing::Abandoned { shutdown: true };
                        }
                        Some(DriverCommand::Disconnect) => {
                            break Dialing::Abandoned { shutdown: false };
                        }
                        Some(DriverCommand::SetHandler(handler)) => self.handler = Some(handler),
                        Some(DriverCommand::Connect) => {
                            tracing::debug!("connect ignored: dial in progress");
                        }
                        Some(DriverCommand::Send(_)) => {
                            tracing::debug!("dropping queued send: dial in progress");
                        }
                    },
                    result = &mut connect => break Dialing::Done(result),
                }
            }
        };

        match dialing {
            Dialing::Done(Ok(transport)) => {
                self.transport = Some(transport);
                self.transition(LinkEvent::Opened);
                self.state.connected = true;
                self.state.reconnecting = false;
                self.state.reconnect_attempts = 0;
                self.publish();

                let message = if reconnected {
                    "Successfully reconnected to game server"
                } else {
                    "Connected to game server"
                };
                self.log.record(LogKind::System, message);
                self.emit(ConnectionEvent::Opened { reconnected });
            }
            Dialing::Done(Err(e)) => {
                tracing::warn!(error = %e, endpoint = %self.endpoint, "dial failed");
                self.connection_lost();
            }
            Dialing::Abandoned { shutdown } => {
                tracing::debug!(endpoint = %self.endpoint, shutdown, "dial abandoned");
                if shutdown {
                    return ControlFlow::Break(());
                }
                self.disconnect().await;
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Text(text) => match ServerEvent::from_json(&text) {
                Ok(event) => self.emit(ConnectionEvent::Message(event)),
                Err(e) => tracing::warn!(error = %e, "discarding unparseable message"),
            },
            Frame::Closed { code } => {
                self.transport = None;
                if code == Some(NORMAL_CLOSURE) {
                    self.closed();
                } else {
                    tracing::info!(?code, "transport closed abnormally");
                    self.emit(ConnectionEvent::Closed { intentional: false });
                    self.connection_lost();
                }
            }
        }
    }

    async fn disconnect(&mut self) {
        self.timer = None;
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close(NORMAL_CLOSURE).await {
                tracing::warn!(error = %e, "close failed");
            }
        }
        if self.state.link != LinkPhase::Closed {
            self.closed();
        }
    }

    /// Normal closure, by us or the server.
    fn closed(&mut self) {
        self.transition(LinkEvent::Close);
        self.state.connected = false;
        self.state.reconnecting = false;
        self.publish();
        self.log.record(LogKind::System, "Disconnected from game server");
        self.emit(ConnectionEvent::Closed { intentional: true });
    }

    fn connection_lost(&mut self) {
        self.state.connected = false;
        if !self.state.reconnecting {
            self.state.reconnecting = true;
            self.log
                .record(LogKind::System, "Connection lost. Attempting to reconnect...");
        }
        self.transition(LinkEvent::Lost);
        self.schedule_reconnect();
        self.publish();
    }

    fn schedule_reconnect(&mut self) {
        let attempts = self.state.reconnect_attempts;
        let max = self.backoff.max_attempts();

        if !self.backoff.can_retry(attempts) {
            self.state.reconnecting = false;
            self.transition(LinkEvent::GiveUp);
            self.log.record(
                LogKind::Error,
                format!("Failed to reconnect after {} attempts. Please refresh the page.", max),
            );
            self.emit(ConnectionEvent::Failed);
            return;
        }

        let delay = self.backoff.delay(attempts);
        self.state.reconnect_attempts = attempts + 1;
        self.log.record(
            LogKind::System,
            format!("Attempting to reconnect... ({}/{})", attempts + 1, max),
        );
        tracing::debug!(attempt = attempts + 1, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        self.timer = Some(Box::pin(tokio::time::sleep(delay)));
    }

    async fn teardown(&mut self) {
        self.timer = None;
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close(NORMAL_CLOSURE).await {
                tracing::warn!(error = %e, "close on teardown failed");
            }
        }
        if self.state.link != LinkPhase::Closed {
            self.transition(LinkEvent::Close);
        }
        self.state.connected = false;
        self.state.reconnecting = false;
        self.publish();
    }

    fn transition(&mut self, event: LinkEvent) {
        if let Err(e) = self.state.link.apply_mut(event) {
            tracing::warn!(error = %e, "ignoring link transition");
        }
    }

    fn publish(&self) {
        *self.shared.write() = self.state.clone();
    }

    fn emit(&mut self, event: ConnectionEvent) {
        match self.handler.as_mut() {
            Some(handler) => handler(event),
            None => tracing::trace!(?event, "no handler registered"),
        }
    }
}

async fn fire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn next_frame<T: Transport>(transport: &mut Option<T>) -> Frame {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::testing::{settle, MockConnector};

    fn config() -> SyncConfig {
        SyncConfig::new("game-1", "alice").with_auto_connect(false)
    }

    fn spawn(connector: &MockConnector) -> (ConnectionManager, SessionLog) {
        let log = SessionLog::new();
        let manager = ConnectionManager::spawn(connector.clone(), &config(), log.clone()).unwrap();
        (manager, log)
    }

    fn recorder(manager: &ConnectionManager) -> Arc<Mutex<Vec<ConnectionEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        manager.on_event(move |event| sink.lock().push(event));
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_connect_is_delayed() {
        let connector = MockConnector::new();
        let log = SessionLog::new();
        let manager = ConnectionManager::spawn(
            connector.clone(),
            &SyncConfig::new("game-1", "alice"),
            log.clone(),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(connector.dials(), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(connector.dials(), 1);
        assert!(manager.is_connected());
        assert!(log.contains("Connected to game server"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        let connector = MockConnector::new();
        let (manager, _log) = spawn(&connector);

        manager.connect();
        manager.connect();
        settle().await;

        assert_eq!(connector.dials(), 1);
        assert_eq!(manager.state().link, LinkPhase::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_connection() {
        let connector = MockConnector::new();
        let (manager, _log) = spawn(&connector);

        let ready = Command::Ready {
            player_id: "alice".into(),
        };
        assert!(!manager.send(ready.clone()));

        manager.connect();
        settle().await;
        assert!(manager.send(ready));
        settle().await;

        assert_eq!(
            connector.link(0).sent_json(),
            vec![json!({"type": "ready", "player_id": "alice"})]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_receives_events_in_order() {
        let connector = MockConnector::new();
        let (manager, _log) = spawn(&connector);
        let events = recorder(&manager);

        manager.connect();
        settle().await;
        let link = connector.link(0);
        link.push_json(json!({"type": "player_ready", "player_id": "bob"}));
        link.push_text("not json");
        link.push_json(json!({"type": "timer_update", "seconds_remaining": 9}));
        link.close_with(Some(1006));
        settle().await;

        let events = events.lock().clone();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], ConnectionEvent::Opened { reconnected: false });
        assert!(matches!(
            &events[1],
            ConnectionEvent::Message(ServerEvent::PlayerReady(p)) if p.player_id.as_deref() == Some("bob")
        ));
        assert!(matches!(
            &events[2],
            ConnectionEvent::Message(ServerEvent::TimerUpdate(_))
        ));
        assert_eq!(events[3], ConnectionEvent::Closed { intentional: false });
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_handler_replaces_earlier() {
        let connector = MockConnector::new();
        let (manager, _log) = spawn(&connector);
        let first = recorder(&manager);
        let second = recorder(&manager);

        manager.connect();
        settle().await;

        assert!(first.lock().is_empty());
        assert_eq!(second.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abnormal_close_reconnects() {
        let connector = MockConnector::new();
        let (manager, log) = spawn(&connector);
        let events = recorder(&manager);

        manager.connect();
        settle().await;
        connector.link(0).close_with(Some(1006));
        settle().await;

        let state = manager.state();
        assert!(!state.connected);
        assert!(state.reconnecting);
        assert_eq!(state.reconnect_attempts, 1);
        assert!(log.contains("Connection lost. Attempting to reconnect..."));
        assert!(log.contains("Attempting to reconnect... (1/10)"));

        // First retry waits 1s plus under 1s of jitter.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(connector.dials(), 2);

        let state = manager.state();
        assert!(state.connected);
        assert!(!state.reconnecting);
        assert_eq!(state.reconnect_attempts, 0);
        assert!(log.contains("Successfully reconnected to game server"));
        assert_eq!(
            events.lock().last(),
            Some(&ConnectionEvent::Opened { reconnected: true })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let connector = MockConnector::failing();
        let (manager, log) = spawn(&connector);
        let events = recorder(&manager);

        manager.connect();
        tokio::time::sleep(Duration::from_secs(400)).await;

        // One initial dial plus ten retries.
        assert_eq!(connector.dials(), 11);
        let state = manager.state();
        assert_eq!(state.link, LinkPhase::Failed);
        assert!(!state.connected);
        assert!(!state.reconnecting);
        assert!(log.contains("Attempting to reconnect... (10/10)"));
        assert!(log.contains("Failed to reconnect after 10 attempts. Please refresh the page."));
        assert_eq!(events.lock().last(), Some(&ConnectionEvent::Failed));

        let lost = log
            .messages()
            .iter()
            .filter(|m| m.starts_with("Connection lost"))
            .count();
        assert_eq!(lost, 1);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(connector.dials(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_connect_after_failure_starts_fresh() {
        let connector = MockConnector::failing();
        let (manager, _log) = spawn(&connector);
        manager.connect();
        tokio::time::sleep(Duration::from_secs(400)).await;
        assert_eq!(manager.state().link, LinkPhase::Failed);

        // Still failing: the cycle restarts from attempt 1 instead of giving up at once.
        manager.connect();
        settle().await;
        assert_eq!(connector.dials(), 12);
        let state = manager.state();
        assert_eq!(state.link, LinkPhase::Reconnecting);
        assert_eq!(state.reconnect_attempts, 1);

        connector.set_failing(false);
        let events = recorder(&manager);
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(connector.dials(), 13);
        assert!(manager.is_connected());
        assert_eq!(
            events.lock().clone(),
            vec![ConnectionEvent::Opened { reconnected: true }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_intentional_disconnect_suppresses_reconnect() {
        let connector = MockConnector::new();
        let (manager, log) = spawn(&connector);
        let events = recorder(&manager);

        manager.connect();
        settle().await;
        let link = connector.link(0);

        manager.disconnect();
        link.close_with(Some(1006));
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(connector.dials(), 1);
        assert_eq!(link.closed_code(), Some(1000));
        let state = manager.state();
        assert_eq!(state.link, LinkPhase::Closed);
        assert!(!state.reconnecting);
        assert!(log.contains("Disconnected from game server"));
        assert!(!log.contains("Connection lost"));
        assert_eq!(
            events.lock().last(),
            Some(&ConnectionEvent::Closed { intentional: true })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let connector = MockConnector::new();
        let (manager, _log) = spawn(&connector);

        manager.connect();
        settle().await;
        connector.link(0).close_with(None);
        settle().await;
        assert!(manager.state().reconnecting);

        manager.disconnect();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(connector.dials(), 1);
        assert_eq!(manager.state().link, LinkPhase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_slow_dial() {
        let connector = MockConnector::new();
        connector.set_dial_delay(Duration::from_secs(60));
        let (manager, log) = spawn(&connector);
        let events = recorder(&manager);

        manager.connect();
        settle().await;
        assert_eq!(manager.state().link, LinkPhase::Connecting);

        manager.disconnect();
        settle().await;
        assert_eq!(manager.state().link, LinkPhase::Closed);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(connector.dials(), 1);
        assert_eq!(connector.link_count(), 0);
        assert!(!manager.is_connected());
        assert!(!log.contains("Connected to game server"));
        assert_eq!(
            events.lock().clone(),
            vec![ConnectionEvent::Closed { intentional: true }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_slow_dial() {
        let connector = MockConnector::new();
        connector.set_dial_delay(Duration::from_secs(60));
        let (manager, _log) = spawn(&connector);

        manager.connect();
        settle().await;

        let start = tokio::time::Instant::now();
        manager.shutdown().await;
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(manager.state().link, LinkPhase::Closed);
        assert_eq!(connector.link_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_dial_failure_retries() {
        let connector = MockConnector::new();
        connector.fail_next(2);
        let (manager, log) = spawn(&connector);

        manager.connect();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(connector.dials(), 3);
        assert_eq!(connector.link_count(), 1);
        assert!(manager.is_connected());
        assert!(log.contains("Attempting to reconnect... (2/10)"));
        assert!(log
            .entries()
            .iter()
            .filter(|e| e.message.starts_with("Attempting to reconnect"))
            .all(|e| e.kind == LogKind::System));

        assert!(manager.send(Command::Ready {
            player_id: "alice".into(),
        }));
        settle().await;
        assert_eq!(
            connector.last_link().sent_json(),
            vec![json!({"type": "ready", "player_id": "alice"})]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_normal_close_does_not_reconnect() {
        let connector = MockConnector::new();
        let (manager, log) = spawn(&connector);

        manager.connect();
        settle().await;
        connector.link(0).close_with(Some(1000));
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(connector.dials(), 1);
        assert_eq!(manager.state().link, LinkPhase::Closed);
        assert!(log.contains("Disconnected from game server"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_handle_tears_down() {
        let connector = MockConnector::new();
        let (manager, _log) = spawn(&connector);
        let weak = manager.downgrade();

        manager.connect();
        settle().await;
        assert!(weak.upgrade().is_some());

        drop(manager);
        settle().await;

        assert!(weak.upgrade().is_none());
        assert_eq!(connector.link(0).closed_code(), Some(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prepared_handler_sees_first_open() {
        let connector = MockConnector::new();
        let config = SyncConfig::new("game-1", "alice").with_initial_connect_delay(Duration::ZERO);
        let (manager, driver) =
            ConnectionManager::prepare(connector.clone(), &config, SessionLog::new()).unwrap();
        let events = recorder(&manager);
        driver.start();
        settle().await;

        assert_eq!(
            events.lock().clone(),
            vec![ConnectionEvent::Opened { reconnected: false }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_transport() {
        let connector = MockConnector::new();
        let (manager, _log) = spawn(&connector);

        manager.connect();
        settle().await;
        manager.shutdown().await;

        assert_eq!(connector.link(0).closed_code(), Some(1000));
        let state = manager.state();
        assert!(!state.connected);
        assert_eq!(state.link, LinkPhase::Closed);
        assert!(!manager.send(Command::Ready {
            player_id: "alice".into()
        }));
    }
}
