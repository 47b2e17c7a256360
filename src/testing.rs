//! In-memory transport and command sink for tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use crate::connection::{Connector, Frame, Transport};
use crate::error::{Result, SyncError};
use crate::protocol::Command;
use crate::reconcile::CommandSink;

/// Let spawned tasks run until they block. Under paused time this also
/// advances the clock by one millisecond.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Test-side handle to one dialed transport.
#[derive(Clone)]
pub(crate) struct MockLink {
    inbound: mpsc::UnboundedSender<Frame>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<Option<u16>>>,
}

impl MockLink {
    pub(crate) fn push_text(&self, text: impl Into<String>) {
        let _ = self.inbound.send(Frame::Text(text.into()));
    }

    pub(crate) fn push_json(&self, value: serde_json::Value) {
        self.push_text(value.to_string());
    }

    /// Simulate the peer ending the connection.
    pub(crate) fn close_with(&self, code: Option<u16>) {
        let _ = self.inbound.send(Frame::Closed { code });
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub(crate) fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| serde_json::from_str(s).ok())
            .collect()
    }

    /// Close code the client sent, if it closed the transport.
    pub(crate) fn closed_code(&self) -> Option<u16> {
        *self.closed.lock()
    }
}

pub(crate) struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Frame>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<Option<u16>>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sent.lock().push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Frame {
        self.inbound
            .recv()
            .await
            .unwrap_or(Frame::Closed { code: None })
    }

    async fn close(&mut self, code: u16) -> Result<()> {
        *self.closed.lock() = Some(code);
        Ok(())
    }
}

#[derive(Default)]
struct MockState {
    dials: usize,
    links: Vec<MockLink>,
    preload: VecDeque<Vec<Frame>>,
    fail_remaining: usize,
    fail_always: bool,
    dial_delay: Duration,
}

/// Scripted connector. Each successful dial creates a [`MockLink`].
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Connector whose every dial fails.
    pub(crate) fn failing() -> Self {
        let connector = Self::new();
        connector.state.lock().fail_always = true;
        connector
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.state.lock().fail_always = failing;
    }

    /// Fail the next `n` dials.
    pub(crate) fn fail_next(&self, n: usize) {
        self.state.lock().fail_remaining = n;
    }

    /// Make every dial take `delay` before it resolves.
    pub(crate) fn set_dial_delay(&self, delay: Duration) {
        self.state.lock().dial_delay = delay;
    }

    /// Frames delivered right after the next successful dial opens.
    pub(crate) fn preload(&self, frames: Vec<Frame>) {
        self.state.lock().preload.push_back(frames);
    }

    pub(crate) fn dials(&self) -> usize {
        self.state.lock().dials
    }

    pub(crate) fn link_count(&self) -> usize {
        self.state.lock().links.len()
    }

    /// Handle to the `index`th successfully dialed transport.
    pub(crate) fn link(&self, index: usize) -> MockLink {
        self.state.lock().links[index].clone()
    }

    pub(crate) fn last_link(&self) -> MockLink {
        let state = self.state.lock();
        state.links[state.links.len() - 1].clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, endpoint: &Url) -> Result<MockTransport> {
        let delay = {
            let mut state = self.state.lock();
            state.dials += 1;
            state.dial_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if state.fail_always || state.fail_remaining > 0 {
            state.fail_remaining = state.fail_remaining.saturating_sub(1);
            return Err(SyncError::Transport(format!("refused: {}", endpoint)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(frames) = state.preload.pop_front() {
            for frame in frames {
                let _ = tx.send(frame);
            }
        }
        let link = MockLink {
            inbound: tx,
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(None)),
        };
        let transport = MockTransport {
            inbound: rx,
            sent: Arc::clone(&link.sent),
            closed: Arc::clone(&link.closed),
        };
        state.links.push(link);
        Ok(transport)
    }
}

/// Command sink that records what it was asked to send.
#[derive(Clone)]
pub(crate) struct RecordingSink {
    connected: Arc<Mutex<bool>>,
    sent: Arc<Mutex<Vec<Command>>>,
}

impl RecordingSink {
    pub(crate) fn connected() -> Self {
        Self {
            connected: Arc::new(Mutex::new(true)),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        *self.connected.lock() = connected;
    }

    pub(crate) fn sent(&self) -> Vec<Command> {
        self.sent.lock().clone()
    }
}

impl CommandSink for RecordingSink {
    fn send(&self, command: Command) -> bool {
        if !*self.connected.lock() {
            return false;
        }
        self.sent.lock().push(command);
        true
    }
}
