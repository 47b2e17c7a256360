//! Client configuration.
//!
//! Every tunable has a default, so a JSON config only needs the session and
//! participant ids.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{Result, SyncError};

/// Default session server.
pub const DEFAULT_SERVER_URL: &str = "wss://collaborative-checkmate-server.fly.dev";

/// Default initial reconnect delay in milliseconds.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
/// Default maximum reconnect delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default reconnect attempt cap.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// Default upper bound (exclusive) of reconnect jitter in milliseconds.
pub const DEFAULT_MAX_JITTER_MS: u64 = 1000;

/// Reconnect backoff policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

fn default_initial_delay_ms() -> u64 {
    DEFAULT_INITIAL_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_max_jitter_ms() -> u64 {
    DEFAULT_MAX_JITTER_MS
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_jitter_ms: DEFAULT_MAX_JITTER_MS,
        }
    }
}

/// Delays used when restoring participation after a reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReconcileTiming {
    /// Wait for the server's snapshot before inspecting the store
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    /// Delay before re-asserting readiness in an unchanged seat
    #[serde(default = "default_ready_reassert_ms")]
    pub ready_reassert_ms: u64,
    /// Delay between re-claiming a seat and re-sending ready
    #[serde(default = "default_ready_after_claim_ms")]
    pub ready_after_claim_ms: u64,
}

fn default_grace_ms() -> u64 {
    1000
}
fn default_ready_reassert_ms() -> u64 {
    500
}
fn default_ready_after_claim_ms() -> u64 {
    1000
}

impl Default for ReconcileTiming {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
            ready_reassert_ms: default_ready_reassert_ms(),
            ready_after_claim_ms: default_ready_after_claim_ms(),
        }
    }
}

impl ReconcileTiming {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn ready_reassert(&self) -> Duration {
        Duration::from_millis(self.ready_reassert_ms)
    }

    pub fn ready_after_claim(&self) -> Duration {
        Duration::from_millis(self.ready_after_claim_ms)
    }
}

/// Full client configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    pub session_id: String,
    pub participant_id: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    #[serde(default)]
    pub reconcile: ReconcileTiming,
    /// Dial automatically this long after start
    #[serde(default = "default_initial_connect_delay_ms")]
    pub initial_connect_delay_ms: u64,
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
    #[serde(default = "default_countdown_tick_ms")]
    pub countdown_tick_ms: u64,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}
fn default_initial_connect_delay_ms() -> u64 {
    1000
}
fn default_auto_connect() -> bool {
    true
}
fn default_countdown_tick_ms() -> u64 {
    100
}

impl SyncConfig {
    /// Create a configuration with default tunables.
    pub fn new(session_id: impl Into<String>, participant_id: impl Into<String>) -> Self {
        Self {
            server_url: default_server_url(),
            session_id: session_id.into(),
            participant_id: participant_id.into(),
            is_private: false,
            reconnect: ReconnectPolicy::default(),
            reconcile: ReconcileTiming::default(),
            initial_connect_delay_ms: default_initial_connect_delay_ms(),
            auto_connect: default_auto_connect(),
            countdown_tick_ms: default_countdown_tick_ms(),
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    #[must_use]
    pub fn with_private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    #[must_use]
    pub fn with_reconcile(mut self, timing: ReconcileTiming) -> Self {
        self.reconcile = timing;
        self
    }

    #[must_use]
    pub fn with_initial_connect_delay(mut self, delay: Duration) -> Self {
        self.initial_connect_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    pub fn initial_connect_delay(&self) -> Duration {
        Duration::from_millis(self.initial_connect_delay_ms)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms.max(1))
    }

    /// Check tunables for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.session_id.is_empty() {
            return Err(SyncError::Config("session_id is empty".into()));
        }
        if self.participant_id.is_empty() {
            return Err(SyncError::Config("participant_id is empty".into()));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(SyncError::Config("reconnect.max_attempts must be at least 1".into()));
        }
        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(SyncError::Config(format!(
                "reconnect.initial_delay_ms ({}) exceeds max_delay_ms ({})",
                self.reconnect.initial_delay_ms, self.reconnect.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Session-scoped endpoint: `{server}/ws/game/{session}/player/{participant}`.
    pub fn endpoint(&self) -> Result<Url> {
        let mut url = Url::parse(&self.server_url)?;
        url.path_segments_mut()
            .map_err(|()| SyncError::EndpointBase(self.server_url.clone()))?
            .pop_if_empty()
            .extend([
                "ws",
                "game",
                self.session_id.as_str(),
                "player",
                self.participant_id.as_str(),
            ]);
        if self.is_private {
            url.query_pairs_mut().append_pair("is_private", "true");
        }
        Ok(url)
    }
}
