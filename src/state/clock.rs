//! Turn clock and local countdown.
//!
//! The server owns the clock. Each fresh countdown carries a new epoch key;
//! the local countdown hard-resets on an epoch change and only adjusts its
//! remaining time otherwise, so a stale countdown never blends into a new one.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default countdown tick (100 ms).
pub const DEFAULT_COUNTDOWN_TICK: Duration = Duration::from_millis(100);

/// Opaque token distinguishing successive countdowns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EpochKey(pub String);

impl EpochKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

/// Server-reported clock state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Clock {
    /// Seconds remaining as last reported
    pub remaining: f64,

    /// Epoch of the countdown `remaining` belongs to
    pub epoch: Option<EpochKey>,
}

impl Clock {
    /// Update the clock. A `None` epoch keeps the current one.
    /// Returns `true` when the epoch changed.
    pub fn set(&mut self, remaining: f64, epoch: Option<EpochKey>) -> bool {
        self.remaining = remaining.max(0.0);
        match epoch {
            Some(epoch) if self.epoch.as_ref() != Some(&epoch) => {
                self.epoch = Some(epoch);
                true
            }
            _ => false,
        }
    }
}

/// What a timer display shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CountdownView {
    /// Seconds left
    pub remaining: f64,

    /// Fraction of the current countdown left, in `[0, 1]`
    pub progress: f64,
}

/// Locally animated countdown driven from [`Clock`] updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Countdown {
    epoch: Option<EpochKey>,
    total: f64,
    remaining: f64,
    synced: Option<Clock>,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the countdown in line with the server clock.
    ///
    /// Repeated syncs with an unchanged clock are ignored so ticking is not undone.
    pub fn sync(&mut self, clock: &Clock) {
        if self.synced.as_ref() == Some(clock) {
            return;
        }
        if clock.epoch != self.epoch || self.synced.is_none() {
            self.epoch = clock.epoch.clone();
            self.total = clock.remaining;
        } else {
            self.total = self.total.max(clock.remaining);
        }
        self.remaining = clock.remaining;
        self.synced = Some(clock.clone());
    }

    /// Advance by `elapsed`, saturating at zero. Returns the new remaining time.
    pub fn tick(&mut self, elapsed: Duration) -> f64 {
        self.remaining = (self.remaining - elapsed.as_secs_f64()).max(0.0);
        self.remaining
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    /// Fraction of the current countdown left, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.total <= 0.0 {
            0.0
        } else {
            (self.remaining / self.total).clamp(0.0, 1.0)
        }
    }

    pub fn epoch(&self) -> Option<&EpochKey> {
        self.epoch.as_ref()
    }

    pub fn view(&self) -> CountdownView {
        CountdownView {
            remaining: self.remaining,
            progress: self.progress(),
        }
    }
}

/// Run a countdown task fed by clock updates.
///
/// Publishes the displayed countdown every `tick`. The task stops when the
/// clock sender is dropped.
pub fn spawn_countdown(
    mut clock_rx: watch::Receiver<Clock>,
    tick: Duration,
) -> (watch::Receiver<CountdownView>, JoinHandle<()>) {
    let mut countdown = Countdown::new();
    countdown.sync(&clock_rx.borrow_and_update());
    let (tx, rx) = watch::channel(countdown.view());

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = clock_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    countdown.sync(&clock_rx.borrow_and_update());
                    ticker.reset();
                }
                _ = ticker.tick() => {
                    if countdown.remaining() > 0.0 {
                        countdown.tick(tick);
                    }
                }
            }
            tx.send_replace(countdown.view());
        }
        tracing::debug!("countdown task stopped");
    });

    (rx, handle)
}
