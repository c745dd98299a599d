//! Layered send authorization.
//!
//! Every outbound send must pass through the gate, which enforces the
//! independent safety layers in a fixed order: kill switch, send intent,
//! operator confirmation, grace period, per-run budget, inter-send delay,
//! attachment validation. No caller can reach the transport without an
//! `Open` gate, and the gate cannot reach `Open` without passing every
//! layer.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{ConfigError, Error, SafetyError};

/// Time source, injectable so tests never actually sleep.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time via tokio.
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Deterministic clock for tests. `sleep` records the requested duration
/// and advances the current time instead of waiting.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            slept: Mutex::new(Vec::new()),
        }
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap_or_default();
    }
}

/// Gate lifecycle. Transitions only move forward within a run; an aborted
/// gate stays aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Closed,
    Armed,
    Open,
    Aborted,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Armed => "armed",
            Self::Open => "open",
            Self::Aborted => "aborted",
        }
    }
}

/// Static authorization inputs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Master kill switch. Off means the whole run is a dry run.
    pub kill_switch: bool,
    /// The operator asked this run to send.
    pub send_intent: bool,
    /// Independent confirmation of the send intent.
    pub confirm: bool,
    /// Maximum sends per run.
    pub max_per_run: u32,
    /// Minimum delay between consecutive sends.
    pub inter_send_delay: Duration,
    /// Pause after arming, before the first send is possible.
    pub grace_period: Duration,
}

/// The send authorization gate.
pub struct SafetyGate {
    config: GateConfig,
    clock: Arc<dyn Clock>,
    state: GateState,
    sends_attempted: u32,
    last_attempt_at: Option<DateTime<Utc>>,
}

impl SafetyGate {
    pub fn new(config: GateConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: GateState::Closed,
            sends_attempted: 0,
            last_attempt_at: None,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Sends still allowed within the per-run budget.
    pub fn remaining_budget(&self) -> u32 {
        self.config.max_per_run.saturating_sub(self.sends_attempted)
    }

    /// Arm the gate for live sending.
    ///
    /// All three authorization signals must be present; any absent signal
    /// is a distinct configuration error. Arming waits out the grace
    /// period, giving the operator a last chance to interrupt.
    pub async fn arm(&mut self) -> Result<(), Error> {
        if self.state != GateState::Closed {
            return Err(SafetyError::GateNotOpenable {
                state: self.state.as_str(),
            }
            .into());
        }
        if !self.config.kill_switch {
            return Err(ConfigError::KillSwitchDisabled.into());
        }
        if !self.config.send_intent {
            return Err(ConfigError::SendIntentAbsent.into());
        }
        if !self.config.confirm {
            return Err(ConfigError::ConfirmationAbsent.into());
        }

        if !self.config.grace_period.is_zero() {
            warn!(
                grace_secs = self.config.grace_period.as_secs(),
                max_per_run = self.config.max_per_run,
                "Live sending armed — interrupt now to abort"
            );
            self.clock.sleep(self.config.grace_period).await;
        }

        self.state = GateState::Armed;
        info!(max_per_run = self.config.max_per_run, "Safety gate armed");
        Ok(())
    }

    /// Open the gate for one send.
    ///
    /// Checks the per-run budget, validates the attachment, and waits out
    /// the inter-send delay. An invalid attachment aborts the gate for the
    /// rest of the run: the configuration is wrong, and retrying other
    /// messages with the same CV would fail identically.
    pub async fn open_for_send(&mut self, cv_path: &Path) -> Result<(), Error> {
        if self.state != GateState::Armed {
            return Err(SafetyError::GateNotOpenable {
                state: self.state.as_str(),
            }
            .into());
        }

        if self.sends_attempted >= self.config.max_per_run {
            return Err(SafetyError::BudgetExhausted {
                max_per_run: self.config.max_per_run,
            }
            .into());
        }

        if !cv_path.is_file() {
            self.state = GateState::Aborted;
            return Err(ConfigError::AttachmentMissing(cv_path.to_path_buf()).into());
        }
        let is_pdf = cv_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            self.state = GateState::Aborted;
            return Err(ConfigError::AttachmentNotPdf(cv_path.to_path_buf()).into());
        }

        if let Some(last) = self.last_attempt_at {
            let elapsed = (self.clock.now() - last)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if elapsed < self.config.inter_send_delay {
                self.clock.sleep(self.config.inter_send_delay - elapsed).await;
            }
        }

        self.state = GateState::Open;
        Ok(())
    }

    /// Record one send attempt and re-arm. Failed attempts consume budget
    /// too, so a flapping transport cannot burn through the feed.
    pub fn close_after_send(&mut self) {
        debug_assert_eq!(self.state, GateState::Open);
        self.sends_attempted += 1;
        self.last_attempt_at = Some(self.clock.now());
        self.state = GateState::Armed;
    }

    /// Permanently abort the gate for this run.
    pub fn abort(&mut self, reason: &str) {
        warn!(reason, "Safety gate aborted");
        self.state = GateState::Aborted;
    }
}
