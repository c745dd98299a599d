//! Run configuration from environment variables.
//!
//! Sending is opt-in three times over: the `APPLY_ENABLED` kill switch,
//! the `APPLY_SEND` intent flag, and the `APPLY_CONFIRM` confirmation must
//! all be true before the gate can arm. Anything less is a dry run.

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::error::ConfigError;
use crate::gate::GateConfig;

const DEFAULT_MAX_PER_RUN: u32 = 5;
const DEFAULT_SLEEP_SECS: u64 = 30;
const DEFAULT_GRACE_SECS: u64 = 5;

/// Per-run operational parameters.
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Master kill switch (`APPLY_ENABLED`).
    pub apply_enabled: bool,
    /// Send intent (`APPLY_SEND`).
    pub send: bool,
    /// Send confirmation (`APPLY_CONFIRM`).
    pub confirm: bool,
    /// Per-run send budget (`APPLY_MAX_PER_RUN`).
    pub max_per_run: u32,
    /// Seconds between consecutive sends (`APPLY_SLEEP_SECS`).
    pub sleep_secs: u64,
    /// Grace period after arming (`APPLY_GRACE_SECS`).
    pub grace_secs: u64,
    /// Zero-based override index among multiple extracted emails
    /// (`APPLY_PICK_EMAIL`).
    pub pick_email: Option<usize>,
    /// Only process messages from this source (`APPLY_SOURCE`).
    pub source: Option<String>,
    /// Process at most this many feed messages (`APPLY_LIMIT`).
    pub limit: Option<usize>,
}

impl RunParams {
    pub fn from_env() -> Result<Self, ConfigError> {
        let params = Self {
            apply_enabled: parse_bool("APPLY_ENABLED")?.unwrap_or(false),
            send: parse_bool("APPLY_SEND")?.unwrap_or(false),
            confirm: parse_bool("APPLY_CONFIRM")?.unwrap_or(false),
            max_per_run: parse_number("APPLY_MAX_PER_RUN")?.unwrap_or(DEFAULT_MAX_PER_RUN),
            sleep_secs: parse_number("APPLY_SLEEP_SECS")?.unwrap_or(DEFAULT_SLEEP_SECS),
            grace_secs: parse_number("APPLY_GRACE_SECS")?.unwrap_or(DEFAULT_GRACE_SECS),
            pick_email: parse_number("APPLY_PICK_EMAIL")?,
            source: std::env::var("APPLY_SOURCE").ok().filter(|s| !s.is_empty()),
            limit: parse_number("APPLY_LIMIT")?,
        };

        info!(
            live = params.live(),
            max_per_run = params.max_per_run,
            source = ?params.source,
            limit = ?params.limit,
            "Run parameters loaded"
        );
        Ok(params)
    }

    /// All three authorization signals present.
    pub fn live(&self) -> bool {
        self.apply_enabled && self.send && self.confirm
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            kill_switch: self.apply_enabled,
            send_intent: self.send,
            confirm: self.confirm,
            max_per_run: self.max_per_run,
            inter_send_delay: Duration::from_secs(self.sleep_secs),
            grace_period: Duration::from_secs(self.grace_secs),
        }
    }
}

/// Filesystem locations for the engine's inputs and state.
#[derive(Debug, Clone)]
pub struct EnginePaths {
    pub profiles: PathBuf,
    pub feed: PathBuf,
    pub ledger: PathBuf,
}

impl EnginePaths {
    pub fn from_env() -> Self {
        Self {
            profiles: path_or("PROFILES_PATH", "profiles.json"),
            feed: path_or("FEED_PATH", "feed.json"),
            ledger: path_or("LEDGER_PATH", "data/outbox.db"),
        }
    }
}

fn path_or(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

/// Parse a boolean env var. Accepts true/false, 1/0, yes/no.
/// Unset means `None`; anything else is an error, never a silent default.
fn parse_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(None),
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "" => Ok(None),
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            other => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected true/false, got '{other}'"),
            }),
        },
    }
}

fn parse_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Err(_) => Ok(None),
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var reads are process-global, so these tests set and unset
    // distinct keys and never run concurrently against the same key.

    #[test]
    fn defaults_are_dry_run() {
        let params = RunParams {
            apply_enabled: false,
            send: false,
            confirm: false,
            max_per_run: DEFAULT_MAX_PER_RUN,
            sleep_secs: DEFAULT_SLEEP_SECS,
            grace_secs: DEFAULT_GRACE_SECS,
            pick_email: None,
            source: None,
            limit: None,
        };
        assert!(!params.live());
    }

    #[test]
    fn live_requires_all_three_flags() {
        let mut params = RunParams {
            apply_enabled: true,
            send: true,
            confirm: true,
            max_per_run: 5,
            sleep_secs: 30,
            grace_secs: 5,
            pick_email: None,
            source: None,
            limit: None,
        };
        assert!(params.live());
        params.confirm = false;
        assert!(!params.live());
    }

    #[test]
    fn gate_config_mirrors_params() {
        let params = RunParams {
            apply_enabled: true,
            send: true,
            confirm: true,
            max_per_run: 3,
            sleep_secs: 60,
            grace_secs: 10,
            pick_email: None,
            source: None,
            limit: None,
        };
        let gate = params.gate_config();
        assert!(gate.kill_switch && gate.send_intent && gate.confirm);
        assert_eq!(gate.max_per_run, 3);
        assert_eq!(gate.inter_send_delay, Duration::from_secs(60));
        assert_eq!(gate.grace_period, Duration::from_secs(10));
    }

    #[test]
    fn malformed_bool_is_rejected() {
        unsafe { std::env::set_var("APPLY_TEST_BOOL", "maybe") };
        let result = parse_bool("APPLY_TEST_BOOL");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        unsafe { std::env::remove_var("APPLY_TEST_BOOL") };
    }

    #[test]
    fn bool_accepts_common_spellings() {
        unsafe { std::env::set_var("APPLY_TEST_BOOL2", "1") };
        assert_eq!(parse_bool("APPLY_TEST_BOOL2").unwrap(), Some(true));
        unsafe { std::env::set_var("APPLY_TEST_BOOL2", "no") };
        assert_eq!(parse_bool("APPLY_TEST_BOOL2").unwrap(), Some(false));
        unsafe { std::env::remove_var("APPLY_TEST_BOOL2") };
    }
}
