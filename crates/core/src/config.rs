use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_u64(profile: &str, key: &str) -> Option<u64> {
    let raw = profiled_env_opt(profile, key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", key, raw, e);
            None
        }
    }
}

// ── Scheduler config ──────────────────────────────────────────

/// Timing policy for the task scheduler, typically parsed from TOML or env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How long the scheduler may stay paused with a backlog before the
    /// watchdog force-drains it.
    #[serde(default = "default_starvation_timeout")]
    pub starvation_timeout_ms: u64,
    /// How often the watchdog checks for starvation.
    #[serde(default = "default_starvation_check_interval")]
    pub starvation_check_interval_ms: u64,
}

fn default_starvation_timeout() -> u64 { 15_000 }
fn default_starvation_check_interval() -> u64 { 6_000 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            starvation_timeout_ms: default_starvation_timeout(),
            starvation_check_interval_ms: default_starvation_check_interval(),
        }
    }
}

impl SchedulerConfig {
    /// Parse config from a TOML string. Env overrides apply on top.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides(&active_profile());
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Build config from defaults plus environment variables (loads `.env` first).
    /// Profile is read from `TASKGATE_PROFILE`; when set (e.g. `TEST`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        let mut config = Self::default();
        config.apply_env_overrides(&active_profile());
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn apply_env_overrides(&mut self, profile: &str) {
        if let Some(v) = profiled_env_u64(profile, "TASKGATE_STARVATION_TIMEOUT_MS") {
            self.starvation_timeout_ms = v;
        }
        if let Some(v) = profiled_env_u64(profile, "TASKGATE_STARVATION_CHECK_INTERVAL_MS") {
            self.starvation_check_interval_ms = v;
        }
    }

    /// Reject zero durations: a zero check interval would spin the timer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.starvation_timeout_ms == 0 {
            return Err(ConfigError::Invalid("starvation_timeout_ms must be > 0".into()));
        }
        if self.starvation_check_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "starvation_check_interval_ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn starvation_timeout(&self) -> Duration {
        Duration::from_millis(self.starvation_timeout_ms)
    }

    pub fn starvation_check_interval(&self) -> Duration {
        Duration::from_millis(self.starvation_check_interval_ms)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            "Scheduler config: starvation_timeout={}ms, check_interval={}ms",
            self.starvation_timeout_ms,
            self.starvation_check_interval_ms
        );
    }
}

fn active_profile() -> String {
    env_opt("TASKGATE_PROFILE").unwrap_or_default().to_uppercase()
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, MutexGuard, PoisonError};

    use super::*;

    /// Loaders read process-wide env vars; tests touching them take turns.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[test]
    fn defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.starvation_timeout_ms, 15_000);
        assert_eq!(config.starvation_check_interval_ms, 6_000);
        assert_eq!(config.starvation_timeout(), Duration::from_secs(15));
        assert_eq!(config.starvation_check_interval(), Duration::from_secs(6));
    }

    #[test]
    fn parse_partial_toml_keeps_defaults() {
        let _env = env_lock();
        let cfg = SchedulerConfig::from_toml("starvation_timeout_ms = 500\n").unwrap();
        assert_eq!(cfg.starvation_timeout_ms, 500);
        assert_eq!(cfg.starvation_check_interval_ms, 6_000);
    }

    #[test]
    fn parse_empty_toml() {
        let _env = env_lock();
        let cfg = SchedulerConfig::from_toml("").unwrap();
        assert_eq!(cfg, SchedulerConfig::default());
    }

    #[test]
    fn zero_interval_rejected() {
        let _env = env_lock();
        let err = SchedulerConfig::from_toml("starvation_check_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_rejected() {
        let _env = env_lock();
        let err = SchedulerConfig::from_toml("starvation_timeout_ms = \"soon\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let _env = env_lock();
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("taskgate.toml");
        std::fs::write(
            &path,
            "starvation_timeout_ms = 2000\nstarvation_check_interval_ms = 250\n",
        )
        .unwrap();

        let cfg = SchedulerConfig::from_file(&path).unwrap();
        assert_eq!(cfg.starvation_timeout(), Duration::from_secs(2));
        assert_eq!(cfg.starvation_check_interval(), Duration::from_millis(250));
    }

    #[test]
    fn missing_file_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = SchedulerConfig::from_file(tmp.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn profiled_env_override_wins() {
        let _env = env_lock();
        env::set_var("CFGTEST_TASKGATE_STARVATION_TIMEOUT_MS", "1234");
        env::set_var("CFGTEST_TASKGATE_STARVATION_CHECK_INTERVAL_MS", "not-a-number");

        let mut cfg = SchedulerConfig::default();
        cfg.apply_env_overrides("CFGTEST");
        assert_eq!(cfg.starvation_timeout_ms, 1234);
        assert_eq!(cfg.starvation_check_interval_ms, 6_000);

        env::remove_var("CFGTEST_TASKGATE_STARVATION_TIMEOUT_MS");
        env::remove_var("CFGTEST_TASKGATE_STARVATION_CHECK_INTERVAL_MS");
    }

    #[test]
    fn from_env_uses_active_profile() {
        let _env = env_lock();
        env::set_var("TASKGATE_PROFILE", "envtest");
        env::set_var("ENVTEST_TASKGATE_STARVATION_TIMEOUT_MS", "4321");
        env::set_var("ENVTEST_TASKGATE_STARVATION_CHECK_INTERVAL_MS", "321");

        let from_env = SchedulerConfig::from_env();
        let from_toml = SchedulerConfig::from_toml("starvation_timeout_ms = 10\n");

        env::remove_var("TASKGATE_PROFILE");
        env::remove_var("ENVTEST_TASKGATE_STARVATION_TIMEOUT_MS");
        env::remove_var("ENVTEST_TASKGATE_STARVATION_CHECK_INTERVAL_MS");

        let from_env = from_env.unwrap();
        assert_eq!(from_env.starvation_timeout_ms, 4321);
        assert_eq!(from_env.starvation_check_interval_ms, 321);
        assert_eq!(from_toml.unwrap().starvation_timeout_ms, 4321);
    }
}
