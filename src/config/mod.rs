use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

pub const ENV_CONFIG: &str = "PANECTL_CONFIG";

fn default_idle_secs() -> f64 {
    2.0
}

fn default_run_timeout_secs() -> f64 {
    60.0
}

fn default_lines() -> usize {
    200
}

fn default_exit_tag() -> String {
    "__PANECTL_EXIT:".to_string()
}

fn default_poll_interval_millis() -> u64 {
    300
}

fn default_follow_interval_secs() -> f64 {
    1.0
}

fn default_stop_timeout_secs() -> f64 {
    30.0
}

fn default_delay_enter_secs() -> f64 {
    1.0
}

fn default_managed_session() -> String {
    "panectl".to_string()
}

/// `[run]`: defaults for `run` (and the quiet period for `wait`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunSettings {
    #[serde(default = "default_idle_secs")]
    pub idle_secs: f64,
    #[serde(default = "default_run_timeout_secs")]
    pub timeout_secs: f64,
    #[serde(default = "default_lines")]
    pub lines: usize,
    #[serde(default = "default_exit_tag")]
    pub exit_tag: String,
}

impl RunSettings {
    /// Idle timeout for `run` and `wait`; a non-positive value means the default.
    pub fn timeout(&self, flag: Option<f64>) -> Duration {
        timeout_secs(flag.unwrap_or(self.timeout_secs), default_run_timeout_secs())
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            idle_secs: default_idle_secs(),
            timeout_secs: default_run_timeout_secs(),
            lines: default_lines(),
            exit_tag: default_exit_tag(),
        }
    }
}

/// `[wait]`: idle detector tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WaitSettings {
    #[serde(default = "default_poll_interval_millis")]
    pub poll_interval_millis: u64,
    /// Tail size hashed when no activity timestamp is available.
    #[serde(default = "default_lines")]
    pub hash_lines: usize,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval_millis: default_poll_interval_millis(),
            hash_lines: default_lines(),
        }
    }
}

impl WaitSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis.max(1))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FollowSettings {
    #[serde(default = "default_follow_interval_secs")]
    pub interval_secs: f64,
    #[serde(default = "default_lines")]
    pub lines: usize,
}

impl Default for FollowSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_follow_interval_secs(),
            lines: default_lines(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StopSettings {
    #[serde(default = "default_idle_secs")]
    pub idle_secs: f64,
    #[serde(default = "default_stop_timeout_secs")]
    pub timeout_secs: f64,
}

impl StopSettings {
    /// How long `stop` waits before killing; a non-positive value means the default.
    pub fn timeout(&self, flag: Option<f64>) -> Duration {
        timeout_secs(flag.unwrap_or(self.timeout_secs), default_stop_timeout_secs())
    }
}

impl Default for StopSettings {
    fn default() -> Self {
        Self {
            idle_secs: default_idle_secs(),
            timeout_secs: default_stop_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SendSettings {
    #[serde(default = "default_delay_enter_secs")]
    pub delay_enter_secs: f64,
}

impl Default for SendSettings {
    fn default() -> Self {
        Self {
            delay_enter_secs: default_delay_enter_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolConfig {
    #[serde(default = "default_managed_session")]
    pub managed_session: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases_file: Option<PathBuf>,
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub wait: WaitSettings,
    #[serde(default)]
    pub follow: FollowSettings,
    #[serde(default)]
    pub stop: StopSettings,
    #[serde(default)]
    pub send: SendSettings,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            managed_session: default_managed_session(),
            aliases_file: None,
            run: RunSettings::default(),
            wait: WaitSettings::default(),
            follow: FollowSettings::default(),
            stop: StopSettings::default(),
            send: SendSettings::default(),
        }
    }
}

impl ToolConfig {
    /// Load the effective config for a working directory.
    ///
    /// Lookup order: `.panectl/config.toml` in `start` or an ancestor, then
    /// `$PANECTL_CONFIG`, then the user config dir. Returns defaults (and no
    /// path) when none exist.
    pub fn load(start: &Path) -> Result<(Self, Option<PathBuf>)> {
        let env_path = std::env::var_os(ENV_CONFIG)
            .map(PathBuf::from)
            .filter(|p| p.is_file());
        let candidate = paths::find_project_config(start)
            .or(env_path)
            .or_else(|| paths::user_config_file().filter(|p| p.is_file()));

        match candidate {
            Some(path) => Ok((Self::from_file(&path)?, Some(path))),
            None => Ok((ToolConfig::default(), None)),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// Convert a user-facing seconds value into a duration. Negatives and NaN
/// become zero; values too large to represent saturate at `Duration::MAX`.
pub fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

/// Like [`secs`], but zero or less falls back to `default_secs`.
pub fn timeout_secs(value: f64, default_secs: f64) -> Duration {
    match secs(value) {
        d if d.is_zero() => secs(default_secs),
        d => d,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn default_config_values() {
        let config = ToolConfig::default();
        assert_eq!(config.managed_session, "panectl");
        assert_eq!(config.run.idle_secs, 2.0);
        assert_eq!(config.run.timeout_secs, 60.0);
        assert_eq!(config.run.lines, 200);
        assert_eq!(config.run.exit_tag, "__PANECTL_EXIT:");
        assert_eq!(config.wait.poll_interval(), Duration::from_millis(300));
        assert_eq!(config.wait.hash_lines, 200);
        assert_eq!(config.stop.timeout_secs, 30.0);
        assert_eq!(config.send.delay_enter_secs, 1.0);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join(".panectl");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("config.toml"),
            r#"
managed_session = "ops"

[run]
idle_secs = 5.0
exit_tag = "__EXIT__:"

[wait]
poll_interval_millis = 100
"#,
        )
        .unwrap();

        let (config, path) = ToolConfig::load(tmp.path()).unwrap();
        assert_eq!(path.unwrap(), dir.join("config.toml"));
        assert_eq!(config.managed_session, "ops");
        assert_eq!(config.run.idle_secs, 5.0);
        assert_eq!(config.run.timeout_secs, 60.0);
        assert_eq!(config.run.exit_tag, "__EXIT__:");
        assert_eq!(config.wait.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.follow.interval_secs, 1.0);
    }

    #[test]
    fn invalid_toml_reports_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[run\nidle_secs = ").unwrap();

        let err = ToolConfig::from_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse"));
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let settings = WaitSettings {
            poll_interval_millis: 0,
            hash_lines: 10,
        };
        assert_eq!(settings.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn secs_clamps_invalid_values() {
        assert_eq!(secs(1.5), Duration::from_millis(1500));
        assert_eq!(secs(-3.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
    }

    #[test]
    fn secs_saturates_huge_values() {
        assert_eq!(secs(1e300), Duration::MAX);
        assert_eq!(secs(f64::INFINITY), Duration::MAX);
        assert_eq!(secs(1e19), Duration::from_secs(10_000_000_000_000_000_000));
    }

    #[test]
    fn non_positive_timeouts_use_section_defaults() {
        let run = RunSettings::default();
        assert_eq!(run.timeout(Some(0.0)), Duration::from_secs(60));
        assert_eq!(run.timeout(Some(-4.0)), Duration::from_secs(60));
        assert_eq!(run.timeout(Some(2.5)), Duration::from_millis(2500));

        let stop = StopSettings {
            idle_secs: 1.0,
            timeout_secs: 0.0,
        };
        assert_eq!(stop.timeout(None), Duration::from_secs(30));
        assert_eq!(stop.timeout(Some(f64::NAN)), Duration::from_secs(30));
        assert_eq!(stop.timeout(Some(5.0)), Duration::from_secs(5));
    }
}
