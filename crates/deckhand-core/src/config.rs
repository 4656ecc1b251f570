//! deckhand.toml configuration.
//!
//! The file holds human-friendly duration strings; components take the
//! resolved `*Settings` structs.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use serde::{Deserialize, Serialize};

use crate::logging::LogConfig;

/// Hard ceiling on one evaluation watch.
pub const DEFAULT_MONITOR_DEADLINE: Duration = Duration::from_secs(5 * 60);
/// Pace of evaluation re-queries.
pub const DEFAULT_MONITOR_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Canary health deadline used when the job declares none.
pub const DEFAULT_CANARY_HEALTH_DEADLINE: Duration = Duration::from_secs(5 * 60);
/// Pace of deployment re-fetches while waiting for canaries.
pub const DEFAULT_CANARY_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Debounce before the "waiting for a runner" hint.
pub const DEFAULT_HINT_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckhandConfig {
    pub monitor: MonitorConfig,
    pub canary: CanaryConfig,
    pub stream: StreamConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub deadline: String,
    pub poll_interval: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            deadline: "5m".to_string(),
            poll_interval: "5s".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanaryConfig {
    pub health_deadline: String,
    pub poll_interval: String,
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self {
            health_deadline: "5m".to_string(),
            poll_interval: "5s".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub hint_delay: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            hint_delay: "1500ms".to_string(),
        }
    }
}

/// Resolved evaluation-monitor timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub deadline: Duration,
    pub poll_interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_MONITOR_DEADLINE,
            poll_interval: DEFAULT_MONITOR_POLL_INTERVAL,
        }
    }
}

/// Resolved canary-promoter timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanarySettings {
    pub health_deadline: Duration,
    pub poll_interval: Duration,
}

impl Default for CanarySettings {
    fn default() -> Self {
        Self {
            health_deadline: DEFAULT_CANARY_HEALTH_DEADLINE,
            poll_interval: DEFAULT_CANARY_POLL_INTERVAL,
        }
    }
}

/// Resolved job-stream consumer timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub hint_delay: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            hint_delay: DEFAULT_HINT_DELAY,
        }
    }
}

impl MonitorConfig {
    pub fn settings(&self) -> anyhow::Result<MonitorSettings> {
        Ok(MonitorSettings {
            deadline: required_duration("monitor.deadline", &self.deadline)?,
            poll_interval: required_duration("monitor.poll_interval", &self.poll_interval)?,
        })
    }
}

impl CanaryConfig {
    pub fn settings(&self) -> anyhow::Result<CanarySettings> {
        Ok(CanarySettings {
            health_deadline: required_duration("canary.health_deadline", &self.health_deadline)?,
            poll_interval: required_duration("canary.poll_interval", &self.poll_interval)?,
        })
    }
}

impl StreamConfig {
    pub fn settings(&self) -> anyhow::Result<StreamSettings> {
        Ok(StreamSettings {
            hint_delay: required_duration("stream.hint_delay", &self.hint_delay)?,
        })
    }
}

impl DeckhandConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: DeckhandConfig = toml::from_str(content)?;
        config.monitor.settings()?;
        config.canary.settings()?;
        config.stream.settings()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn required_duration(field: &str, value: &str) -> anyhow::Result<Duration> {
    let duration =
        parse_duration(value).ok_or_else(|| anyhow!("{field}: invalid duration {value:?}"))?;
    if duration.is_zero() {
        return Err(anyhow!("{field}: duration must be greater than zero"));
    }
    Ok(duration)
}

/// Parse `"500ms"`, `"5s"`, `"2m"`, or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_timings() {
        let config = DeckhandConfig::default();
        assert_eq!(config.monitor.settings().unwrap(), MonitorSettings::default());
        assert_eq!(config.canary.settings().unwrap(), CanarySettings::default());
        assert_eq!(config.stream.settings().unwrap(), StreamSettings::default());
    }

    #[test]
    fn parse_partial_document() {
        let config = DeckhandConfig::from_toml_str(
            r#"
[monitor]
deadline = "10m"

[stream]
hint_delay = "2s"
"#,
        )
        .unwrap();

        let monitor = config.monitor.settings().unwrap();
        assert_eq!(monitor.deadline, Duration::from_secs(600));
        assert_eq!(monitor.poll_interval, Duration::from_secs(5));
        assert_eq!(
            config.stream.settings().unwrap().hint_delay,
            Duration::from_secs(2)
        );
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn rejects_bad_durations() {
        let err = DeckhandConfig::from_toml_str("[canary]\npoll_interval = \"soon\"\n").unwrap_err();
        assert!(err.to_string().contains("canary.poll_interval"));

        let err = DeckhandConfig::from_toml_str("[monitor]\ndeadline = \"0s\"\n").unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deckhand.toml");
        std::fs::write(&path, "[log]\nfilter = \"debug\"\njson = true\n").unwrap();

        let config = DeckhandConfig::from_file(&path).unwrap();
        assert_eq!(config.log.filter, "debug");
        assert!(config.log.json);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = DeckhandConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(DeckhandConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("later"), None);
    }

    #[test]
    fn overflowing_minutes_are_rejected() {
        assert_eq!(parse_duration("307445734561825861m"), None);

        let err = DeckhandConfig::from_toml_str("[monitor]\ndeadline = \"307445734561825861m\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("monitor.deadline"));
    }
}
