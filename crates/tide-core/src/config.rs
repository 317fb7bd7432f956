//! tidewater.toml node configuration.
//!
//! Loaded once at startup and passed by reference into each component's
//! constructor. Durations are written as human strings ("200ms", "5s",
//! "2m"); a bare number is read as seconds.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::ChannelName;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSection,
    pub ticker: TickerSection,
    pub retry: RetrySection,
    pub tasks: TasksSection,
    pub api: ApiSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub node_id: i64,
    pub role: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            node_id: 1,
            role: "standalone".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerSection {
    /// How often channel watermarks are recomputed.
    pub interval: String,
    /// Slack added to `now` when choosing the next candidate.
    pub lookahead: String,
    /// Channels tracked from startup.
    pub channels: Vec<ChannelName>,
}

impl Default for TickerSection {
    fn default() -> Self {
        Self {
            interval: "200ms".to_string(),
            lookahead: "200ms".to_string(),
            channels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub attempts: u32,
    pub initial_sleep: String,
    pub max_sleep: String,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            attempts: 10,
            initial_sleep: "500ms".to_string(),
            max_sleep: "1000ms".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksSection {
    /// Upper bound a request handler waits for its task.
    pub wait_timeout: String,
    /// Prefix for message-stream subscription names.
    pub subscription_prefix: String,
}

impl Default for TasksSection {
    fn default() -> Self {
        Self {
            wait_timeout: "30s".to_string(),
            subscription_prefix: "tidewater-querynode".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub port: u16,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self { port: 19530 }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a configuration document.
    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let config: NodeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check that every duration field parses.
    pub fn validate(&self) -> CoreResult<()> {
        for value in [
            &self.ticker.interval,
            &self.ticker.lookahead,
            &self.retry.initial_sleep,
            &self.retry.max_sleep,
            &self.tasks.wait_timeout,
        ] {
            parse_duration(value)?;
        }
        Ok(())
    }
}

/// Parse a duration string like "5s", "500ms", "2m" or "10".
pub fn parse_duration(s: &str) -> CoreResult<Duration> {
    let s = s.trim();
    let invalid = || CoreError::InvalidDuration(s.to_string());
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| invalid())
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    } else {
        s.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = NodeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.retry.attempts, 10);
        assert_eq!(config.api.port, 19530);
    }

    #[test]
    fn parse_minimal() {
        let config = NodeConfig::from_toml_str(
            r#"
[ticker]
interval = "50ms"
channels = ["by-dev-dml_0", "by-dev-dml_1"]
"#,
        )
        .unwrap();
        assert_eq!(config.ticker.interval, "50ms");
        assert_eq!(config.ticker.channels.len(), 2);
        // Untouched sections keep defaults.
        assert_eq!(config.tasks.wait_timeout, "30s");
        assert_eq!(config.node.role, "standalone");
    }

    #[test]
    fn rejects_bad_duration() {
        let err = NodeConfig::from_toml_str("[retry]\nmax_sleep = \"soon\"\n").unwrap_err();
        assert!(matches!(err, CoreError::InvalidDuration(_)));
    }

    #[test]
    fn renders_and_reparses() {
        let mut config = NodeConfig::default();
        config.ticker.channels.push("by-dev-dml_0".to_string());
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("by-dev-dml_0"));

        let back = NodeConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(back.ticker.channels, config.ticker.channels);
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidewater.toml");
        std::fs::write(&path, "[api]\nport = 9000\n").unwrap();

        let config = NodeConfig::from_file(&path).unwrap();
        assert_eq!(config.api.port, 9000);

        let missing = NodeConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(CoreError::ConfigRead { .. })));
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn minutes_that_overflow_are_rejected() {
        let err = parse_duration("18446744073709551615m").unwrap_err();
        assert!(matches!(err, CoreError::InvalidDuration(_)));
        assert_eq!(
            parse_duration("307445734561825860m").unwrap(),
            Duration::from_secs(307445734561825860 * 60)
        );
    }
}
