//! Checker configuration.
//!
//! `CheckerOptions` is the raw, serde-facing form (durations as strings
//! like `"5s"`, `"500ms"`, `"2m"`). `CheckerConfig` is the validated form
//! the checker runs with. Every setter clamps out-of-range values instead
//! of failing; only unparseable input is an error.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Raw checker options as they appear in a config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckerOptions {
    pub initial_delay: Option<String>,
    pub period: Option<String>,
    pub success_threshold: Option<i64>,
    pub failure_threshold: Option<i64>,
    pub probe_timeout: Option<String>,
    pub reporter_timeout: Option<String>,
    pub buffer_size: Option<i64>,
}

impl CheckerOptions {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// Validated checker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerConfig {
    initial_delay: Duration,
    period: Duration,
    success_threshold: u32,
    failure_threshold: u32,
    probe_timeout: Duration,
    reporter_timeout: Duration,
    buffer_size: usize,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            period: Duration::from_secs(10),
            success_threshold: 1,
            failure_threshold: 3,
            probe_timeout: Duration::from_secs(5),
            reporter_timeout: Duration::from_secs(30),
            buffer_size: 10,
        }
    }
}

impl CheckerConfig {
    /// Delay before the first round. Zero, or at least one second.
    pub fn with_initial_delay(mut self, d: Duration) -> Self {
        self.initial_delay = if d.is_zero() { d } else { d.max(MIN_PERIOD) };
        self
    }

    /// Time between round starts, at least one second.
    pub fn with_period(mut self, d: Duration) -> Self {
        self.period = d.max(MIN_PERIOD);
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Timeout applied to probes registered without one, at least one second.
    pub fn with_probe_timeout(mut self, d: Duration) -> Self {
        self.probe_timeout = d.max(MIN_PERIOD);
        self
    }

    /// Elapsed-time budget for one reporter's retries, at least one second.
    pub fn with_reporter_timeout(mut self, d: Duration) -> Self {
        self.reporter_timeout = d.max(MIN_PERIOD);
        self
    }

    /// Per-watcher queue capacity, at least one.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn success_threshold(&self) -> u32 {
        self.success_threshold
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub fn reporter_timeout(&self) -> Duration {
        self.reporter_timeout
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

impl TryFrom<CheckerOptions> for CheckerConfig {
    type Error = ConfigError;

    fn try_from(opts: CheckerOptions) -> Result<Self, Self::Error> {
        let mut config = CheckerConfig::default();

        if let Some(s) = &opts.initial_delay {
            config = config.with_initial_delay(duration_field("initial_delay", s)?);
        }
        if let Some(s) = &opts.period {
            config = config.with_period(duration_field("period", s)?);
        }
        if let Some(s) = &opts.probe_timeout {
            config = config.with_probe_timeout(duration_field("probe_timeout", s)?);
        }
        if let Some(s) = &opts.reporter_timeout {
            config = config.with_reporter_timeout(duration_field("reporter_timeout", s)?);
        }
        if let Some(t) = opts.success_threshold {
            config = config.with_success_threshold(clamp_u32(t));
        }
        if let Some(t) = opts.failure_threshold {
            config = config.with_failure_threshold(clamp_u32(t));
        }
        if let Some(size) = opts.buffer_size {
            config = config.with_buffer_size(usize::try_from(size.max(1)).unwrap_or(usize::MAX));
        }

        Ok(config)
    }
}

fn clamp_u32(v: i64) -> u32 {
    u32::try_from(v.max(1)).unwrap_or(u32::MAX)
}

fn duration_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })
}

/// Parse a duration string like "5s", "500ms", "1m". A plain number is
/// taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
