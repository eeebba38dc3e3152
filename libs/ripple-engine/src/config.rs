use std::time::Duration;

use serde::Deserialize;

use crate::error::EngineError;

// ═══════════════════════════════════════════════════════════════
//  File form (TOML sections)
// ═══════════════════════════════════════════════════════════════

/// `[window]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WindowSettings {
    /// Flush as soon as a window holds this many records.
    #[serde(default = "default_max_count")]
    pub max_count: usize,
    /// Flush a non-empty window this long after it opened.
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            max_count: default_max_count(),
            max_duration_ms: default_max_duration_ms(),
        }
    }
}

fn default_max_count() -> usize {
    30
}
fn default_max_duration_ms() -> u64 {
    5_000
}

/// `[retry]` section. `max_attempts = 1` means a single attempt, no retry.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on every further attempt.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    1
}
fn default_backoff_ms() -> u64 {
    200
}
fn default_max_backoff_ms() -> u64 {
    5_000
}

// ═══════════════════════════════════════════════════════════════
//  Validated form
// ═══════════════════════════════════════════════════════════════

/// Window limits. Both are strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    max_count: usize,
    max_duration: Duration,
}

impl WindowConfig {
    pub fn new(max_count: usize, max_duration: Duration) -> Result<Self, EngineError> {
        if max_count == 0 {
            return Err(EngineError::Config("window max_count must be greater than 0".into()));
        }
        if max_duration.is_zero() {
            return Err(EngineError::Config(
                "window max_duration must be greater than 0".into(),
            ));
        }
        Ok(Self { max_count, max_duration })
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }
}

impl TryFrom<&WindowSettings> for WindowConfig {
    type Error = EngineError;

    fn try_from(s: &WindowSettings) -> Result<Self, Self::Error> {
        WindowConfig::new(s.max_count, Duration::from_millis(s.max_duration_ms))
    }
}

/// Bounded retry with exponential backoff for sink calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// One attempt per batch.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn new(
        max_attempts: u32,
        backoff: Duration,
        max_backoff: Duration,
    ) -> Result<Self, EngineError> {
        if max_attempts == 0 {
            return Err(EngineError::Config("retry max_attempts must be at least 1".into()));
        }
        if max_backoff < backoff {
            return Err(EngineError::Config(format!(
                "retry max_backoff ({max_backoff:?}) is smaller than backoff ({backoff:?})"
            )));
        }
        Ok(Self { max_attempts, backoff, max_backoff })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt number `attempt` (1-based; attempt 1 has none).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl TryFrom<&RetrySettings> for RetryPolicy {
    type Error = EngineError;

    fn try_from(s: &RetrySettings) -> Result<Self, Self::Error> {
        RetryPolicy::new(
            s.max_attempts,
            Duration::from_millis(s.backoff_ms),
            Duration::from_millis(s.max_backoff_ms),
        )
    }
}

/// Everything one pipeline needs besides its sink.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pipeline name for logs (e.g. peer address).
    pub name: String,
    /// Outer tag of record frames and of status frames.
    pub tag: u8,
    pub window: WindowConfig,
    pub retry: RetryPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct File {
        #[serde(default)]
        window: WindowSettings,
        #[serde(default)]
        retry: RetrySettings,
    }

    #[test]
    fn defaults_match_reference_values() {
        let file: File = toml::from_str("").unwrap();
        let window = WindowConfig::try_from(&file.window).unwrap();
        assert_eq!(window.max_count(), 30);
        assert_eq!(window.max_duration(), Duration::from_secs(5));

        let retry = RetryPolicy::try_from(&file.retry).unwrap();
        assert_eq!(retry.max_attempts(), 1);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let file: File = toml::from_str("[window]\nmax_count = 3\n").unwrap();
        assert_eq!(file.window.max_count, 3);
        assert_eq!(file.window.max_duration_ms, 5_000);
    }

    #[test]
    fn non_positive_limits_are_rejected() {
        assert!(WindowConfig::new(0, Duration::from_secs(1)).is_err());
        assert!(WindowConfig::new(1, Duration::ZERO).is_err());
        assert!(WindowConfig::new(1, Duration::from_millis(1)).is_ok());
    }

    #[test]
    fn negative_count_fails_to_parse() {
        let parsed: Result<File, _> = toml::from_str("[window]\nmax_count = -1\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn retry_needs_at_least_one_attempt() {
        let err = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let retry = RetryPolicy::new(
            6,
            Duration::from_millis(100),
            Duration::from_millis(350),
        )
        .unwrap();
        assert_eq!(retry.delay_before(1), Duration::ZERO);
        assert_eq!(retry.delay_before(2), Duration::from_millis(100));
        assert_eq!(retry.delay_before(3), Duration::from_millis(200));
        assert_eq!(retry.delay_before(4), Duration::from_millis(350));
        assert_eq!(retry.delay_before(40), Duration::from_millis(350));
    }
}
