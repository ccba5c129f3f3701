//! Engine configuration
//!
//! Supplied by the embedding application; every field has a default so a
//! partial JSON document is enough.

use crate::error::ConfigError;
use generative_sandbox::{CapabilityPolicy, CompletenessPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables shared by every interception path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Oracle call timeout in milliseconds
    pub oracle_timeout_ms: u64,
    /// Critic call timeout in milliseconds
    pub critic_timeout_ms: u64,
    /// Memoize materialized attributes on the instance
    pub memoize_attributes: bool,
    /// Maximum entries held by the in-memory cache
    pub cache_capacity: u64,
    /// Entry time-to-live in seconds, `None` keeps entries until evicted
    pub cache_ttl_secs: Option<u64>,
    /// Placeholder detector used by the validator
    pub completeness: CompletenessPolicy,
    /// Sandbox restrictions
    pub policy: CapabilityPolicy,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With oracle timeout
    #[inline]
    #[must_use]
    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout_ms = duration_ms(timeout);
        self
    }

    /// With critic timeout
    #[inline]
    #[must_use]
    pub fn with_critic_timeout(mut self, timeout: Duration) -> Self {
        self.critic_timeout_ms = duration_ms(timeout);
        self
    }

    /// Toggle first-access memoization of materialized attributes
    #[inline]
    #[must_use]
    pub fn with_memoize_attributes(mut self, memoize: bool) -> Self {
        self.memoize_attributes = memoize;
        self
    }

    /// Maximum number of cached sources
    #[inline]
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Expire cached sources `ttl` after insertion
    #[inline]
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = Some(ttl.as_secs());
        self
    }

    /// Select the placeholder detector
    #[inline]
    #[must_use]
    pub fn with_completeness(mut self, completeness: CompletenessPolicy) -> Self {
        self.completeness = completeness;
        self
    }

    /// Capability policy handed to the sandbox
    #[inline]
    #[must_use]
    pub fn with_policy(mut self, policy: CapabilityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Oracle timeout as a [`Duration`]
    #[inline]
    #[must_use]
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    /// Critic timeout as a [`Duration`]
    #[inline]
    #[must_use]
    pub fn critic_timeout(&self) -> Duration {
        Duration::from_millis(self.critic_timeout_ms)
    }

    /// Cache time-to-live, if any
    #[inline]
    #[must_use]
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }

    /// Parse a JSON document; missing fields take their defaults
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on malformed JSON or mistyped fields
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    /// Read and parse a JSON file
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise
    /// as [`Self::from_json`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid("cache_capacity must be positive".into()));
        }
        if self.policy.max_call_depth == 0 {
            return Err(ConfigError::Invalid("policy.max_call_depth must be positive".into()));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            oracle_timeout_ms: 60_000,
            critic_timeout_ms: 30_000,
            memoize_attributes: true,
            cache_capacity: 10_000,
            cache_ttl_secs: None,
            completeness: CompletenessPolicy::default(),
            policy: CapabilityPolicy::default(),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{"oracle_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.oracle_timeout(), Duration::from_millis(250));
        assert_eq!(config.critic_timeout(), Duration::from_secs(30));
        assert!(config.memoize_attributes);
        assert_eq!(config.completeness, CompletenessPolicy::Placeholder);
    }

    #[test]
    fn nested_policy_and_detector_parse() {
        let json = r#"{
            "completeness": "pass_token",
            "cache_ttl_secs": 60,
            "policy": {"max_steps": 10, "wall_clock": 200}
        }"#;
        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.completeness, CompletenessPolicy::PassToken);
        assert_eq!(config.cache_ttl(), Some(Duration::from_secs(60)));
        assert_eq!(config.policy.max_steps, 10);
        assert_eq!(config.policy.wall_clock, Duration::from_millis(200));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = EngineConfig::from_json(r#"{"cache_capacity": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"memoize_attributes": false}}"#).unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert!(!config.memoize_attributes);

        let missing = EngineConfig::from_file("/nonexistent/generative.json").unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));
    }

    #[test]
    fn builders_round_trip_through_json() {
        let config = EngineConfig::new()
            .with_oracle_timeout(Duration::from_secs(2))
            .with_cache_ttl(Duration::from_secs(90))
            .with_memoize_attributes(false);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }
}
