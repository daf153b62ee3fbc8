//! Poll Configuration
//!
//! Limits applied uniformly to every poll the engine opens.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Time-to-live of a poll session
pub const DEFAULT_POLL_TTL_MS: u64 = 120_000;

/// Largest choice count accepted when opening a poll
pub const DEFAULT_MAX_CHOICES: usize = 50;

/// Upper bound accepted for `maxChoices`
pub const MAX_CHOICES_LIMIT: usize = 1_000;

/// Fresh keys tried before giving up on a collision
pub const DEFAULT_KEY_ATTEMPTS: usize = 8;

/// Poll limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollsConfig {
    /// Session lifetime in milliseconds
    pub ttl_ms: u64,
    /// Maximum number of choices per poll
    pub max_choices: usize,
    /// Key generation attempts per poll
    pub key_attempts: usize,
}

impl Default for PollsConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_POLL_TTL_MS,
            max_choices: DEFAULT_MAX_CHOICES,
            key_attempts: DEFAULT_KEY_ATTEMPTS,
        }
    }
}

impl PollsConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Validate the limits
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_ms == 0 {
            return Err("polls.ttlMs must be greater than 0".to_string());
        }
        if self.max_choices == 0 {
            return Err("polls.maxChoices must be greater than 0".to_string());
        }
        if self.max_choices > MAX_CHOICES_LIMIT {
            return Err(format!(
                "polls.maxChoices must be at most {}, got {}",
                MAX_CHOICES_LIMIT, self.max_choices
            ));
        }
        if self.key_attempts == 0 {
            return Err("polls.keyAttempts must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PollsConfig::default();
        assert_eq!(config.ttl(), Duration::from_millis(120_000));
        assert_eq!(config.max_choices, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: PollsConfig = serde_json::from_str(r#"{"maxChoices": 9}"#).unwrap();
        assert_eq!(config.max_choices, 9);
        assert_eq!(config.ttl_ms, DEFAULT_POLL_TTL_MS);
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        let config = PollsConfig {
            ttl_ms: 0,
            ..PollsConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PollsConfig {
            max_choices: 0,
            ..PollsConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_caps_max_choices() {
        let config = PollsConfig {
            max_choices: MAX_CHOICES_LIMIT,
            ..PollsConfig::default()
        };
        assert!(config.validate().is_ok());

        let config = PollsConfig {
            max_choices: usize::MAX,
            ..PollsConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("at most 1000"));
    }
}
