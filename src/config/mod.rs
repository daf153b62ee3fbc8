//! Configuration loading
//!
//! Reads a JSON5 file, applies environment overrides and validates the result.
//! The file is optional; without one every section takes its defaults.

pub mod types;

pub use types::{Config, ServerConfig, ValidationError, DEFAULT_PORT};

use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "CHATPOLL_CONFIG_PATH";

/// Keys whose values are hidden when the configuration is printed
const SECRET_KEYS: &[&str] = &["token", "secret", "password"];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Resolve the config file path.
///
/// `CHATPOLL_CONFIG_PATH` wins; otherwise `<config dir>/chatpoll/config.json5`.
pub fn get_config_path() -> PathBuf {
    resolve_config_path(|name| std::env::var(name).ok())
}

fn resolve_config_path(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = lookup(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chatpoll")
        .join("config.json5")
}

/// Load, override and validate the configuration from the resolved path
pub fn load_config() -> Result<Config, ConfigError> {
    let path = get_config_path();
    let mut config = load_config_from(&path)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Parse the file at `path`. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    json5::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Apply `CHATPOLL_BIND`, `CHATPOLL_PORT` and `CHATPOLL_LOG_LEVEL`
pub fn apply_env_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(bind) = lookup("CHATPOLL_BIND") {
        config.server.bind = bind;
    }
    if let Some(port) = lookup("CHATPOLL_PORT") {
        config.server.port = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("CHATPOLL_PORT is not a port: {:?}", port)))?;
    }
    if let Some(level) = lookup("CHATPOLL_LOG_LEVEL") {
        config.logging.level = level;
    }
    Ok(())
}

/// Validate, folding every failure into one error
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    config.validate().map_err(|errors| {
        let joined = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        ConfigError::Invalid(joined)
    })
}

/// The configuration as JSON with secret values replaced
pub fn redacted(config: &Config) -> Result<Value, ConfigError> {
    let value = serde_json::to_value(config).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Ok(redact_secrets(value))
}

fn redact_secrets(mut value: Value) -> Value {
    match &mut value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let lower = key.to_lowercase();
                if SECRET_KEYS.iter().any(|s| lower.contains(s)) {
                    *child = Value::String("[REDACTED]".to_string());
                } else {
                    *child = redact_secrets(child.take());
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                *item = redact_secrets(item.take());
            }
        }
        _ => {}
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.json5")).unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.polls.ttl_ms, 120_000);
    }

    #[test]
    fn test_load_json5_with_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                // shorter polls for testing
                polls: {{ ttlMs: 1000, }},
                logging: {{ format: "json" }},
            }}"#
        )
        .unwrap();

        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.polls.ttl_ms, 1000);
        assert_eq!(config.polls.max_choices, 50);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_error_names_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ server: ").unwrap();
        let err = load_config_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("CHATPOLL_BIND", "0.0.0.0"),
                ("CHATPOLL_PORT", "8080"),
                ("CHATPOLL_LOG_LEVEL", "debug"),
            ]),
        )
        .unwrap();
        assert_eq!(config.server.address(), "0.0.0.0:8080");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_bad_port_override() {
        let mut config = Config::default();
        let err = apply_env_overrides(&mut config, env(&[("CHATPOLL_PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_config_path_from_env() {
        let path = resolve_config_path(env(&[(CONFIG_PATH_ENV, "/tmp/poll.json5")]));
        assert_eq!(path, PathBuf::from("/tmp/poll.json5"));

        let path = resolve_config_path(env(&[]));
        assert!(path.ends_with("chatpoll/config.json5"));
    }

    #[test]
    fn test_validate_joins_errors() {
        let mut config = Config::default();
        config.server.port = 0;
        config.polls.max_choices = 0;
        let err = validate(&config).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("server: port"));
        assert!(message.contains("polls: polls.maxChoices"));
    }

    #[test]
    fn test_redacted_hides_token() {
        let mut config = Config::default();
        config.twitch.nick = Some("pollbot".to_string());
        config.twitch.oauth_token = Some("abc123".to_string());

        let value = redacted(&config).unwrap();
        assert_eq!(value["twitch"]["oauthToken"], "[REDACTED]");
        assert_eq!(value["twitch"]["nick"], "pollbot");
    }
}
