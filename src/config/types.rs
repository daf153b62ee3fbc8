//! Typed configuration structures
//!
//! Every section has defaults, so a partial file (or none at all) yields a
//! runnable configuration.

use crate::channels::TwitchConfig;
use crate::logging::LoggingConfig;
use crate::polls::PollsConfig;
use serde::{Deserialize, Serialize};

/// Port the HTTP server listens on by default
pub const DEFAULT_PORT: u16 = 3000;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Poll limits
    pub polls: PollsConfig,

    /// Twitch chat connection
    pub twitch: TwitchConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.server.validate() {
            errors.push(ValidationError {
                path: "server".to_string(),
                message: e,
            });
        }

        if let Err(e) = self.polls.validate() {
            errors.push(ValidationError {
                path: "polls".to_string(),
                message: e,
            });
        }

        match url::Url::parse(&self.twitch.url) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
            Ok(url) => errors.push(ValidationError {
                path: "twitch.url".to_string(),
                message: format!("unsupported scheme {:?}, expected ws or wss", url.scheme()),
            }),
            Err(e) => errors.push(ValidationError {
                path: "twitch.url".to_string(),
                message: e.to_string(),
            }),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// A single validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// `bind:port` as a socket address string
    pub fn address(&self) -> String {
        if self.bind.contains(':') {
            format!("[{}]:{}", self.bind, self.port)
        } else {
            format!("{}:{}", self.bind, self.port)
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("port must be greater than 0".to_string());
        }
        if self.bind.trim().is_empty() {
            return Err("bind address must not be empty".to_string());
        }
        Ok(())
    }
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_ipv6_address_is_bracketed() {
        let server = ServerConfig {
            bind: "::1".to_string(),
            port: 8080,
        };
        assert_eq!(server.address(), "[::1]:8080");
    }

    #[test]
    fn test_validate_collects_every_error() {
        let mut config = Config::default();
        config.server.port = 0;
        config.polls.ttl_ms = 0;
        config.twitch.url = "https://irc-ws.chat.twitch.tv".to_string();

        let errors = config.validate().unwrap_err();
        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["server", "polls", "twitch.url"]);
    }

    #[test]
    fn test_unparseable_twitch_url() {
        let mut config = Config::default();
        config.twitch.url = "not a url".to_string();
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "twitch.url");
    }

    #[test]
    fn test_sections_deserialize_camel_case() {
        let config: Config = serde_json::from_str(
            r#"{"server": {"port": 8080}, "polls": {"ttlMs": 5000}, "twitch": {"maxBackoffSecs": 4}}"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.polls.ttl_ms, 5000);
        assert_eq!(config.twitch.max_backoff_secs, 4);
        assert!(config.twitch.reconnect);
    }
}
