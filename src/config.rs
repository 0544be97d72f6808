//! Configuration module for ts3query
//!
//! Parses environment variables into a strongly-typed configuration struct.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::debug::DebugLog;
use crate::query::{ClientOptions, DEFAULT_PORT};
use crate::session::{NotifyEvent, ServerSelector, SessionTarget};

/// Main configuration struct containing all settings
#[derive(Debug, Clone)]
pub struct Config {
    /// ServerQuery host
    pub host: String,
    /// ServerQuery TCP port
    pub port: u16,
    /// Seconds allowed for the TCP connect
    pub connect_timeout: Duration,
    /// Seconds allowed for a complete response
    pub read_timeout: Duration,
    /// Query login name
    pub user: Option<String>,
    /// Query login password
    pub password: Option<String>,
    /// Virtual server to select by port
    pub server_port: Option<u16>,
    /// Virtual server to select by id (used when no port is set)
    pub server_id: Option<u32>,
    /// Nickname used when selecting the server
    pub client_name: Option<String>,
    /// Channel to move into after selecting the server
    pub channel_id: Option<u32>,
    /// Notification groups to register for
    pub events: Vec<NotifyEvent>,
    /// Enable verbose logging and debug log retention
    pub debug: bool,
}

/// Configuration error type
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("TS3_HOST").map_err(|_| ConfigError::MissingRequired("TS3_HOST"))?;

        let events = env::var("TS3_EVENTS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                NotifyEvent::parse(s).ok_or_else(|| ConfigError::InvalidValue("TS3_EVENTS", s.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Config {
            host,
            port: parse_u16("TS3_PORT", DEFAULT_PORT)?,
            connect_timeout: Duration::from_secs(parse_u64("TS3_CONNECT_TIMEOUT", 2)?),
            read_timeout: Duration::from_secs(parse_u64("TS3_READ_TIMEOUT", 30)?),
            user: non_empty("TS3_USER"),
            password: non_empty("TS3_PASSWORD"),
            server_port: parse_opt("TS3_SERVER_PORT")?,
            server_id: parse_opt("TS3_SERVER_ID")?,
            client_name: non_empty("TS3_CLIENT_NAME"),
            channel_id: parse_opt("TS3_CHANNEL_ID")?,
            events,
            debug: parse_bool("TS3_DEBUG", false),
        })
    }

    /// Engine options, with a debug log that retains messages in debug mode
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            debug_log: Arc::new(DebugLog::new(self.debug)),
            ..ClientOptions::default()
        }
    }

    /// Session setup derived from the configuration
    pub fn target(&self) -> SessionTarget {
        let server = self
            .server_port
            .map(ServerSelector::Port)
            .or(self.server_id.map(ServerSelector::Id));
        SessionTarget {
            credentials: self.user.clone().zip(self.password.clone()),
            server,
            nickname: self.client_name.clone(),
            channel_id: self.channel_id,
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.is_empty())
}

fn parse_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn parse_opt<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(v) if !v.is_empty() => v
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name, v)),
        _ => Ok(None),
    }
}

fn parse_u16(name: &'static str, default: u16) -> Result<u16, ConfigError> {
    Ok(parse_opt(name)?.unwrap_or(default))
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    Ok(parse_opt(name)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(30),
            user: None,
            password: None,
            server_port: None,
            server_id: None,
            client_name: None,
            channel_id: None,
            events: Vec::new(),
            debug: false,
        }
    }

    #[test]
    fn test_target_prefers_server_port() {
        let config = Config {
            server_port: Some(9987),
            server_id: Some(1),
            ..base()
        };
        assert_eq!(config.target().server, Some(ServerSelector::Port(9987)));

        let config = Config {
            server_id: Some(1),
            ..base()
        };
        assert_eq!(config.target().server, Some(ServerSelector::Id(1)));
    }

    #[test]
    fn test_target_needs_both_credentials() {
        let config = Config {
            user: Some("serveradmin".to_string()),
            ..base()
        };
        assert!(config.target().credentials.is_none());

        let config = Config {
            user: Some("serveradmin".to_string()),
            password: Some("secret".to_string()),
            ..base()
        };
        assert_eq!(
            config.target().credentials,
            Some(("serveradmin".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn test_target_carries_channel_and_nickname() {
        let config = Config {
            server_id: Some(1),
            client_name: Some("bot".to_string()),
            channel_id: Some(4),
            ..base()
        };
        let target = config.target();
        assert_eq!(target.channel_id, Some(4));
        assert_eq!(target.nickname.as_deref(), Some("bot"));
    }

    #[test]
    fn test_client_options_carry_debug_flag() {
        let options = Config {
            debug: true,
            read_timeout: Duration::from_secs(5),
            ..base()
        }
        .client_options();
        assert!(options.debug_log.is_enabled());
        assert_eq!(options.read_timeout, Duration::from_secs(5));
        assert!(!base().client_options().debug_log.is_enabled());
    }
}
