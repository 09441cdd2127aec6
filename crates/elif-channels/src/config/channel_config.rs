//! Channel configuration
//!
//! Wire limits, deadlines and queue sizes shared by every channel, loadable
//! from the environment.

use super::defaults::ChannelDefaults;
use super::error::{ConfigError, ConfigSource};
use super::origin::OriginPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for channels and the connections they own
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Maximum inbound frame size in bytes
    pub max_message_size: usize,
    /// Time allowed between frames from the peer before the connection is dropped
    pub pong_wait_secs: u64,
    /// Time allowed for a single write to the peer
    pub write_wait_secs: u64,
    /// Write buffer size in bytes for upgraded connections
    pub write_buffer_size: usize,
    /// Capacity of the event loop's inbound queue
    pub event_queue_capacity: usize,
    /// Origin check applied before upgrading
    #[serde(skip)]
    pub origin_policy: OriginPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_message_size: ChannelDefaults::MAX_MESSAGE_SIZE,
            pong_wait_secs: ChannelDefaults::PONG_WAIT_SECS,
            write_wait_secs: ChannelDefaults::WRITE_WAIT_SECS,
            write_buffer_size: ChannelDefaults::WRITE_BUFFER_SIZE,
            event_queue_capacity: ChannelDefaults::EVENT_QUEUE_CAPACITY,
            origin_policy: OriginPolicy::AllowAll,
        }
    }
}

impl ChannelConfig {
    /// Load configuration from `CHANNEL_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_message_size = parse_env(
            "CHANNEL_MAX_MESSAGE_SIZE",
            "max_message_size",
            ChannelDefaults::MAX_MESSAGE_SIZE,
            "valid number of bytes",
        )?;

        let pong_wait_secs = parse_env(
            "CHANNEL_PONG_WAIT",
            "pong_wait_secs",
            ChannelDefaults::PONG_WAIT_SECS,
            "valid number of seconds",
        )?;

        let write_wait_secs = parse_env(
            "CHANNEL_WRITE_WAIT",
            "write_wait_secs",
            ChannelDefaults::WRITE_WAIT_SECS,
            "valid number of seconds",
        )?;

        let write_buffer_size = parse_env(
            "CHANNEL_WRITE_BUFFER_SIZE",
            "write_buffer_size",
            ChannelDefaults::WRITE_BUFFER_SIZE,
            "valid number of bytes",
        )?;

        let event_queue_capacity = parse_env(
            "CHANNEL_EVENT_QUEUE_CAPACITY",
            "event_queue_capacity",
            ChannelDefaults::EVENT_QUEUE_CAPACITY,
            "positive queue capacity",
        )?;

        let origin_policy = match env::var("CHANNEL_ALLOWED_ORIGINS") {
            Ok(raw) => OriginPolicy::allow_list(
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty()),
            ),
            Err(_) => OriginPolicy::AllowAll,
        };

        let config = ChannelConfig {
            max_message_size,
            pong_wait_secs,
            write_wait_secs,
            write_buffer_size,
            event_queue_capacity,
            origin_policy,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_size == 0 {
            return Err(ConfigError::validation_failed(
                "Maximum message size must be greater than 0",
            ));
        }

        if self.pong_wait_secs == 0 {
            return Err(ConfigError::validation_failed(
                "Pong wait must be greater than 0",
            ));
        }

        if self.write_wait_secs == 0 {
            return Err(ConfigError::validation_failed(
                "Write wait must be greater than 0",
            ));
        }

        if self.write_buffer_size == 0 {
            return Err(ConfigError::validation_failed(
                "Write buffer size must be greater than 0",
            ));
        }

        if self.event_queue_capacity == 0 {
            return Err(ConfigError::validation_failed(
                "Event queue capacity must be greater than 0",
            ));
        }

        if let OriginPolicy::AllowList(origins) = &self.origin_policy {
            if origins.is_empty() {
                return Err(ConfigError::validation_failed(
                    "Allowed origin list must not be empty",
                ));
            }
        }

        Ok(())
    }

    /// Get configuration source information for debugging
    pub fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let vars = [
            ("max_message_size", "CHANNEL_MAX_MESSAGE_SIZE"),
            ("pong_wait_secs", "CHANNEL_PONG_WAIT"),
            ("write_wait_secs", "CHANNEL_WRITE_WAIT"),
            ("write_buffer_size", "CHANNEL_WRITE_BUFFER_SIZE"),
            ("event_queue_capacity", "CHANNEL_EVENT_QUEUE_CAPACITY"),
            ("origin_policy", "CHANNEL_ALLOWED_ORIGINS"),
        ];

        vars.into_iter()
            .map(|(field, var)| {
                let source = if env::var(var).is_ok() {
                    ConfigSource::EnvVar(var.to_string())
                } else {
                    ConfigSource::Default(field.to_string())
                };
                (field.to_string(), source)
            })
            .collect()
    }

    /// Set the origin policy
    pub fn with_origin_policy(mut self, policy: OriginPolicy) -> Self {
        self.origin_policy = policy;
        self
    }

    /// Set the maximum inbound frame size
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the pong wait in seconds; the ping period follows from it
    pub fn with_pong_wait_secs(mut self, secs: u64) -> Self {
        self.pong_wait_secs = secs;
        self
    }

    /// Get the pong wait as Duration
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Keepalive ping period, always nine tenths of the pong wait
    pub fn ping_period(&self) -> Duration {
        self.pong_wait() * 9 / 10
    }

    /// Get the write wait as Duration
    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }
}

fn parse_env<T: FromStr>(
    key: &str,
    field: &str,
    default: T,
    expected: &str,
) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw,
            expected: expected.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Global test lock to prevent concurrent environment modifications
    static TEST_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 6] = [
        "CHANNEL_MAX_MESSAGE_SIZE",
        "CHANNEL_PONG_WAIT",
        "CHANNEL_WRITE_WAIT",
        "CHANNEL_WRITE_BUFFER_SIZE",
        "CHANNEL_EVENT_QUEUE_CAPACITY",
        "CHANNEL_ALLOWED_ORIGINS",
    ];

    fn clean_test_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_channel_config_defaults() {
        let config = ChannelConfig::default();

        assert_eq!(config.max_message_size, 512);
        assert_eq!(config.pong_wait(), Duration::from_secs(60));
        assert_eq!(config.ping_period(), Duration::from_secs(54));
        assert_eq!(config.write_wait(), Duration::from_secs(10));
        assert!(config.ping_period() < config.pong_wait());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_channel_config_from_env() {
        let _guard = TEST_MUTEX.lock().unwrap();
        clean_test_env();
        env::set_var("CHANNEL_MAX_MESSAGE_SIZE", "4096");
        env::set_var("CHANNEL_PONG_WAIT", "30");
        env::set_var("CHANNEL_ALLOWED_ORIGINS", "https://a.example, https://b.example");

        let config = ChannelConfig::from_env().unwrap();

        assert_eq!(config.max_message_size, 4096);
        assert_eq!(config.pong_wait_secs, 30);
        assert_eq!(config.ping_period(), Duration::from_secs(27));
        assert_eq!(config.write_wait_secs, ChannelDefaults::WRITE_WAIT_SECS);
        assert!(config.origin_policy.allows(Some("https://b.example")));
        assert!(!config.origin_policy.allows(Some("https://c.example")));

        let sources = config.config_sources();
        assert_eq!(
            sources.get("pong_wait_secs"),
            Some(&ConfigSource::EnvVar("CHANNEL_PONG_WAIT".to_string()))
        );
        assert_eq!(
            sources.get("write_wait_secs"),
            Some(&ConfigSource::Default("write_wait_secs".to_string()))
        );

        clean_test_env();
    }

    #[test]
    fn test_invalid_env_value() {
        let _guard = TEST_MUTEX.lock().unwrap();
        clean_test_env();
        env::set_var("CHANNEL_WRITE_WAIT", "soon");

        let err = ChannelConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "write_wait_secs"));

        clean_test_env();
    }

    #[test]
    fn test_validation() {
        let mut config = ChannelConfig::default();
        config.event_queue_capacity = 0;
        assert!(config.validate().is_err());

        let config = ChannelConfig::default().with_max_message_size(0);
        assert!(config.validate().is_err());

        let config = ChannelConfig::default().with_origin_policy(OriginPolicy::AllowList(vec![]));
        assert!(config.validate().is_err());
    }
}
