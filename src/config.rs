use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::game::constants::tick;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Time between simulation ticks in milliseconds
    pub tick_interval_ms: u64,
    /// Per-connection outbound queue depth (messages)
    pub outbound_queue: usize,
    /// Largest inbound WebSocket message accepted, in bytes
    pub max_message_size: usize,
    /// Directory served for non-API paths
    pub static_dir: PathBuf,
    /// Port for the metrics endpoint (0 disables it)
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            tick_interval_ms: tick::DEFAULT_INTERVAL_MS,
            outbound_queue: 16,
            max_message_size: 4096,
            static_dir: PathBuf::from("./static"),
            metrics_port: 9090,
        }
    }
}

/// Parse an environment variable, keeping `current` when unset or invalid
fn env_or<T: FromStr>(name: &str, current: T, valid: impl Fn(&T) -> bool) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(parsed) if valid(&parsed) => parsed,
            Ok(_) => {
                tracing::warn!("{} out of range ('{}'), using default", name, raw);
                current
            }
            Err(_) => {
                tracing::warn!("Invalid {} '{}', using default", name, raw);
                current
            }
        },
        Err(_) => current,
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let defaults = Self::default();

        let static_dir = std::env::var("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);

        Self {
            bind_address: env_or("BIND_ADDRESS", defaults.bind_address, |_| true),
            port: env_or("PORT", defaults.port, |p| *p > 0),
            tick_interval_ms: env_or("TICK_INTERVAL_MS", defaults.tick_interval_ms, |ms| *ms > 0),
            outbound_queue: env_or("OUTBOUND_QUEUE", defaults.outbound_queue, |n| *n > 0 && *n <= 1024),
            max_message_size: env_or("MAX_MESSAGE_SIZE", defaults.max_message_size, |n| *n >= 64),
            static_dir,
            metrics_port: env_or("METRICS_PORT", defaults.metrics_port, |_| true),
        }
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be at least 1".to_string());
        }
        if self.outbound_queue == 0 {
            return Err("outbound_queue must be at least 1".to_string());
        }
        if self.metrics_port != 0 && self.metrics_port == self.port {
            return Err("metrics_port must differ from port".to_string());
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.outbound_queue, 16);
        assert!(config.metrics_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        // Without env overrides the loaded config is usable
        let config = ServerConfig::load_or_default();
        assert!(config.port > 0);
        assert!(config.tick_interval_ms > 0);
    }

    #[test]
    fn test_env_or_parses_and_validates() {
        std::env::set_var("IDLE_TEST_GOOD", "42");
        std::env::set_var("IDLE_TEST_ZERO", "0");
        std::env::set_var("IDLE_TEST_JUNK", "forty-two");

        assert_eq!(env_or("IDLE_TEST_GOOD", 7u64, |v| *v > 0), 42);
        assert_eq!(env_or("IDLE_TEST_ZERO", 7u64, |v| *v > 0), 7);
        assert_eq!(env_or("IDLE_TEST_JUNK", 7u64, |_| true), 7);
        assert_eq!(env_or("IDLE_TEST_UNSET_VARIABLE", 7u64, |_| true), 7);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ServerConfig::default();
        config.port = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.tick_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.metrics_port = config.port;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.metrics_port = 0;
        assert!(config.validate().is_ok());
        assert!(!config.metrics_enabled());
    }
}
