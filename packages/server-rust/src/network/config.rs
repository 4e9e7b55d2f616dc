//! Network configuration types for the function runtime.

use std::time::Duration;

/// Default port the platform expects the runtime on.
pub const DEFAULT_PORT: u16 = 5000;

/// Default upper bound for a single invocation, in seconds.
pub const DEFAULT_FUNCTION_TIMEOUT_SECS: u64 = 900;

/// Top-level network configuration for the runtime.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Deadline handed to each invocation through its context.
    pub function_timeout: Duration,
    /// Maximum time to wait for in-flight invocations after shutdown starts.
    pub drain_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let timeout = Duration::from_secs(DEFAULT_FUNCTION_TIMEOUT_SECS);
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            function_timeout: timeout,
            drain_timeout: timeout,
        }
    }
}

impl NetworkConfig {
    /// `host:port` string suitable for binding.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_config_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.function_timeout, Duration::from_secs(900));
        assert_eq!(config.drain_timeout, config.function_timeout);
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let config = NetworkConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..NetworkConfig::default()
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:0");
    }
}
