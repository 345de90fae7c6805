//! Test configuration builder for creating test setups quickly.

use std::time::Duration;

use crate::config::{Configuration, DatabaseConfig};

/// Builder for creating test configurations.
///
/// ```rust,ignore
/// use common::testing::TestConfigBuilder;
///
/// let config = TestConfigBuilder::new()
///     .in_memory()
///     .with_instance("backend-1", "127.0.0.1:4001")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Configuration::default(),
        }
    }

    /// In-memory entry database and a short operation timeout.
    pub fn in_memory(mut self) -> Self {
        self.config.database = DatabaseConfig::in_memory();
        self.config.registry.operation_timeout = Duration::from_millis(500);
        self
    }

    /// Set record ttl and heartbeat interval together.
    pub fn with_ttl(mut self, ttl: Duration, heartbeat_interval: Duration) -> Self {
        self.config.registry.ttl = ttl;
        self.config.registry.heartbeat_interval = heartbeat_interval;
        self
    }

    pub fn with_membership_set(mut self, key: &str) -> Self {
        self.config.registry.membership_set = key.to_string();
        self
    }

    pub fn with_registry(mut self, host: &str, port: u16, password: Option<&str>) -> Self {
        self.config.registry.host = host.to_string();
        self.config.registry.port = port;
        self.config.registry.password = password.map(str::to_string);
        self
    }

    /// Fix the identity instead of generating one.
    pub fn with_instance(mut self, id: &str, address: &str) -> Self {
        self.config.instance.id = Some(id.to_string());
        self.config.instance.address = Some(address.to_string());
        self
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.config.http.port = port;
        self
    }

    pub fn with_database_dsn(mut self, dsn: &str) -> Self {
        self.config.database.dsn = dsn.to_string();
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_builder_is_valid() {
        let config = TestConfigBuilder::new().build();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_in_memory_builder() {
        let config = TestConfigBuilder::new().in_memory().build();
        assert_eq!(config.database.dsn, "sqlite::memory:");
        assert_eq!(config.registry.operation_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_custom_values() {
        let config = TestConfigBuilder::new()
            .with_ttl(Duration::from_secs(3), Duration::from_secs(1))
            .with_membership_set("fleet-b")
            .with_registry("redis.test", 6390, Some("pw"))
            .with_instance("i-1", "10.0.0.1:4001")
            .with_http_port(4001)
            .build();

        assert_eq!(config.registry.ttl, Duration::from_secs(3));
        assert_eq!(config.registry.membership_set, "fleet-b");
        assert_eq!(config.registry.password.as_deref(), Some("pw"));
        assert_eq!(config.instance.id.as_deref(), Some("i-1"));
        assert_eq!(config.http.port, 4001);
        assert!(config.validate().is_ok());
    }
}
