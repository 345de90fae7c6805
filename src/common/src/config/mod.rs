use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::error::{RegistryError, RegistryResult};
use crate::platform::Platform;

pub const DEFAULT_CONFIG_FILE: &str = "rollcall.toml";
pub const ENV_PREFIX: &str = "ROLLCALL__";

/// Connection to the registry store and the registration protocol timings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub host: String,
    pub port: u16,
    /// Password sent at connect time; `None` for an unauthenticated store
    pub password: Option<String>,
    /// Key of the set listing every instance that has registered
    pub membership_set: String,
    /// Key of the request counter maintained by the frontend
    pub counter_key: String,
    /// Name of the bound platform service holding the store credentials
    pub service_name: String,
    /// Lifetime of a liveness record without a refresh
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Interval between heartbeats; must stay below `ttl`
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// Upper bound for a single store round trip
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 6379,
            password: None,
            membership_set: String::from("redis-discovery-backends"),
            counter_key: String::from("hit-counter"),
            service_name: String::from("redis-discovery"),
            ttl: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(2),
        }
    }
}

impl RegistryConfig {
    /// Connection URL for the store, with the password percent-encoded.
    pub fn redis_url(&self) -> RegistryResult<String> {
        let mut url = url::Url::parse(&format!("redis://{}:{}/", self.host, self.port))
            .map_err(|e| {
                RegistryError::unavailable(format!(
                    "invalid registry address {}:{}: {e}",
                    self.host, self.port
                ))
            })?;
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|_| RegistryError::unavailable("cannot set registry password"))?;
        }
        Ok(url.to_string())
    }
}

/// Identity this process registers under.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Instance identifier; generated at startup when absent
    pub id: Option<String>,
    /// Address other services reach this instance at; derived when absent
    pub address: Option<String>,
    /// Host used to derive the address from the HTTP port
    pub advertise_host: String,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            id: None,
            address: None,
            advertise_host: String::from("127.0.0.1"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
    /// Timeout for outbound calls to discovered backends
    #[serde(with = "humantime_serde")]
    pub client_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: String::from("0.0.0.0"),
            port: 4000,
            client_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub dsn: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("sqlite://.data/rollcall.db"),
        }
    }
}

impl DatabaseConfig {
    /// Create an in-memory database configuration
    pub fn in_memory() -> Self {
        Self {
            dsn: String::from("sqlite::memory:"),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    /// Registry store and protocol timings
    pub registry: RegistryConfig,
    /// Identity advertised by registrants
    pub instance: InstanceConfig,
    /// HTTP listener
    pub http: HttpConfig,
    /// Entry storage used by the backend
    pub database: DatabaseConfig,
}

impl Configuration {
    pub fn load() -> Result<Self> {
        Self::load_with(Figment::from(Toml::file(DEFAULT_CONFIG_FILE)))
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }
        Self::load_with(Figment::from(Toml::file(path)))
    }

    /// Defaults, then the file layer, then the platform environment, then
    /// `ROLLCALL__` variables.
    fn load_with(file: Figment) -> Result<Self> {
        let env = Env::prefixed(ENV_PREFIX).split("__");

        // The platform layer needs to know which bound service to read, which
        // itself may come from the file or the environment.
        let service_name: String = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(file.clone())
            .merge(env.clone())
            .extract_inner("registry.service_name")
            .context("Failed to read registry.service_name")?;

        let platform = Platform::from_env().context("Failed to read platform environment")?;
        if platform.is_present() {
            log::debug!("Applying platform environment (registry service '{service_name}')");
        }

        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(file)
            .merge(platform.provider(&service_name))
            .merge(env)
            .extract()
            .context("Failed to load configuration")?;

        Ok(config)
    }

    /// Reject settings the registry protocol cannot work with.
    pub fn validate(&self) -> Result<()> {
        let registry = &self.registry;
        if registry.host.trim().is_empty() {
            anyhow::bail!("Registry host cannot be empty");
        }
        if registry.membership_set.trim().is_empty() {
            anyhow::bail!("Registry membership set key cannot be empty");
        }
        if registry.ttl.is_zero() {
            anyhow::bail!("Registry ttl must be greater than zero");
        }
        if registry.heartbeat_interval.is_zero() {
            anyhow::bail!("Registry heartbeat interval must be greater than zero");
        }
        if registry.heartbeat_interval >= registry.ttl {
            anyhow::bail!(
                "Registry heartbeat interval ({:?}) must be shorter than the ttl ({:?})",
                registry.heartbeat_interval,
                registry.ttl
            );
        }
        if registry.operation_timeout.is_zero() {
            anyhow::bail!("Registry operation timeout must be greater than zero");
        }
        if self.http.client_timeout.is_zero() {
            anyhow::bail!("HTTP client timeout must be greater than zero");
        }
        if self.database.dsn.trim().is_empty() {
            anyhow::bail!("Database DSN cannot be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();

        assert_eq!(config.registry.host, "127.0.0.1");
        assert_eq!(config.registry.port, 6379);
        assert_eq!(config.registry.membership_set, "redis-discovery-backends");
        assert_eq!(config.registry.ttl, Duration::from_secs(15));
        assert_eq!(config.registry.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.http.port, 4000);
        assert!(config.instance.id.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                [registry]
                host = "redis.internal"
                ttl = "30s"
                heartbeat_interval = "10s"

                [http]
                port = 9000
                "#,
            )?;
            jail.set_env("ROLLCALL__REGISTRY__PORT", "6380");
            jail.set_env("ROLLCALL__INSTANCE__ID", "instance-7");

            let config = Configuration::load().map_err(|e| e.to_string())?;
            assert_eq!(config.registry.host, "redis.internal");
            assert_eq!(config.registry.port, 6380);
            assert_eq!(config.registry.ttl, Duration::from_secs(30));
            assert_eq!(config.registry.heartbeat_interval, Duration::from_secs(10));
            assert_eq!(config.http.port, 9000);
            assert_eq!(config.instance.id.as_deref(), Some("instance-7"));
            Ok(())
        });
    }

    #[test]
    fn test_platform_layer_below_env() {
        Jail::expect_with(|jail| {
            jail.set_env(
                "VCAP_SERVICES",
                r#"{"p-redis":[{"name":"redis-discovery","credentials":{"hostname":"10.0.0.9","port":41000,"password":"pw"}}]}"#,
            );
            jail.set_env("VCAP_APPLICATION", r#"{"instance_id":"cf-instance-1"}"#);
            jail.set_env("CF_INSTANCE_ADDR", "10.0.32.7:61001");
            jail.set_env("ROLLCALL__REGISTRY__PORT", "42000");

            let config = Configuration::load().map_err(|e| e.to_string())?;
            assert_eq!(config.registry.host, "10.0.0.9");
            assert_eq!(config.registry.port, 42000);
            assert_eq!(config.registry.password.as_deref(), Some("pw"));
            assert_eq!(config.instance.id.as_deref(), Some("cf-instance-1"));
            assert_eq!(config.instance.address.as_deref(), Some("10.0.32.7:61001"));
            Ok(())
        });
    }

    #[test]
    fn test_load_from_missing_path() {
        let result = Configuration::load_from_path(Path::new("/nonexistent/rollcall.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[registry]\nmembership_set = \"fleet-a\"\n").unwrap();

        let config = Configuration::load_from_path(&path).unwrap();
        assert_eq!(config.registry.membership_set, "fleet-a");
    }

    #[test]
    fn test_heartbeat_must_be_shorter_than_ttl() {
        let mut config = Configuration::default();
        config.registry.heartbeat_interval = Duration::from_secs(15);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("heartbeat interval"));

        config.registry.heartbeat_interval = Duration::from_secs(20);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_values() {
        let mut config = Configuration::default();
        config.registry.host = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = Configuration::default();
        config.registry.membership_set = String::new();
        assert!(config.validate().is_err());

        let mut config = Configuration::default();
        config.registry.ttl = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Configuration::default();
        config.database.dsn = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redis_url() {
        let mut registry = RegistryConfig::default();
        assert_eq!(registry.redis_url().unwrap(), "redis://127.0.0.1:6379/");

        registry.host = "redis.internal".to_string();
        registry.password = Some("p@ss:word".to_string());
        assert_eq!(
            registry.redis_url().unwrap(),
            "redis://:p%40ss%3Aword@redis.internal:6379/"
        );
    }
}
