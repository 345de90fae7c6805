//! Cloud Foundry environment discovery.
//!
//! Reads the `VCAP_*` and `CF_*` variables the platform injects and turns them into
//! a configuration layer: registry credentials from a bound service, the instance
//! identity and the port to listen on.

use anyhow::{Context, Result};
use figment::providers::Serialized;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;

/// Subset of `VCAP_APPLICATION` used for registration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Application {
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub instance_index: Option<u32>,
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

/// A bound service instance from `VCAP_SERVICES`.
#[derive(Debug, Clone, Deserialize)]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub credentials: Map<String, Value>,
}

/// Connection parameters extracted from a bound registry service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub host: String,
    pub port: Option<u16>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Platform {
    pub application: Application,
    pub services: HashMap<String, Vec<Service>>,
    pub instance_address: Option<String>,
    pub port: Option<u16>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_port(name: &str, value: Option<String>) -> Result<Option<u16>> {
    non_empty(value)
        .map(|v| {
            v.trim()
                .parse::<u16>()
                .with_context(|| format!("Invalid {name}: {v}"))
        })
        .transpose()
}

impl Platform {
    /// Read the platform variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let application = match non_empty(lookup("VCAP_APPLICATION")) {
            Some(raw) => {
                serde_json::from_str(&raw).context("Failed to parse VCAP_APPLICATION")?
            }
            None => Application::default(),
        };

        let services = match non_empty(lookup("VCAP_SERVICES")) {
            Some(raw) => serde_json::from_str(&raw).context("Failed to parse VCAP_SERVICES")?,
            None => HashMap::new(),
        };

        let port = match parse_port("PORT", lookup("PORT"))? {
            Some(port) => Some(port),
            None => parse_port("VCAP_APP_PORT", lookup("VCAP_APP_PORT"))?,
        };

        Ok(Self {
            application,
            services,
            instance_address: non_empty(lookup("CF_INSTANCE_ADDR")),
            port,
        })
    }

    /// Whether any platform variable was present.
    pub fn is_present(&self) -> bool {
        self.application.instance_id.is_some()
            || !self.services.is_empty()
            || self.instance_address.is_some()
            || self.port.is_some()
    }

    /// Find a bound service by its instance name.
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services
            .values()
            .flatten()
            .find(|service| service.name == name)
    }

    /// Resolve registry connection parameters from the named service's credentials.
    pub fn registry_service(&self, name: &str) -> Option<ServiceEndpoint> {
        let service = self.service(name)?;
        let credentials = &service.credentials;

        let host = credentials
            .get("hostname")
            .or_else(|| credentials.get("host"))
            .and_then(Value::as_str)?
            .to_string();

        let port = credentials.get("port").and_then(|value| match value {
            Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });

        let password = credentials.get("password").and_then(|value| match value {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        });

        Some(ServiceEndpoint {
            host,
            port,
            password,
        })
    }

    /// Configuration layer holding only the values the platform provided.
    pub fn provider(&self, registry_service: &str) -> Serialized<Value> {
        let mut root = Map::new();

        if let Some(endpoint) = self.registry_service(registry_service) {
            let mut registry = Map::new();
            registry.insert("host".into(), json!(endpoint.host));
            if let Some(port) = endpoint.port {
                registry.insert("port".into(), json!(port));
            }
            if let Some(password) = endpoint.password {
                registry.insert("password".into(), json!(password));
            }
            root.insert("registry".into(), Value::Object(registry));
        } else if !self.services.is_empty() {
            log::warn!("Registry service '{registry_service}' is not bound to this application");
        }

        let mut instance = Map::new();
        if let Some(id) = &self.application.instance_id {
            instance.insert("id".into(), json!(id));
        }
        if let Some(address) = &self.instance_address {
            instance.insert("address".into(), json!(address));
        }
        if !instance.is_empty() {
            root.insert("instance".into(), Value::Object(instance));
        }

        if let Some(port) = self.port.or(self.application.port) {
            root.insert("http".into(), json!({ "port": port }));
        }

        Serialized::defaults(Value::Object(root))
    }
}
