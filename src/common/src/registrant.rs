use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::config::{InstanceConfig, RegistryConfig};
use crate::error::RegistryResult;
use crate::registry::RegistryStore;

/// Identifier and reachable address this process registers under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceIdentity {
    pub id: String,
    pub address: String,
}

impl InstanceIdentity {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
        }
    }

    /// Fill in whatever the configuration leaves open: a random id, and an
    /// address built from the advertised host and the HTTP port.
    pub fn resolve(config: &InstanceConfig, http_port: u16) -> Self {
        let id = config
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let address = config
            .address
            .clone()
            .filter(|address| !address.trim().is_empty())
            .unwrap_or_else(|| format!("{}:{http_port}", config.advertise_host));
        Self { id, address }
    }
}

/// Keeps one instance's liveness record and set membership fresh.
#[derive(Debug, Clone)]
pub struct Registrant {
    store: Arc<dyn RegistryStore>,
    identity: InstanceIdentity,
    membership_set: String,
    ttl: Duration,
}

impl Registrant {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        identity: InstanceIdentity,
        config: &RegistryConfig,
    ) -> Self {
        Self {
            store,
            identity,
            membership_set: config.membership_set.clone(),
            ttl: config.ttl,
        }
    }

    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    /// Refresh the liveness record, then (re)join the membership set.
    ///
    /// The record is written first so an id never appears in the set without a
    /// record having existed for it.
    pub async fn heartbeat(&self) -> RegistryResult<()> {
        self.store
            .set_with_expiry(&self.identity.id, &self.identity.address, self.ttl)
            .await?;
        self.store
            .set_add(&self.membership_set, &self.identity.id)
            .await?;
        log::debug!(
            "Heartbeat for {} at {} (ttl {:?})",
            self.identity.id,
            self.identity.address,
            self.ttl
        );
        Ok(())
    }

    /// Spawn the periodic heartbeat. The first beat happens immediately.
    /// Failed beats are logged and retried on the next tick.
    ///
    /// A zero interval starts nothing; the returned handle reports not running.
    pub fn spawn(&self, interval: Duration) -> RegistrantHandle {
        if interval.is_zero() {
            log::error!(
                "Not registering instance {}: heartbeat interval is zero",
                self.identity.id
            );
            return RegistrantHandle {
                identity: self.identity.clone(),
                handle: None,
            };
        }

        let registrant = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut failing = false;
            loop {
                ticker.tick().await;
                match registrant.heartbeat().await {
                    Ok(()) => {
                        if failing {
                            log::info!(
                                "Registration of {} recovered",
                                registrant.identity.id
                            );
                            failing = false;
                        }
                    }
                    Err(e) => {
                        log::error!("Registration heartbeat failed: {e}");
                        failing = true;
                    }
                }
            }
        });

        log::info!(
            "Registering instance {} at {} every {:?}",
            self.identity.id,
            self.identity.address,
            interval
        );

        RegistrantHandle {
            identity: self.identity.clone(),
            handle: Some(handle),
        }
    }
}

/// Owns the background heartbeat task; stops it on shutdown or drop.
#[derive(Debug)]
pub struct RegistrantHandle {
    identity: InstanceIdentity,
    handle: Option<JoinHandle<()>>,
}

impl RegistrantHandle {
    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop heartbeating. The record is left to expire on its own.
    pub async fn shutdown(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
        log::info!("Stopped heartbeat for instance {}", self.identity.id);
    }
}

impl Drop for RegistrantHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
