//! Discovery of live registrants.
//!
//! A discovery pass reads the membership set, keeps the ids whose liveness
//! record still exists and prunes the rest from the set. Membership is only
//! repaired lazily, by the passes that happen to look at a stale id.

use futures::future::try_join_all;
use std::sync::Arc;

use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::registry::RegistryStore;

#[derive(Debug, Clone)]
pub struct Discoverer {
    store: Arc<dyn RegistryStore>,
    membership_set: String,
}

impl Discoverer {
    pub fn new(store: Arc<dyn RegistryStore>, config: &RegistryConfig) -> Self {
        Self {
            store,
            membership_set: config.membership_set.clone(),
        }
    }

    pub fn store(&self) -> &Arc<dyn RegistryStore> {
        &self.store
    }

    /// Addresses of every member with a live record.
    ///
    /// A missing membership set means nobody has registered yet and yields an
    /// empty list. Any store failure aborts the whole pass.
    pub async fn discover(&self) -> RegistryResult<Vec<String>> {
        if !self.store.set_exists(&self.membership_set).await? {
            log::debug!("Membership set {} does not exist", self.membership_set);
            return Ok(Vec::new());
        }

        let members = self.store.set_members(&self.membership_set).await?;
        let probes = members.iter().map(|id| self.probe(id));
        let addresses: Vec<String> = try_join_all(probes).await?.into_iter().flatten().collect();

        log::debug!(
            "Discovered {} live of {} registered instance(s)",
            addresses.len(),
            members.len()
        );
        Ok(addresses)
    }

    /// Check one member, pruning it when its record is gone.
    async fn probe(&self, id: &str) -> RegistryResult<Option<String>> {
        if !self.store.exists(id).await? {
            self.prune(id).await?;
            return Ok(None);
        }

        let address = match self.store.get(id).await {
            Ok(Some(raw)) => decode_address(id, raw),
            // The record can expire between the two reads.
            Ok(None) => {
                self.prune(id).await?;
                return Ok(None);
            }
            Err(e) => Err(e),
        };

        match address {
            Ok(address) => Ok(Some(address)),
            Err(e @ RegistryError::MalformedRecord { .. }) => {
                log::warn!("Excluding instance from discovery: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn prune(&self, id: &str) -> RegistryResult<()> {
        self.store.set_remove(&self.membership_set, id).await?;
        log::info!(
            "Removed expired instance {id} from {}",
            self.membership_set
        );
        Ok(())
    }
}

fn decode_address(id: &str, raw: Vec<u8>) -> RegistryResult<String> {
    let address = String::from_utf8(raw)
        .map_err(|_| RegistryError::malformed(id, "address is not valid UTF-8"))?;
    if address.trim().is_empty() {
        return Err(RegistryError::malformed(id, "address is empty"));
    }
    Ok(address)
}
