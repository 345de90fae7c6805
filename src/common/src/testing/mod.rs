//! Test utilities for rollcall.
//!
//! Builders for test configurations and helpers that wire the registry
//! protocol against an in-memory store.
//!
//! # Feature Flag
//!
//! This module is only available when the `testing` feature is enabled or during tests:
//!
//! ```toml
//! [dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use common::testing::TestConfigBuilder;
//!
//! let config = TestConfigBuilder::new()
//!     .in_memory()
//!     .with_ttl(Duration::from_secs(15), Duration::from_secs(5))
//!     .build();
//! ```

mod config_builder;

pub use config_builder::TestConfigBuilder;

use std::sync::Arc;

use crate::config::RegistryConfig;
use crate::registrant::{InstanceIdentity, Registrant};
use crate::registry::{MemoryStore, RegistryStore};

/// Registrant for `id`/`address` writing into `store`.
pub fn memory_registrant(
    store: &MemoryStore,
    config: &RegistryConfig,
    id: &str,
    address: &str,
) -> Registrant {
    let store: Arc<dyn RegistryStore> = Arc::new(store.clone());
    Registrant::new(store, InstanceIdentity::new(id, address), config)
}
