pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod model;
pub mod platform;
pub mod registrant;
pub mod registry;
pub mod selector;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use discovery::Discoverer;
pub use error::{RegistryError, RegistryResult};
pub use registrant::{InstanceIdentity, Registrant, RegistrantHandle};
pub use registry::{MemoryStore, RedisStore, RegistryStore};
