use rand::Rng;

use crate::error::{RegistryError, RegistryResult};

/// Pick one address uniformly at random.
pub fn select(addresses: &[String]) -> RegistryResult<String> {
    select_with(&mut rand::thread_rng(), addresses)
}

/// Same as [`select`] with a caller-provided random source.
pub fn select_with<R: Rng + ?Sized>(rng: &mut R, addresses: &[String]) -> RegistryResult<String> {
    if addresses.is_empty() {
        return Err(RegistryError::NoBackendsAvailable);
    }
    let index = rng.gen_range(0..addresses.len());
    Ok(addresses[index].clone())
}
