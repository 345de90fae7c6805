/// Errors raised by the registry protocol (registrant, discoverer, selector and store).
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("No backends available")]
    NoBackendsAvailable,

    #[error("Malformed record '{key}': {reason}")]
    MalformedRecord { key: String, reason: String },
}

impl RegistryError {
    pub fn unavailable(reason: impl std::fmt::Display) -> Self {
        RegistryError::StoreUnavailable(reason.to_string())
    }

    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        RegistryError::MalformedRecord {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<redis::RedisError> for RegistryError {
    fn from(err: redis::RedisError) -> Self {
        RegistryError::StoreUnavailable(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for RegistryError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        RegistryError::StoreUnavailable("operation timed out".to_string())
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;
