use crate::contract::Operation;

/// Errors returned by driver operations.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Blob storage failed.
    #[error("store error: {0}")]
    Store(#[from] lingo_store::StoreError),

    /// The language index failed.
    #[error("index error: {0}")]
    Index(#[from] lingo_index::IndexError),

    /// A sync task could not be queued or applied.
    #[error("sync error: {0}")]
    Sync(#[from] lingo_sync::SyncError),

    /// The configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A background sync worker was required but no tokio runtime is active.
    #[error("the {0} queue needs a running tokio runtime for its sync worker")]
    NoRuntime(&'static str),

    /// In-memory driver state was poisoned by a panicking writer.
    #[error("driver lock poisoned: {0}")]
    Poisoned(String),
}

/// Errors raised while resolving a driver by name.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No driver name was given and none is configured as default.
    #[error("a default translation driver has not been specified")]
    NoDefaultDriver,

    /// Neither a built-in nor an extension has this name.
    #[error("driver {0:?} is not supported")]
    UnknownDriver(String),

    /// The driver does not implement every contract operation.
    #[error("driver {driver:?} does not implement: {}", join_operations(.missing))]
    IncompleteContract {
        driver: String,
        missing: Vec<Operation>,
    },

    /// The driver's factory failed.
    #[error("failed to create driver {driver:?}: {source}")]
    Create {
        driver: String,
        #[source]
        source: DriverError,
    },
}

fn join_operations(operations: &[Operation]) -> String {
    operations
        .iter()
        .map(|op| op.name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience alias for driver results.
pub type DriverResult<T> = Result<T, DriverError>;

/// Convenience alias for registry results.
pub type RegistryResult<T> = Result<T, RegistryError>;

pub(crate) fn poisoned<E: std::fmt::Display>(e: E) -> DriverError {
    DriverError::Poisoned(e.to_string())
}
