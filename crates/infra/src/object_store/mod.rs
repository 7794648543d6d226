//! Blob storage for ETL artifacts.
//!
//! Keys are `/`-separated paths such as `input--load/unprocessed`. A missing
//! object is not an error: `get` returns `None`, which callers treat as "nothing
//! there yet".

pub mod fs;
pub mod in_memory;

use thiserror::Error;

pub use fs::FsObjectStore;
pub use in_memory::InMemoryObjectStore;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("invalid object key '{0}'")]
    InvalidKey(String),

    #[error("io error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("object store lock poisoned")]
    Poisoned,
}

pub trait ObjectStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ObjectStoreError>;

    fn put(&self, key: &str, body: Vec<u8>) -> Result<(), ObjectStoreError>;

    /// Remove an object. Removing a missing object succeeds.
    fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;

    fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        Ok(self.get(key)?.is_some())
    }
}

impl<S: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ObjectStoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, body: Vec<u8>) -> Result<(), ObjectStoreError> {
        (**self).put(key, body)
    }

    fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        (**self).delete(key)
    }

    fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        (**self).exists(key)
    }
}

/// Keys must be relative paths without empty, `.` or `..` segments.
pub(crate) fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(ObjectStoreError::InvalidKey(key.to_owned()))
    }
}
