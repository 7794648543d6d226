//! Secondary keys: alternate, table-wide unique identifiers for an entity.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::validation::validate_key_value;

/// A closed set of key types, each with its own value pattern.
pub trait KeyType:
    Copy + Eq + Ord + core::hash::Hash + core::fmt::Debug + Serialize + DeserializeOwned
{
    /// Stable snake_case name used in storage keys.
    fn as_str(self) -> &'static str;

    /// Check the value against this key type's pattern.
    fn validate(self, value: &str) -> DomainResult<()>;
}

/// A typed secondary key. Values are validated on construction and on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawKey<K>", bound(deserialize = "K: KeyType"))]
pub struct EntityKey<K: KeyType> {
    key_type: K,
    key_value: String,
}

#[derive(Deserialize)]
struct RawKey<K> {
    key_type: K,
    key_value: String,
}

impl<K: KeyType> TryFrom<RawKey<K>> for EntityKey<K> {
    type Error = DomainError;

    fn try_from(raw: RawKey<K>) -> Result<Self, Self::Error> {
        Self::new(raw.key_type, raw.key_value)
    }
}

impl<K: KeyType> EntityKey<K> {
    pub fn new(key_type: K, key_value: impl Into<String>) -> DomainResult<Self> {
        let key_value = key_value.into();
        validate_key_value(key_type.as_str(), &key_value)?;
        key_type.validate(&key_value)?;
        Ok(Self {
            key_type,
            key_value,
        })
    }

    pub fn key_type(&self) -> K {
        self.key_type
    }

    pub fn key_value(&self) -> &str {
        &self.key_value
    }
}

impl<K: KeyType> core::fmt::Display for EntityKey<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "'{}':'{}'", self.key_type.as_str(), self.key_value)
    }
}

/// Helper for key types whose pattern is `<segment>:<segment>[:...]` with a minimum segment count.
pub fn validate_colon_segments(key_type: &str, value: &str, min_segments: usize) -> DomainResult<()> {
    let segments: Vec<&str> = value.split(':').collect();
    if segments.len() < min_segments || segments.iter().any(|s| s.is_empty()) {
        return Err(DomainError::invalid_key(format!(
            "{key_type} '{value}' must have at least {min_segments} non-empty ':'-separated parts"
        )));
    }
    Ok(())
}
