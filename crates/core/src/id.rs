//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a product team (the organisation-level owner of products).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductTeamId(Uuid);

/// Identifier of a device (product or endpoint registration).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(ProductTeamId, "ProductTeamId");
impl_uuid_newtype!(DeviceId, "DeviceId");

const PRODUCT_TEAM_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_93a4_2b8e_4d0a_9c55_7e21_04b3_d8f6);

impl ProductTeamId {
    /// Deterministic id for the team that owns everything registered under an ODS code.
    ///
    /// Used by ingestion, where the same organisation must always map to the same team.
    pub fn from_ods_code(ods_code: &str) -> Self {
        Self(Uuid::new_v5(&PRODUCT_TEAM_NAMESPACE, ods_code.as_bytes()))
    }
}

const PRODUCT_ID_ALPHABET: &[u8] = b"ACDEFGHJKLMNPRTUVWXY34679";
const PRODUCT_ID_PREFIX: &str = "P.";
const PRODUCT_ID_BLOCK: usize = 3;

/// Identifier of a CPM product, formatted as `P.XXX-XXX`.
///
/// Characters come from an alphabet without look-alike glyphs (no `0/O`, `1/I`, `B/8`...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(String);

impl ProductId {
    /// Generate a fresh random product id.
    pub fn new() -> Self {
        Self::from_seed(Uuid::new_v4().as_bytes())
    }

    /// Derive a product id from arbitrary seed bytes (only the first six are used).
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut chars = seed
            .iter()
            .cycle()
            .take(PRODUCT_ID_BLOCK * 2)
            .map(|b| PRODUCT_ID_ALPHABET[*b as usize % PRODUCT_ID_ALPHABET.len()] as char);
        let head: String = chars.by_ref().take(PRODUCT_ID_BLOCK).collect();
        let tail: String = chars.collect();
        Self(format!("{PRODUCT_ID_PREFIX}{head}-{tail}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProductId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::invalid_id(format!("ProductId: '{s}' is not of the form P.XXX-XXX"));
        let body = s.strip_prefix(PRODUCT_ID_PREFIX).ok_or_else(invalid)?;
        let (head, tail) = body.split_once('-').ok_or_else(invalid)?;
        let valid_block = |block: &str| {
            block.len() == PRODUCT_ID_BLOCK && block.bytes().all(|b| PRODUCT_ID_ALPHABET.contains(&b))
        };
        if !valid_block(head) || !valid_block(tail) {
            return Err(invalid());
        }
        Ok(Self(s.to_owned()))
    }
}

impl TryFrom<String> for ProductId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProductId> for String {
    fn from(value: ProductId) -> Self {
        value.0
    }
}
