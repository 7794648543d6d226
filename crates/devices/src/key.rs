use serde::{Deserialize, Serialize};

use cpm_core::key::validate_colon_segments;
use cpm_core::{DomainResult, EntityKey, KeyType, ProductId};

/// Secondary key types a device can be indexed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKeyType {
    /// The CPM product this device registers (`P.XXX-XXX`).
    ProductId,
    /// `<ods code>:<unique identifier>` of an accredited system.
    AccreditedSystemId,
    /// `<ods code>:<party key>:<interaction id>` of a message handling system.
    MessageHandlingSystemId,
}

impl KeyType for DeviceKeyType {
    fn as_str(self) -> &'static str {
        match self {
            DeviceKeyType::ProductId => "product_id",
            DeviceKeyType::AccreditedSystemId => "accredited_system_id",
            DeviceKeyType::MessageHandlingSystemId => "message_handling_system_id",
        }
    }

    fn validate(self, value: &str) -> DomainResult<()> {
        match self {
            DeviceKeyType::ProductId => value.parse::<ProductId>().map(|_| ()),
            DeviceKeyType::AccreditedSystemId => validate_colon_segments(self.as_str(), value, 2),
            DeviceKeyType::MessageHandlingSystemId => {
                validate_colon_segments(self.as_str(), value, 3)
            }
        }
    }
}

pub type DeviceKey = EntityKey<DeviceKeyType>;
