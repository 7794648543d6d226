//! Rejects transformed batches in which two devices claim the same key.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use thiserror::Error;

use cpm_core::DeviceId;
use cpm_devices::DeviceKeyAddedEvent;
use cpm_events::ExportedEvent;

const DEVICE_KEY_ADDED_EVENT: &str = "device_key_added_event";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DuplicateSdsKey(pub String);

#[derive(Debug, Error)]
pub enum KeyCheckError {
    #[error(transparent)]
    Duplicate(#[from] DuplicateSdsKey),

    #[error("{name} at position {index} could not be read: {source}")]
    Unreadable {
        name: String,
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Fails if any device key is added to more than one device.
///
/// The error lists, per conflicting key, every key-added event of every
/// device involved. A key-added event that cannot be read fails the check.
pub fn reject_duplicate_keys(events: &[ExportedEvent]) -> Result<(), KeyCheckError> {
    let mut ids_by_key: BTreeMap<String, Vec<DeviceId>> = BTreeMap::new();
    let mut events_by_id: HashMap<DeviceId, Vec<Value>> = HashMap::new();

    for (index, exported) in events.iter().enumerate() {
        if exported.name() != DEVICE_KEY_ADDED_EVENT {
            continue;
        }
        let event: DeviceKeyAddedEvent = serde_json::from_value(exported.payload().clone())
            .map_err(|source| KeyCheckError::Unreadable {
                name: exported.name().to_owned(),
                index,
                source,
            })?;
        let id = event.device.id;
        let ids = ids_by_key
            .entry(event.new_key.key_value().to_owned())
            .or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
        events_by_id
            .entry(id)
            .or_default()
            .push(exported.payload().clone());
    }

    let groups: Vec<String> = ids_by_key
        .iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(key, ids)| {
            let duplicates: Vec<&Value> = ids
                .iter()
                .filter_map(|id| events_by_id.get(id))
                .flatten()
                .collect();
            let rendered = serde_json::to_string(&duplicates).unwrap_or_default();
            format!("Duplicates found for device key '{key}'\n{rendered}\n===============")
        })
        .collect();

    if groups.is_empty() {
        Ok(())
    } else {
        Err(DuplicateSdsKey(groups.join("\n")).into())
    }
}
