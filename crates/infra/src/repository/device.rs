use std::sync::Arc;

use serde_json::Value;

use cpm_core::{DeviceId, KeyType};
use cpm_devices::{Device, DeviceEvent, DeviceKey, DeviceRecord, DeviceTag};

use crate::keys::TableKey;
use crate::repository::{
    BatchedWriter, RepositoryError, WriteResult, from_item, read_unique, row_data,
    write_aggregate,
};
use crate::store::{Item, KeyValueStore, PrimaryKey, Query, SortKeyCondition, TransactItem};
use crate::transaction::{create_transaction, delete_transaction, update_transactions};

/// Attribute of a tag row naming the device it points at.
pub const DEVICE_ID: &str = "device_id";

fn root_key(id: &DeviceId) -> PrimaryKey {
    PrimaryKey::same(TableKey::Device.key([id.to_string()]))
}

fn key_copy(key: &DeviceKey) -> PrimaryKey {
    PrimaryKey::same(TableKey::DeviceKey.key([key.key_type().as_str(), key.key_value()]))
}

fn tag_key(tag: &DeviceTag, id: &DeviceId) -> PrimaryKey {
    PrimaryKey::new(
        TableKey::DeviceTag.key([tag.value()]),
        TableKey::Device.key([id.to_string()]),
    )
}

fn tag_pointer(id: &DeviceId) -> Item {
    Item::from([(DEVICE_ID.to_owned(), Value::String(id.to_string()))])
}

/// Root row update plus the same data on every key copy except `skip`.
fn sync_copies(
    device: &DeviceRecord,
    skip: Option<&DeviceKey>,
) -> Result<Vec<TransactItem>, RepositoryError> {
    let mut items = update_transactions([root_key(&device.id)], &row_data(device, true)?);
    items.extend(update_transactions(
        device
            .keys
            .iter()
            .filter(|key| Some(*key) != skip)
            .map(key_copy),
        &row_data(device, false)?,
    ));
    Ok(items)
}

/// Devices: a root row, a full copy per key and a pointer row per tag.
#[derive(Clone)]
pub struct DeviceRepository {
    store: Arc<dyn KeyValueStore>,
    writer: BatchedWriter,
}

impl DeviceRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            writer: BatchedWriter::new(store.clone()),
            store,
        }
    }

    pub fn with_writer(store: Arc<dyn KeyValueStore>, writer: BatchedWriter) -> Self {
        Self { store, writer }
    }

    pub fn transactions(event: &DeviceEvent) -> Result<Vec<TransactItem>, RepositoryError> {
        match event {
            DeviceEvent::Created(device) => {
                let mut items = vec![create_transaction(root_key(&device.id), row_data(device, true)?)];
                let copy = row_data(device, false)?;
                items.extend(
                    device
                        .keys
                        .iter()
                        .map(|key| create_transaction(key_copy(key), copy.clone())),
                );
                items.extend(
                    device
                        .tags
                        .iter()
                        .map(|tag| create_transaction(tag_key(tag, &device.id), tag_pointer(&device.id))),
                );
                Ok(items)
            }
            DeviceEvent::Updated(device) => sync_copies(device, None),
            DeviceEvent::QuestionnaireResponseAdded(event) => sync_copies(&event.device, None),
            DeviceEvent::Deleted(device) => {
                let mut items = update_transactions([root_key(&device.id)], &row_data(device, true)?);
                items.extend(device.keys.iter().map(|key| delete_transaction(key_copy(key))));
                items.extend(
                    device
                        .tags
                        .iter()
                        .map(|tag| delete_transaction(tag_key(tag, &device.id))),
                );
                Ok(items)
            }
            DeviceEvent::KeyAdded(event) => {
                let mut items = vec![create_transaction(
                    key_copy(&event.new_key),
                    row_data(&event.device, false)?,
                )];
                items.extend(sync_copies(&event.device, Some(&event.new_key))?);
                Ok(items)
            }
            DeviceEvent::KeyDeleted(event) => {
                let mut items = vec![delete_transaction(key_copy(&event.deleted_key))];
                items.extend(sync_copies(&event.device, None)?);
                Ok(items)
            }
            DeviceEvent::TagAdded(event) => {
                let id = &event.device.id;
                let mut items = vec![create_transaction(tag_key(&event.new_tag, id), tag_pointer(id))];
                items.extend(sync_copies(&event.device, None)?);
                Ok(items)
            }
        }
    }

    pub fn write(&self, device: &mut Device) -> Result<Vec<WriteResult>, RepositoryError> {
        write_aggregate(&self.writer, device, Self::transactions)
    }

    pub fn read(&self, id: &DeviceId) -> Result<Device, RepositoryError> {
        let key = root_key(id);
        let item = read_unique(&self.store, &key.pk, SortKeyCondition::Equals(key.sk))?;
        Ok(Device::from_record(from_item(item)?))
    }

    pub fn read_by_key(&self, key: &DeviceKey) -> Result<Device, RepositoryError> {
        let key = key_copy(key);
        let item = read_unique(&self.store, &key.pk, SortKeyCondition::Any)?;
        Ok(Device::from_record(from_item(item)?))
    }

    /// Devices carrying exactly this tag. Follows every pointer row, then reads each root.
    pub fn search_by_tag(&self, tag: &DeviceTag) -> Result<Vec<Device>, RepositoryError> {
        let query = Query::new(TableKey::DeviceTag.key([tag.value()]), SortKeyCondition::Any);
        let mut devices = Vec::new();
        let mut start = None;
        loop {
            let page = self.store.query(&Query {
                exclusive_start_key: start,
                ..query.clone()
            })?;
            for item in page.items {
                let id = item
                    .get(DEVICE_ID)
                    .and_then(Value::as_str)
                    .ok_or_else(|| RepositoryError::Serialization("tag row without device_id".into()))?
                    .parse::<DeviceId>()
                    .map_err(|err| RepositoryError::Serialization(err.to_string()))?;
                devices.push(self.read(&id)?);
            }
            match page.last_evaluated_key {
                Some(key) => start = Some(key),
                None => break,
            }
        }
        Ok(devices)
    }
}
