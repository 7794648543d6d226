use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::object_store::{ObjectStore, ObjectStoreError, validate_key};

#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Result<Vec<String>, ObjectStoreError> {
        let objects = self.objects.read().map_err(|_| ObjectStoreError::Poisoned)?;
        Ok(objects.keys().cloned().collect())
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ObjectStoreError> {
        validate_key(key)?;
        let objects = self.objects.read().map_err(|_| ObjectStoreError::Poisoned)?;
        Ok(objects.get(key).cloned())
    }

    fn put(&self, key: &str, body: Vec<u8>) -> Result<(), ObjectStoreError> {
        validate_key(key)?;
        let mut objects = self.objects.write().map_err(|_| ObjectStoreError::Poisoned)?;
        objects.insert(key.to_owned(), body);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        validate_key(key)?;
        let mut objects = self.objects.write().map_err(|_| ObjectStoreError::Poisoned)?;
        objects.remove(key);
        Ok(())
    }
}
