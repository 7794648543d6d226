use std::sync::Arc;

use cpm_infra::repository::EtlRepository;
use cpm_infra::{Config, KeyValueStore, ObjectStore};

/// Everything a worker or trigger needs, built once per process.
#[derive(Clone)]
pub struct EtlContext {
    pub objects: Arc<dyn ObjectStore>,
    pub store: Arc<dyn KeyValueStore>,
    pub repository: EtlRepository,
    pub bucket: String,
    pub max_records: Option<usize>,
}

impl EtlContext {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        store: Arc<dyn KeyValueStore>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            objects,
            repository: EtlRepository::new(store.clone()),
            store,
            bucket: bucket.into(),
            max_records: None,
        }
    }

    pub fn from_config(
        config: &Config,
        objects: Arc<dyn ObjectStore>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self::new(objects, store, config.etl_bucket.clone()).with_max_records(config.etl_max_records)
    }

    pub fn with_max_records(mut self, max_records: Option<usize>) -> Self {
        self.max_records = max_records;
        self
    }
}

impl core::fmt::Debug for EtlContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EtlContext")
            .field("bucket", &self.bucket)
            .field("max_records", &self.max_records)
            .finish_non_exhaustive()
    }
}
