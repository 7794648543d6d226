use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::object_store::{ObjectStore, ObjectStoreError, validate_key};

/// Objects as files under a root directory; key segments become path segments.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }
}

fn io_error(key: &str, source: std::io::Error) -> ObjectStoreError {
    ObjectStoreError::Io {
        key: key.to_owned(),
        source,
    }
}

impl ObjectStore for FsObjectStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ObjectStoreError> {
        match std::fs::read(self.path(key)?) {
            Ok(body) => Ok(Some(body)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(key, err)),
        }
    }

    fn put(&self, key: &str, body: Vec<u8>) -> Result<(), ObjectStoreError> {
        let path = self.path(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| io_error(key, err))?;
        }
        // Write then rename so readers never see a half-written artifact.
        let staging = path.with_extension("partial");
        std::fs::write(&staging, body).map_err(|err| io_error(key, err))?;
        std::fs::rename(&staging, &path).map_err(|err| io_error(key, err))
    }

    fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        match std::fs::remove_file(self.path(key)?) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(key, err)),
        }
    }
}
