//! Infrastructure layer: the single-table store, repositories, step chains and
//! the other adapters the API and ETL crates are built from.

pub mod config;
pub mod keys;
pub mod object_store;
pub mod repository;
pub mod response;
pub mod step_chain;
pub mod store;
pub mod transaction;


pub use config::{Config, ConfigError};
pub use object_store::{FsObjectStore, InMemoryObjectStore, ObjectStore, ObjectStoreError};
pub use repository::RepositoryError;
pub use step_chain::{LogStep, Step, StepChain, StepChainError, StepChainRun, StepData, StepDecorator};
pub use store::{InMemoryStore, KeyValueStore};
