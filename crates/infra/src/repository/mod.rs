//! Repositories: translate aggregate events into conditional transactions and
//! rows back into aggregates.
//!
//! A repository is a stateless facade over one table; all state lives in the
//! backing [`KeyValueStore`]. Each aggregate has its own repository whose
//! event-to-transaction mapping is an exhaustive `match` over the aggregate's
//! closed event enum, so an unmapped event cannot compile.
//!
//! ## Row layout
//!
//! ```text
//! PRODUCT_TEAM#<id>                 / PRODUCT_TEAM#<id>                  team root
//! PRODUCT_TEAM_KEY#<type>#<value>   / same                               team alias copy
//! PRODUCT_TEAM#<team id>            / PRODUCT#<product id>               product root
//! PRODUCT_KEY#<type>#<value>        / same                               product key copy
//! DEVICE#<id>                       / DEVICE#<id>                        device root
//! DEVICE_KEY#<type>#<value>         / same                               device key copy
//! DEVICE_TAG#<tag>                  / DEVICE#<id>                        tag pointer
//! ```

pub mod batch;
pub mod device;
pub mod etl;
pub mod product;
pub mod product_team;
pub mod search;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use cpm_core::AggregateRoot;

use crate::keys::remove_keys;
use crate::store::{Item, KeyValueStore, PrimaryKey, Query, SortKeyCondition, StoreError, TransactItem};

pub use batch::{BATCH_SIZE, BatchFailure, BatchedWriter, WriteResult, split_transactions_by_key};
pub use device::DeviceRepository;
pub use etl::{CpmEvent, EtlRepository, cpm_event_deserializer};
pub use product::CpmProductRepository;
pub use product_team::ProductTeamRepository;
pub use search::Search;

/// Marks the row holding the authoritative copy of an entity.
pub const ROOT: &str = "root";

/// Repository operation error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RepositoryError {
    /// A create targeted a key that is already taken.
    #[error("item already exists: {key}")]
    AlreadyExists { key: PrimaryKey },

    /// The read or write target does not exist.
    #[error("item not found: {key}")]
    NotFound { key: String },

    /// More than one row matched a lookup that must be unique.
    #[error("data corruption: expected one item for {key}, found {count}")]
    Corrupted { key: String, count: usize },

    /// A transaction failed for a reason other than a precondition.
    #[error("unhandled transaction failure: {message}")]
    Unhandled {
        message: String,
        attempted: Vec<TransactItem>,
    },

    #[error("serialization failed: {0}")]
    Serialization(String),

    /// One batch of a multi-batch write failed. Earlier batches stay committed.
    #[error("{0}")]
    Batch(Box<BatchFailure>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RepositoryError {
    /// The error that actually caused the failure, looking through batch wrappers.
    pub fn root_cause(&self) -> &RepositoryError {
        match self {
            RepositoryError::Batch(failure) => failure.cause.root_cause(),
            other => other,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.root_cause(), RepositoryError::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), RepositoryError::NotFound { .. })
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(value: serde_json::Error) -> Self {
        RepositoryError::Serialization(value.to_string())
    }
}

/// Serialize an entity record into row data (no key attributes).
pub fn to_item<T: Serialize>(record: &T) -> Result<Item, RepositoryError> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(RepositoryError::Serialization(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Row data for a stored copy of an entity.
pub fn row_data<T: Serialize>(record: &T, root: bool) -> Result<Item, RepositoryError> {
    let mut item = to_item(record)?;
    item.insert(ROOT.to_owned(), Value::Bool(root));
    Ok(item)
}

/// Deserialize a row into an entity record, ignoring storage-only attributes.
pub fn from_item<T: DeserializeOwned>(item: Item) -> Result<T, RepositoryError> {
    let mut data = remove_keys(item);
    data.remove(ROOT);
    Ok(serde_json::from_value(Value::Object(data.into_iter().collect()))?)
}

/// Read the single row matching a query.
///
/// Zero rows is [`RepositoryError::NotFound`]; more than one is
/// [`RepositoryError::Corrupted`] rather than an arbitrary pick.
pub fn read_unique(
    store: &Arc<dyn KeyValueStore>,
    pk: &str,
    sk: SortKeyCondition,
) -> Result<Item, RepositoryError> {
    let mut query = Query::new(pk, sk);
    query.limit = Some(2);
    let page = store.query(&query)?;
    let described = || match &query.sk {
        SortKeyCondition::Equals(sk) => PrimaryKey::new(pk, sk.clone()).to_string(),
        _ => pk.to_owned(),
    };
    let count = page.items.len() + usize::from(page.last_evaluated_key.is_some());
    let mut items = page.items.into_iter();
    match (items.next(), count) {
        (None, _) => Err(RepositoryError::NotFound { key: described() }),
        (Some(item), 1) => Ok(item),
        (Some(_), count) => Err(RepositoryError::Corrupted {
            key: described(),
            count,
        }),
    }
}

/// Write every pending event of an aggregate, in order, then drain its log.
///
/// The log is kept when any batch fails so the caller can decide how to recover.
pub(crate) fn write_aggregate<A, F>(
    writer: &BatchedWriter,
    aggregate: &mut A,
    transactions: F,
) -> Result<Vec<WriteResult>, RepositoryError>
where
    A: AggregateRoot,
    F: Fn(&A::Event) -> Result<Vec<TransactItem>, RepositoryError>,
{
    let mut items = Vec::new();
    for event in aggregate.events() {
        items.extend(transactions(event)?);
    }
    let results = writer.write(items)?;
    aggregate.clear_events();
    Ok(results)
}
