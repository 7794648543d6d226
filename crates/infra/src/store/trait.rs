use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A flat, string-keyed row. Always contains `pk` and `sk` once stored.
pub type Item = BTreeMap<String, Value>;

/// Backend limit on the number of items in one atomic transaction.
pub const MAX_TRANSACTION_ITEMS: usize = 100;

pub const PK: &str = "pk";
pub const SK: &str = "sk";

/// Partition + sort key of a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub pk: String,
    pub sk: String,
}

impl PrimaryKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }

    /// Key of a root-style row, where partition and sort key are the same.
    pub fn same(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            pk: key.clone(),
            sk: key,
        }
    }

    pub fn from_item(item: &Item) -> Result<Self, StoreError> {
        let attribute = |name: &str| {
            item.get(name)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| StoreError::MissingKeyAttribute(name.to_owned()))
        };
        Ok(Self {
            pk: attribute(PK)?,
            sk: attribute(SK)?,
        })
    }
}

impl core::fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "(pk={}, sk={})", self.pk, self.sk)
    }
}

/// Precondition on the current existence of the target row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    MustExist,
    MustNotExist,
}

/// One conditional write inside a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransactItem {
    /// Replace the whole row.
    Put {
        key: PrimaryKey,
        item: Item,
        condition: Option<Condition>,
    },
    /// Set the given attributes on the row, leaving others untouched.
    Update {
        key: PrimaryKey,
        fields: Item,
        condition: Option<Condition>,
    },
    Delete {
        key: PrimaryKey,
        condition: Option<Condition>,
    },
}

impl TransactItem {
    pub fn key(&self) -> &PrimaryKey {
        match self {
            TransactItem::Put { key, .. }
            | TransactItem::Update { key, .. }
            | TransactItem::Delete { key, .. } => key,
        }
    }

    pub fn condition(&self) -> Option<Condition> {
        match self {
            TransactItem::Put { condition, .. }
            | TransactItem::Update { condition, .. }
            | TransactItem::Delete { condition, .. } => *condition,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransactItem::Put { .. } => "Put",
            TransactItem::Update { .. } => "Update",
            TransactItem::Delete { .. } => "Delete",
        }
    }
}

/// Why one item of a cancelled transaction was rejected (positionally aligned with the request).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancellationReason {
    /// This item was fine; another item caused the cancellation.
    None,
    ConditionalCheckFailed,
    Other(String),
}

impl CancellationReason {
    pub fn condition_check_failed(&self) -> bool {
        matches!(self, CancellationReason::ConditionalCheckFailed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKeyCondition {
    Any,
    Equals(String),
    BeginsWith(String),
}

impl SortKeyCondition {
    pub fn matches(&self, sk: &str) -> bool {
        match self {
            SortKeyCondition::Any => true,
            SortKeyCondition::Equals(value) => sk == value,
            SortKeyCondition::BeginsWith(prefix) => sk.starts_with(prefix.as_str()),
        }
    }
}

/// Rows of one partition, in sort-key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub pk: String,
    pub sk: SortKeyCondition,
    pub exclusive_start_key: Option<PrimaryKey>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(pk: impl Into<String>, sk: SortKeyCondition) -> Self {
        Self {
            pk: pk.into(),
            sk,
            exclusive_start_key: None,
            limit: None,
        }
    }
}

/// Every row in the table, optionally filtered by key prefixes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    pub pk_prefix: Option<String>,
    pub sk_prefix: Option<String>,
    pub exclusive_start_key: Option<PrimaryKey>,
    pub limit: Option<usize>,
}

impl Scan {
    pub fn matches(&self, key: &PrimaryKey) -> bool {
        self.pk_prefix
            .as_deref()
            .is_none_or(|prefix| key.pk.starts_with(prefix))
            && self
                .sk_prefix
                .as_deref()
                .is_none_or(|prefix| key.sk.starts_with(prefix))
    }
}

/// One page of results. `last_evaluated_key` is set when more rows may follow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<PrimaryKey>,
}

/// Store operation error.
///
/// These are **infrastructure errors**; repositories translate them into
/// typed conflicts where a precondition is involved.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// A single conditional write failed its precondition.
    #[error("conditional check failed for {0}")]
    ConditionalCheckFailed(PrimaryKey),

    /// An atomic transaction was rejected; no item was applied.
    #[error("transaction cancelled: {reasons:?}")]
    TransactionCanceled { reasons: Vec<CancellationReason> },

    #[error("transaction has {count} items, the maximum is {max}")]
    TooManyItems { count: usize, max: usize },

    #[error("transaction touches {0} more than once")]
    DuplicateKeyInTransaction(PrimaryKey),

    #[error("item is missing key attribute '{0}'")]
    MissingKeyAttribute(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Single-table key-value store.
///
/// Implementations must be thread-safe; there is no async in this boundary.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &PrimaryKey) -> Result<Option<Item>, StoreError>;

    /// Apply all items atomically, or none of them.
    ///
    /// On a failed precondition the error is [`StoreError::TransactionCanceled`]
    /// with one reason per requested item, in request order.
    fn transact_write(&self, items: &[TransactItem]) -> Result<(), StoreError>;

    /// Single conditional write.
    fn write(&self, item: &TransactItem) -> Result<(), StoreError> {
        match self.transact_write(std::slice::from_ref(item)) {
            Err(StoreError::TransactionCanceled { reasons })
                if reasons.first().is_some_and(CancellationReason::condition_check_failed) =>
            {
                Err(StoreError::ConditionalCheckFailed(item.key().clone()))
            }
            other => other,
        }
    }

    fn query(&self, query: &Query) -> Result<Page, StoreError>;

    fn scan(&self, scan: &Scan) -> Result<Page, StoreError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn get_item(&self, key: &PrimaryKey) -> Result<Option<Item>, StoreError> {
        (**self).get_item(key)
    }

    fn transact_write(&self, items: &[TransactItem]) -> Result<(), StoreError> {
        (**self).transact_write(items)
    }

    fn write(&self, item: &TransactItem) -> Result<(), StoreError> {
        (**self).write(item)
    }

    fn query(&self, query: &Query) -> Result<Page, StoreError> {
        (**self).query(query)
    }

    fn scan(&self, scan: &Scan) -> Result<Page, StoreError> {
        (**self).scan(scan)
    }
}
