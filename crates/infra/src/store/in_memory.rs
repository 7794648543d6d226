use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::{Mutex, PoisonError, RwLock};

use serde_json::Value;

use super::r#trait::{
    CancellationReason, Condition, Item, KeyValueStore, MAX_TRANSACTION_ITEMS, PK, Page,
    PrimaryKey, Query, SK, Scan, StoreError, TransactItem,
};

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// In-memory single-table store.
///
/// Intended for tests/dev. Rows are kept ordered by `(pk, sk)`, pages are
/// capped at `page_size` rows, and transactions are all-or-nothing.
#[derive(Debug)]
pub struct InMemoryStore {
    rows: RwLock<BTreeMap<PrimaryKey, Item>>,
    page_size: usize,
    /// Number of transactions still allowed to succeed before one is failed.
    fail_after: Mutex<Option<usize>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
            fail_after: Mutex::new(None),
        }
    }

    /// Let `successes` more transactions through, then fail the next one with a backend error.
    pub fn fail_transaction_after(&self, successes: usize) {
        let mut plan = self.fail_after.lock().unwrap_or_else(PoisonError::into_inner);
        *plan = Some(successes);
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every row, for assertions.
    pub fn dump(&self) -> Vec<Item> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn injected_failure(&self) -> Result<(), StoreError> {
        let mut plan = self
            .fail_after
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        match plan.as_mut() {
            Some(0) => {
                *plan = None;
                Err(StoreError::Backend("injected transaction failure".to_string()))
            }
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn check(condition: Option<Condition>, exists: bool) -> CancellationReason {
        match (condition, exists) {
            (Some(Condition::MustExist), false) | (Some(Condition::MustNotExist), true) => {
                CancellationReason::ConditionalCheckFailed
            }
            _ => CancellationReason::None,
        }
    }

    fn keyed(key: &PrimaryKey, mut item: Item) -> Item {
        item.insert(PK.to_string(), Value::String(key.pk.clone()));
        item.insert(SK.to_string(), Value::String(key.sk.clone()));
        item
    }

    fn page<'a, I>(&self, rows: I, limit: Option<usize>) -> Page
    where
        I: Iterator<Item = (&'a PrimaryKey, &'a Item)>,
    {
        let limit = limit.unwrap_or(self.page_size).min(self.page_size);
        let mut rows = rows.peekable();
        let mut items = Vec::new();
        let mut last_key = None;
        while items.len() < limit {
            match rows.next() {
                Some((key, item)) => {
                    items.push(item.clone());
                    last_key = Some(key.clone());
                }
                None => break,
            }
        }
        let more = rows.peek().is_some();
        Page {
            items,
            last_evaluated_key: if more { last_key } else { None },
        }
    }

    fn start_bound(start: &Option<PrimaryKey>, floor: PrimaryKey) -> Bound<PrimaryKey> {
        match start {
            Some(key) if *key >= floor => Bound::Excluded(key.clone()),
            _ => Bound::Included(floor),
        }
    }
}

impl KeyValueStore for InMemoryStore {
    fn get_item(&self, key: &PrimaryKey) -> Result<Option<Item>, StoreError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(rows.get(key).cloned())
    }

    fn transact_write(&self, items: &[TransactItem]) -> Result<(), StoreError> {
        if items.is_empty() {
            return Ok(());
        }
        if items.len() > MAX_TRANSACTION_ITEMS {
            return Err(StoreError::TooManyItems {
                count: items.len(),
                max: MAX_TRANSACTION_ITEMS,
            });
        }
        let mut seen = BTreeSet::new();
        for item in items {
            if !seen.insert(item.key()) {
                return Err(StoreError::DuplicateKeyInTransaction(item.key().clone()));
            }
        }
        self.injected_failure()?;

        let mut rows = self
            .rows
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        let reasons: Vec<CancellationReason> = items
            .iter()
            .map(|item| Self::check(item.condition(), rows.contains_key(item.key())))
            .collect();
        if reasons.iter().any(CancellationReason::condition_check_failed) {
            return Err(StoreError::TransactionCanceled { reasons });
        }

        for item in items {
            match item {
                TransactItem::Put { key, item, .. } => {
                    rows.insert(key.clone(), Self::keyed(key, item.clone()));
                }
                TransactItem::Update { key, fields, .. } => {
                    let row = rows
                        .entry(key.clone())
                        .or_insert_with(|| Self::keyed(key, Item::new()));
                    for (name, value) in fields {
                        if name != PK && name != SK {
                            row.insert(name.clone(), value.clone());
                        }
                    }
                }
                TransactItem::Delete { key, .. } => {
                    rows.remove(key);
                }
            }
        }
        Ok(())
    }

    fn query(&self, query: &Query) -> Result<Page, StoreError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let floor = PrimaryKey::new(query.pk.clone(), String::new());
        let range = rows
            .range((Self::start_bound(&query.exclusive_start_key, floor), Bound::Unbounded))
            .take_while(|(key, _)| key.pk == query.pk)
            .filter(|(key, _)| query.sk.matches(&key.sk));
        Ok(self.page(range, query.limit))
    }

    fn scan(&self, scan: &Scan) -> Result<Page, StoreError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let floor = PrimaryKey::new(String::new(), String::new());
        let range = rows
            .range((Self::start_bound(&scan.exclusive_start_key, floor), Bound::Unbounded))
            .filter(|(key, _)| scan.matches(key));
        Ok(self.page(range, scan.limit))
    }
}
