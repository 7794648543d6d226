//! Batched transactional writer.
//!
//! Transaction items are cut into batches, each committed as one atomic
//! transaction, sequentially and in original order. A batch is cut:
//! - when the next item touches a key already present in the current batch
//!   (the store rejects transactions that touch a key twice)
//! - when the batch reaches the size limit
//!
//! The first failing batch stops the write. Earlier batches are not rolled
//! back: the unit of atomicity is the batch, not the whole write.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::repository::RepositoryError;
use crate::store::{KeyValueStore, MAX_TRANSACTION_ITEMS, TransactItem};
use crate::transaction::handle_store_error;

pub const BATCH_SIZE: usize = MAX_TRANSACTION_ITEMS;

/// Outcome of one committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    pub batch_index: usize,
    pub item_count: usize,
}

/// Details of the batch that stopped a write.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub batch_index: usize,
    pub attempted: Vec<TransactItem>,
    pub committed: Vec<WriteResult>,
    pub cause: RepositoryError,
}

impl core::fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "batch {} ({} items) failed after {} committed batches: {}",
            self.batch_index,
            self.attempted.len(),
            self.committed.len(),
            self.cause
        )
    }
}

/// Split items into batches of at most `max` items with no key repeated inside a batch.
pub fn split_transactions_by_key<I>(items: I, max: usize) -> Vec<Vec<TransactItem>>
where
    I: IntoIterator<Item = TransactItem>,
{
    let max = max.clamp(1, MAX_TRANSACTION_ITEMS);
    let mut batches = Vec::new();
    let mut buffer: Vec<TransactItem> = Vec::new();
    let mut keys = BTreeSet::new();
    for item in items {
        if buffer.len() == max || keys.contains(item.key()) {
            batches.push(std::mem::take(&mut buffer));
            keys.clear();
        }
        keys.insert(item.key().clone());
        buffer.push(item);
    }
    if !buffer.is_empty() {
        batches.push(buffer);
    }
    batches
}

#[derive(Clone)]
pub struct BatchedWriter {
    store: Arc<dyn KeyValueStore>,
    batch_size: usize,
}

impl core::fmt::Debug for BatchedWriter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BatchedWriter")
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl BatchedWriter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_batch_size(store, BATCH_SIZE)
    }

    pub fn with_batch_size(store: Arc<dyn KeyValueStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.clamp(1, MAX_TRANSACTION_ITEMS),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Commit the items batch by batch, stopping at the first failure.
    pub fn write(&self, items: Vec<TransactItem>) -> Result<Vec<WriteResult>, RepositoryError> {
        let batches = split_transactions_by_key(items, self.batch_size);
        let total = batches.len();
        let mut committed = Vec::with_capacity(total);

        for (batch_index, batch) in batches.into_iter().enumerate() {
            tracing::debug!(batch_index, total, items = batch.len(), "committing batch");
            if let Err(err) = self.store.transact_write(&batch) {
                let cause = handle_store_error(err, &batch);
                tracing::warn!(
                    batch_index,
                    committed = committed.len(),
                    error = %cause,
                    "batch failed; later batches skipped"
                );
                return Err(RepositoryError::Batch(Box::new(BatchFailure {
                    batch_index,
                    attempted: batch,
                    committed,
                    cause,
                })));
            }
            committed.push(WriteResult {
                batch_index,
                item_count: batch.len(),
            });
        }
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Condition, InMemoryStore, Item, PrimaryKey};
    use crate::transaction::create_transaction;

    fn put(key: &str) -> TransactItem {
        create_transaction(PrimaryKey::same(key), Item::new())
    }

    fn update(key: &str) -> TransactItem {
        TransactItem::Update {
            key: PrimaryKey::same(key),
            fields: Item::new(),
            condition: Some(Condition::MustExist),
        }
    }

    #[test]
    fn split_respects_size_limit() {
        let items: Vec<_> = (0..250).map(|i| put(&i.to_string())).collect();
        let sizes: Vec<_> = split_transactions_by_key(items, 100)
            .iter()
            .map(Vec::len)
            .collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[test]
    fn split_cuts_on_repeated_key() {
        let batches = split_transactions_by_key(vec![put("A"), put("B"), update("A"), put("C")], 100);
        let keys: Vec<Vec<_>> = batches
            .iter()
            .map(|b| b.iter().map(|i| i.key().pk.clone()).collect())
            .collect();
        assert_eq!(keys, vec![vec!["A", "B"], vec!["A", "C"]]);
    }

    #[test]
    fn split_of_nothing_is_empty() {
        assert!(split_transactions_by_key(Vec::new(), 100).is_empty());
    }

    #[test]
    fn failed_batch_keeps_earlier_batches_and_skips_later_ones() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_transaction_after(1);
        let writer = BatchedWriter::with_batch_size(store.clone(), 2);

        let items: Vec<_> = ["A", "B", "C", "D", "E", "F"].into_iter().map(put).collect();
        let err = writer.write(items).unwrap_err();

        match &err {
            RepositoryError::Batch(failure) => {
                assert_eq!(failure.batch_index, 1);
                assert_eq!(failure.committed.len(), 1);
                let attempted: Vec<_> = failure.attempted.iter().map(|i| i.key().pk.as_str()).collect();
                assert_eq!(attempted, vec!["C", "D"]);
            }
            _ => panic!("Expected Batch error"),
        }
        let present: Vec<_> = store
            .dump()
            .iter()
            .map(|item| item["pk"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(present, vec!["A", "B"]);
    }

    #[test]
    fn conflict_inside_a_batch_is_typed() {
        let store = Arc::new(InMemoryStore::new());
        let writer = BatchedWriter::new(store);
        writer.write(vec![put("A")]).unwrap();

        let err = writer.write(vec![put("B"), put("A")]).unwrap_err();
        assert!(err.is_conflict());
        match err.root_cause() {
            RepositoryError::AlreadyExists { key } => assert_eq!(key, &PrimaryKey::same("A")),
            _ => panic!("Expected AlreadyExists"),
        }
    }
}
