use std::collections::VecDeque;
use std::sync::Arc;

use crate::repository::RepositoryError;
use crate::store::{Item, KeyValueStore, Page, PrimaryKey, Query, Scan, StoreError};

#[derive(Debug, Clone)]
enum Source {
    Query(Query),
    Scan(Scan),
}

impl Source {
    fn fetch(&self, store: &dyn KeyValueStore, start: Option<PrimaryKey>) -> Result<Page, StoreError> {
        match self {
            Source::Query(query) => store.query(&Query {
                exclusive_start_key: start,
                ..query.clone()
            }),
            Source::Scan(scan) => store.scan(&Scan {
                exclusive_start_key: start,
                ..scan.clone()
            }),
        }
    }
}

type Decode<T> = fn(Item) -> Result<Option<T>, RepositoryError>;

/// Lazy, paginated sequence over the rows of a query or scan.
///
/// Pages are fetched only as the iterator is advanced, following the store's
/// continuation keys until none is returned. A search can only be restarted
/// from the beginning (build a new one); it stops for good after yielding an error.
/// Rows the decoder maps to `None` are skipped.
pub struct Search<T> {
    store: Arc<dyn KeyValueStore>,
    source: Source,
    decode: Decode<T>,
    buffer: VecDeque<Item>,
    next_start: Option<PrimaryKey>,
    started: bool,
    finished: bool,
}

impl<T> Search<T> {
    pub fn query(store: Arc<dyn KeyValueStore>, query: Query, decode: Decode<T>) -> Self {
        Self::new(store, Source::Query(query), decode)
    }

    pub fn scan(store: Arc<dyn KeyValueStore>, scan: Scan, decode: Decode<T>) -> Self {
        Self::new(store, Source::Scan(scan), decode)
    }

    fn new(store: Arc<dyn KeyValueStore>, source: Source, decode: Decode<T>) -> Self {
        Self {
            store,
            source,
            decode,
            buffer: VecDeque::new(),
            next_start: None,
            started: false,
            finished: false,
        }
    }

    fn fill(&mut self) -> Result<(), RepositoryError> {
        while self.buffer.is_empty() && !self.finished {
            if self.started && self.next_start.is_none() {
                self.finished = true;
                break;
            }
            let page = self.source.fetch(self.store.as_ref(), self.next_start.take())?;
            self.started = true;
            tracing::debug!(rows = page.items.len(), more = page.last_evaluated_key.is_some(), "fetched page");
            self.next_start = page.last_evaluated_key;
            self.buffer.extend(page.items);
        }
        Ok(())
    }
}

impl<T> Iterator for Search<T> {
    type Item = Result<T, RepositoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Err(err) = self.fill() {
                self.finished = true;
                self.buffer.clear();
                return Some(Err(err));
            }
            let item = self.buffer.pop_front()?;
            match (self.decode)(item) {
                Ok(Some(value)) => return Some(Ok(value)),
                Ok(None) => continue,
                Err(err) => {
                    self.finished = true;
                    self.buffer.clear();
                    return Some(Err(err));
                }
            }
        }
    }
}
