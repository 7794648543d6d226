//! Single-table key-value store boundary.
//!
//! This module defines the wire contract the repositories rely on
//! (conditional writes, atomic multi-item transactions, paginated query and
//! scan) without making any assumptions about the backend.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use r#trait::{
    CancellationReason, Condition, Item, KeyValueStore, MAX_TRANSACTION_ITEMS, Page, PrimaryKey,
    Query, Scan, SortKeyCondition, StoreError, TransactItem,
};
