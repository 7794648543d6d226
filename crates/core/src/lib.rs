//! `cpm-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! the aggregate root contract, the domain error model, strongly-typed ids
//! and the validation rules shared by every entity.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod key;
pub mod lifecycle;
pub mod validation;

pub use aggregate::{AggregateRoot, EventLog, EventSourced};
pub use error::{DomainError, DomainResult};
pub use id::{DeviceId, ProductId, ProductTeamId};
pub use key::{EntityKey, KeyType};
pub use lifecycle::{Status, Timestamp, now};
