//! Product teams and CPM products (event-sourced).
//!
//! This crate contains business rules for the organisations that own products
//! and the products themselves, implemented purely as deterministic domain
//! logic (no IO, no HTTP, no storage).

pub mod keys;
pub mod product;
pub mod product_team;

pub use keys::{ProductKey, ProductKeyType, ProductTeamKey, ProductTeamKeyType};
pub use product::{CpmProduct, CpmProductEvent, CpmProductKeyAddedEvent, CpmProductRecord};
pub use product_team::{ProductTeam, ProductTeamEvent, ProductTeamRecord};
