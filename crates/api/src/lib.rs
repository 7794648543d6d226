//! Request handlers for product teams and CPM products.
//!
//! Every handler is a step chain over an [`context::ApiContext`]: parse the
//! request, read or build the aggregate, persist its events and render the
//! outcome. Failures anywhere in the chain are rendered by
//! [`cpm_infra::response::Response::error`].

pub mod app;
pub mod context;

pub use app::{
    create_cpm_product, create_product_team, delete_cpm_product, delete_product_team,
    read_cpm_product, read_product_team, search_cpm_products,
};
pub use context::{ApiContext, ApiRequest};
