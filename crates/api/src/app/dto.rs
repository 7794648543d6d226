use serde::{Deserialize, Serialize};

use cpm_products::ProductTeamKey;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateProductTeamRequest {
    pub name: String,
    pub ods_code: String,
    #[serde(default)]
    pub keys: Vec<ProductTeamKey>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCpmProductRequest {
    pub product_name: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct SearchResponse<T> {
    pub results: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub code: &'static str,
    pub message: String,
}

impl DeletedResponse {
    pub fn new(id: impl core::fmt::Display) -> Self {
        Self {
            code: "RESOURCE_DELETED",
            message: format!("{id} has been deleted."),
        }
    }
}
