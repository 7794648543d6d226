use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use cpm_core::DomainError;
use cpm_infra::repository::{BatchedWriter, CpmProductRepository, ProductTeamRepository};
use cpm_infra::KeyValueStore;

/// Storage shared by every handler.
///
/// Cheap to clone; each handler run works on its own copy.
#[derive(Clone)]
pub struct ApiContext {
    pub store: Arc<dyn KeyValueStore>,
    pub product_teams: ProductTeamRepository,
    pub products: CpmProductRepository,
}

impl ApiContext {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            product_teams: ProductTeamRepository::new(store.clone()),
            products: CpmProductRepository::new(store.clone()),
            store,
        }
    }

    /// Like [`ApiContext::new`], writing through `writer`.
    pub fn with_writer(store: Arc<dyn KeyValueStore>, writer: BatchedWriter) -> Self {
        Self {
            product_teams: ProductTeamRepository::with_writer(store.clone(), writer.clone()),
            products: CpmProductRepository::with_writer(store.clone(), writer),
            store,
        }
    }
}

impl core::fmt::Debug for ApiContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApiContext").finish_non_exhaustive()
    }
}

/// An inbound request: path parameters plus an optional JSON body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRequest {
    #[serde(default)]
    pub path_parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl ApiRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path_parameter(mut self, name: &str, value: impl Into<String>) -> Self {
        self.path_parameters.insert(name.to_owned(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_json(self, body: &serde_json::Value) -> Self {
        self.with_body(body.to_string())
    }

    pub fn path_parameter(&self, name: &str) -> Result<&str, DomainError> {
        self.path_parameters
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| DomainError::validation(format!("missing path parameter '{name}'")))
    }

    /// Parse the body; a missing or blank body reads as `{}`.
    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self.body.as_deref().map(str::trim) {
            Some(body) if !body.is_empty() => serde_json::from_str(body),
            _ => serde_json::from_str("{}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Body {
        #[serde(default)]
        name: Option<String>,
    }

    #[test]
    fn missing_path_parameters_are_validation_errors() {
        let request = ApiRequest::new().with_path_parameter("product_team_id", " ");
        match request.path_parameter("product_team_id").unwrap_err() {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation"),
        }
        match request.path_parameter("product_id").unwrap_err() {
            DomainError::Validation(message) => assert!(message.contains("product_id")),
            _ => panic!("Expected Validation"),
        }
    }

    #[test]
    fn empty_bodies_read_as_an_empty_object() {
        assert_eq!(ApiRequest::new().json_body::<Body>().unwrap(), Body { name: None });
        let request = ApiRequest::new().with_json(&json!({"name": "x"}));
        assert_eq!(
            request.json_body::<Body>().unwrap(),
            Body {
                name: Some("x".into())
            }
        );
        assert!(ApiRequest::new().with_body("{").json_body::<Body>().is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn non_blank_path_parameters_round_trip(value in "[A-Za-z0-9.-]{1,24}") {
                let request = ApiRequest::new().with_path_parameter("product_id", value.clone());
                prop_assert_eq!(request.path_parameter("product_id").unwrap(), value.as_str());
            }
        }
    }
}
