//! Process configuration, read once at startup.

use thiserror::Error;

use crate::store::in_memory::DEFAULT_PAGE_SIZE;

pub const TABLE_NAME: &str = "TABLE_NAME";
pub const ETL_BUCKET: &str = "ETL_BUCKET";
pub const ETL_MAX_RECORDS: &str = "ETL_MAX_RECORDS";
pub const NOTIFY_WEBHOOK_URL: &str = "NOTIFY_WEBHOOK_URL";
pub const STORE_PAGE_SIZE: &str = "STORE_PAGE_SIZE";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("{name} must be a positive integer, got '{value}'")]
    NotAPositiveInteger { name: &'static str, value: String },

    #[error("{name} must not be empty")]
    Empty { name: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub table_name: String,
    pub etl_bucket: String,
    /// Per-invocation cap on ETL records. `None` processes everything.
    pub etl_max_records: Option<usize>,
    pub notify_webhook_url: Option<String>,
    pub store_page_size: usize,
}

impl Config {
    /// Read from the environment, honouring a `.env` file if one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            let value = lookup(name).ok_or(ConfigError::Missing(name))?;
            if value.trim().is_empty() {
                return Err(ConfigError::Empty { name });
            }
            Ok(value)
        };
        let optional = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());
        let positive = |name: &'static str| -> Result<Option<usize>, ConfigError> {
            optional(name)
                .map(|value| match value.trim().parse::<usize>() {
                    Ok(n) if n > 0 => Ok(n),
                    _ => Err(ConfigError::NotAPositiveInteger { name, value }),
                })
                .transpose()
        };

        Ok(Self {
            table_name: required(TABLE_NAME)?,
            etl_bucket: required(ETL_BUCKET)?,
            etl_max_records: positive(ETL_MAX_RECORDS)?,
            notify_webhook_url: optional(NOTIFY_WEBHOOK_URL),
            store_page_size: positive(STORE_PAGE_SIZE)?.unwrap_or(DEFAULT_PAGE_SIZE),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn minimal_configuration_uses_defaults() {
        let config =
            Config::from_lookup(lookup(&[(TABLE_NAME, "cpm"), (ETL_BUCKET, "etl")])).unwrap();
        assert_eq!(config.table_name, "cpm");
        assert_eq!(config.etl_max_records, None);
        assert_eq!(config.notify_webhook_url, None);
        assert_eq!(config.store_page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn optional_values_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            (TABLE_NAME, "cpm"),
            (ETL_BUCKET, "etl"),
            (ETL_MAX_RECORDS, "50"),
            (STORE_PAGE_SIZE, "25"),
            (NOTIFY_WEBHOOK_URL, "http://localhost/hook"),
        ]))
        .unwrap();
        assert_eq!(config.etl_max_records, Some(50));
        assert_eq!(config.store_page_size, 25);
        assert_eq!(config.notify_webhook_url.as_deref(), Some("http://localhost/hook"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = Config::from_lookup(lookup(&[(ETL_BUCKET, "etl")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing(TABLE_NAME));

        let err = Config::from_lookup(lookup(&[
            (TABLE_NAME, "cpm"),
            (ETL_BUCKET, "etl"),
            (ETL_MAX_RECORDS, "0"),
        ]))
        .unwrap_err();
        match err {
            ConfigError::NotAPositiveInteger { name, .. } => assert_eq!(name, ETL_MAX_RECORDS),
            _ => panic!("Expected NotAPositiveInteger"),
        }
    }
}
