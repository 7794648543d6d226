//! Starting an ETL run.
//!
//! A bulk run is only allowed against a clean slate: no changelog number, no
//! records left in any stage artifact and an empty table. The trigger then
//! moves the dropped LDIF file into the extract stage's input, keeps a copy
//! under `history/` and describes the run for the orchestrator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use cpm_infra::store::{Scan, StoreError};
use cpm_infra::{KeyValueStore, LogStep, ObjectStore, ObjectStoreError, Step, StepChain, StepData};

use crate::codec::{self, CodecError};
use crate::context::EtlContext;
use crate::stages::{EXTRACT_KEY, LOAD_KEY, TRANSFORM_KEY};

pub const CHANGELOG_NUMBER_KEY: &str = "changelog-number";
pub const HISTORY_PREFIX: &str = "history";

const NAME_SEPARATOR: &str = ".";
const BAD_NAME_CHARACTERS: [char; 2] = [' ', ':'];

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("{bucket}/{key} should not exist when using bulk trigger")]
    ChangelogNumberExists { bucket: String, key: String },

    #[error("Expected empty data '{content}' in {bucket}/{key}")]
    StateFileNotEmpty {
        bucket: String,
        key: String,
        content: &'static str,
    },

    #[error("Expected empty table '{0}'")]
    TableNotEmpty(String),

    #[error("{bucket}/{key} does not exist")]
    MissingSource { bucket: String, key: String },

    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EtlType {
    Bulk,
    Update,
}

impl EtlType {
    pub fn as_str(self) -> &'static str {
        match self {
            EtlType::Bulk => "bulk",
            EtlType::Update => "update",
        }
    }
}

impl core::fmt::Display for EtlType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the orchestrator is started with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMachineInput {
    pub etl_type: EtlType,
    pub changelog_number_start: u64,
    pub changelog_number_end: u64,
    pub timestamp: String,
}

impl StateMachineInput {
    pub fn bulk(changelog_number: u64) -> Self {
        Self::new(EtlType::Bulk, 0, changelog_number)
    }

    pub fn update(changelog_number_start: u64, changelog_number_end: u64) -> Self {
        Self::new(EtlType::Update, changelog_number_start, changelog_number_end)
    }

    fn new(etl_type: EtlType, changelog_number_start: u64, changelog_number_end: u64) -> Self {
        Self {
            etl_type,
            changelog_number_start,
            changelog_number_end,
            timestamp: chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.6f")
                .to_string(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Execution name: the fields joined by `.`, with spaces and colons replaced.
    pub fn name(&self) -> String {
        [
            self.etl_type.as_str().to_owned(),
            self.changelog_number_start.to_string(),
            self.changelog_number_end.to_string(),
            self.timestamp.clone(),
        ]
        .join(NAME_SEPARATOR)
        .replace(BAD_NAME_CHARACTERS, NAME_SEPARATOR)
    }
}

pub fn validate_no_changelog_number(
    objects: &dyn ObjectStore,
    bucket: &str,
) -> Result<(), TriggerError> {
    if objects.exists(CHANGELOG_NUMBER_KEY)? {
        return Err(TriggerError::ChangelogNumberExists {
            bucket: bucket.to_owned(),
            key: CHANGELOG_NUMBER_KEY.to_owned(),
        });
    }
    Ok(())
}

/// Every stage artifact must be absent or hold no records.
pub fn validate_state_keys_are_empty(
    objects: &dyn ObjectStore,
    bucket: &str,
) -> Result<(), TriggerError> {
    let not_empty = |key: &str, content: &'static str| TriggerError::StateFileNotEmpty {
        bucket: bucket.to_owned(),
        key: key.to_owned(),
        content,
    };

    if let Some(body) = objects.get(EXTRACT_KEY)? {
        if !body.is_empty() {
            return Err(not_empty(EXTRACT_KEY, ""));
        }
    }
    for key in [TRANSFORM_KEY, LOAD_KEY] {
        if let Some(body) = objects.get(key)? {
            let empty = body == codec::empty()?
                || codec::decode::<serde_json::Value>(&body).is_ok_and(|records| records.is_empty());
            if !empty {
                return Err(not_empty(key, "[]"));
            }
        }
    }
    Ok(())
}

pub fn validate_database_is_empty(
    store: &dyn KeyValueStore,
    table_name: &str,
) -> Result<(), TriggerError> {
    let page = store.scan(&Scan {
        limit: Some(1),
        ..Scan::default()
    })?;
    if !page.items.is_empty() {
        return Err(TriggerError::TableNotEmpty(table_name.to_owned()));
    }
    Ok(())
}

struct TriggerContext {
    objects: Arc<dyn ObjectStore>,
    store: Arc<dyn KeyValueStore>,
    bucket: String,
    table_name: String,
}

/// The LDIF file that fired the trigger and the run it starts.
#[derive(Debug, Clone)]
pub struct BulkTrigger {
    pub source_key: String,
    pub input: StateMachineInput,
}

fn trigger(data: &StepData) -> anyhow::Result<&BulkTrigger> {
    data.init::<BulkTrigger>()
        .ok_or_else(|| anyhow::anyhow!("bulk trigger started without a source"))
}

fn bulk_steps() -> Vec<Step<TriggerContext>> {
    vec![
        Step::new(
            "validate_no_changelog_number",
            |_: &StepData, context: &mut TriggerContext| -> anyhow::Result<()> {
                Ok(validate_no_changelog_number(context.objects.as_ref(), &context.bucket)?)
            },
        ),
        Step::new(
            "validate_state_keys_are_empty",
            |_: &StepData, context: &mut TriggerContext| -> anyhow::Result<()> {
                Ok(validate_state_keys_are_empty(context.objects.as_ref(), &context.bucket)?)
            },
        ),
        Step::new(
            "validate_database_is_empty",
            |_: &StepData, context: &mut TriggerContext| -> anyhow::Result<()> {
                Ok(validate_database_is_empty(context.store.as_ref(), &context.table_name)?)
            },
        ),
        Step::new(
            "copy_to_state_machine",
            |data: &StepData, context: &mut TriggerContext| -> anyhow::Result<Vec<u8>> {
                let source_key = &trigger(data)?.source_key;
                let body = context.objects.get(source_key)?.ok_or_else(|| {
                    TriggerError::MissingSource {
                        bucket: context.bucket.clone(),
                        key: source_key.clone(),
                    }
                })?;
                context.objects.put(EXTRACT_KEY, body.clone())?;
                Ok(body)
            },
        ),
        Step::new(
            "copy_to_history",
            |data: &StepData, context: &mut TriggerContext| -> anyhow::Result<()> {
                let source_key = &trigger(data)?.source_key;
                let body = data.require::<Vec<u8>>("copy_to_state_machine")?;
                context
                    .objects
                    .put(&format!("{HISTORY_PREFIX}/{source_key}"), body.clone())?;
                Ok(())
            },
        ),
        Step::new(
            "delete_object",
            |data: &StepData, context: &mut TriggerContext| -> anyhow::Result<()> {
                context.objects.delete(&trigger(data)?.source_key)?;
                Ok(())
            },
        ),
        Step::new(
            "state_machine_input",
            |data: &StepData, _: &mut TriggerContext| -> anyhow::Result<StateMachineInput> {
                Ok(trigger(data)?.input.clone())
            },
        ),
    ]
}

/// Validate the clean slate and stage `source_key` for a bulk run.
pub fn bulk_trigger(
    context: &EtlContext,
    table_name: &str,
    source_key: &str,
) -> anyhow::Result<StateMachineInput> {
    let mut trigger_context = TriggerContext {
        objects: context.objects.clone(),
        store: context.store.clone(),
        bucket: context.bucket.clone(),
        table_name: table_name.to_owned(),
    };
    let init = BulkTrigger {
        source_key: source_key.to_owned(),
        input: StateMachineInput::bulk(0),
    };
    let input = StepChain::new(bulk_steps())?
        .with_decorator(LogStep)
        .run(init, &mut trigger_context)
        .into_result::<StateMachineInput>()?;
    tracing::info!(name = %input.name(), source_key, "bulk etl triggered");
    Ok(input)
}
