//! The three bulk ETL stages and the artifacts they hand between each other.
//!
//! | stage     | reads                          | writes                          |
//! |-----------|--------------------------------|---------------------------------|
//! | extract   | `input--extract/unprocessed`   | `input--transform/unprocessed`  |
//! | transform | `input--transform/unprocessed` | `input--load/unprocessed`       |
//! | load      | `input--load/unprocessed`      | the CPM table                   |
//!
//! The extract input is LDIF text; every other artifact is an LZ4-compressed
//! JSON array. A missing artifact reads as empty.

use std::collections::VecDeque;

use anyhow::Context;
use serde::de::DeserializeOwned;

use cpm_events::ExportedEvent;
use cpm_infra::repository::{CpmEvent, ProductTeamRepository, cpm_event_deserializer};

use crate::codec;
use crate::context::EtlContext;
use crate::duplicates::reject_duplicate_keys;
use crate::ldif::{self, LdifRecord};
use crate::sds::SdsRecord;
use crate::translate::{ProductTeams, translate};
use crate::worker::{ActionResponse, Worker, WorkerActionResponse, apply_action};

pub const EXTRACT_KEY: &str = "input--extract/unprocessed";
pub const TRANSFORM_KEY: &str = "input--transform/unprocessed";
pub const LOAD_KEY: &str = "input--load/unprocessed";

fn read_text(context: &EtlContext, key: &str) -> anyhow::Result<String> {
    let bytes = context.objects.get(key)?.unwrap_or_default();
    String::from_utf8(bytes).with_context(|| format!("{}/{key} is not valid UTF-8", context.bucket))
}

fn read_records<T: DeserializeOwned>(context: &EtlContext, key: &str) -> anyhow::Result<VecDeque<T>> {
    let bytes = context.objects.get(key)?.unwrap_or_default();
    let records = codec::decode(&bytes)
        .with_context(|| format!("could not read records from {}/{key}", context.bucket))?;
    Ok(VecDeque::from(records))
}

/// Validates raw SDS records and queues them for translation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Extract;

impl Worker for Extract {
    type Unprocessed = LdifRecord;
    type Processed = LdifRecord;

    fn stage_name(&self) -> &'static str {
        "extract"
    }

    fn execute(&self, context: &EtlContext) -> anyhow::Result<ActionResponse<Self>> {
        let text = read_text(context, EXTRACT_KEY)?;
        let mut unprocessed = VecDeque::from(ldif::parse(&text)?);
        let mut processed = read_records(context, TRANSFORM_KEY)?;

        let exception = apply_action(
            &mut unprocessed,
            &mut processed,
            |record: &LdifRecord| -> anyhow::Result<Option<LdifRecord>> {
                SdsRecord::from_ldif(record)?;
                Ok(Some(record.clone()))
            },
            context.max_records,
        );

        Ok(WorkerActionResponse {
            unprocessed_records: unprocessed,
            processed_records: processed,
            exception,
            input_key: EXTRACT_KEY.to_owned(),
            output_key: Some(TRANSFORM_KEY.to_owned()),
        })
    }

    fn dump_unprocessed(&self, records: &VecDeque<LdifRecord>) -> anyhow::Result<Vec<u8>> {
        let records: Vec<LdifRecord> = records.iter().cloned().collect();
        Ok(ldif::write(&records).into_bytes())
    }

    fn dump_processed(&self, records: &VecDeque<LdifRecord>) -> anyhow::Result<Vec<u8>> {
        Ok(codec::encode(records)?)
    }
}

/// Translates SDS records into product team and device events.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transform;

impl Worker for Transform {
    type Unprocessed = LdifRecord;
    type Processed = ExportedEvent;

    fn stage_name(&self) -> &'static str {
        "transform"
    }

    fn execute(&self, context: &EtlContext) -> anyhow::Result<ActionResponse<Self>> {
        let mut unprocessed = read_records(context, TRANSFORM_KEY)?;
        let mut processed = read_records(context, LOAD_KEY)?;
        let mut teams = ProductTeams::with_repository(ProductTeamRepository::new(context.store.clone()));
        teams.remember(&processed)?;

        let exception = apply_action(
            &mut unprocessed,
            &mut processed,
            |record: &LdifRecord| -> anyhow::Result<Vec<ExportedEvent>> {
                let record = SdsRecord::from_ldif(record)?;
                Ok(translate(&record, &mut teams)?)
            },
            context.max_records,
        );

        // A key claimed by two devices would fail the load half way through.
        reject_duplicate_keys(processed.make_contiguous())?;

        Ok(WorkerActionResponse {
            unprocessed_records: unprocessed,
            processed_records: processed,
            exception,
            input_key: TRANSFORM_KEY.to_owned(),
            output_key: Some(LOAD_KEY.to_owned()),
        })
    }

    fn dump_unprocessed(&self, records: &VecDeque<LdifRecord>) -> anyhow::Result<Vec<u8>> {
        Ok(codec::encode(records)?)
    }

    fn dump_processed(&self, records: &VecDeque<ExportedEvent>) -> anyhow::Result<Vec<u8>> {
        Ok(codec::encode(records)?)
    }
}

/// Writes product team and device events to the CPM table.
#[derive(Debug, Clone, Copy, Default)]
pub struct Load;

impl Worker for Load {
    type Unprocessed = ExportedEvent;
    type Processed = CpmEvent;

    fn stage_name(&self) -> &'static str {
        "load"
    }

    fn execute(&self, context: &EtlContext) -> anyhow::Result<ActionResponse<Self>> {
        let deserializer = cpm_event_deserializer();
        let mut unprocessed = read_records(context, LOAD_KEY)?;
        let mut processed = VecDeque::new();

        let exception = apply_action(
            &mut unprocessed,
            &mut processed,
            |event: &ExportedEvent| -> anyhow::Result<Option<CpmEvent>> {
                Ok(Some(deserializer.deserialize(event)?))
            },
            context.max_records,
        );

        Ok(WorkerActionResponse {
            unprocessed_records: unprocessed,
            processed_records: processed,
            exception,
            input_key: LOAD_KEY.to_owned(),
            output_key: None,
        })
    }

    fn dump_unprocessed(&self, records: &VecDeque<ExportedEvent>) -> anyhow::Result<Vec<u8>> {
        Ok(codec::encode(records)?)
    }

    fn dump_processed(&self, records: &VecDeque<CpmEvent>) -> anyhow::Result<Vec<u8>> {
        Ok(codec::encode(records)?)
    }

    fn load_processed(&self, context: &EtlContext, records: &VecDeque<CpmEvent>) -> anyhow::Result<()> {
        let events: Vec<CpmEvent> = records.iter().cloned().collect();
        let written = context.repository.write(&events)?;
        tracing::info!(events = events.len(), batches = written.len(), "loaded events");
        Ok(())
    }
}
