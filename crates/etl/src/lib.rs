//! SDS to CPM ETL.
//!
//! Bulk LDIF exports of the Spine Directory Service are moved into the CPM
//! table in three resumable stages (see [`stages`]). Each stage is a
//! [`worker::Worker`] run through [`worker::execute_step_chain`]: it processes
//! as many records as it can, saves what is left and reports a
//! [`worker::WorkerResponse`]. [`trigger`] guards the start of a run and
//! [`notify`] reports how it went.

pub mod codec;
pub mod context;
pub mod duplicates;
pub mod ldif;
pub mod notify;
pub mod sds;
pub mod stages;
pub mod translate;
pub mod trigger;
pub mod worker;

pub use context::EtlContext;
pub use duplicates::{DuplicateSdsKey, KeyCheckError, reject_duplicate_keys};
pub use ldif::{LdifError, LdifRecord};
pub use notify::{EtlStatus, Notifier, TriggerResponse, WebhookNotifier, parse_message};
pub use sds::{SdsError, SdsRecord};
pub use stages::{Extract, Load, Transform};
pub use trigger::{EtlType, StateMachineInput, TriggerError, bulk_trigger};
pub use worker::{Worker, WorkerResponse, apply_action, execute_step_chain};
