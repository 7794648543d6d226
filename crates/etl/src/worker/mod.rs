//! ETL workers: resumable record processing between object-store artifacts.
//!
//! A worker invocation runs two step chains:
//!
//! ```text
//! action chain: [execute_action]
//!     └─ Ok(WorkerActionResponse) ─▶ save chain: [save_unprocessed_records, save_processed_records]
//! ```
//!
//! The action moves records from its input artifact through
//! [`apply_action`], capturing a per-record failure as data. The save chain
//! then writes back whatever is left unprocessed and hands the processed
//! records on, so the next invocation resumes where this one stopped.
//!
//! An error that escapes either chain is fatal: the summary carries no counts.

pub mod action;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use cpm_infra::{LogStep, Step, StepChain, StepData};

use crate::context::EtlContext;

pub use action::apply_action;

pub const EXECUTE_ACTION: &str = "execute_action";
pub const SAVE_UNPROCESSED_RECORDS: &str = "save_unprocessed_records";
pub const SAVE_PROCESSED_RECORDS: &str = "save_processed_records";

const ERROR_GROUP_MESSAGE: &str = "The following errors were encountered";
const INDENTATION: &str = "  ";

/// What an action did with its input.
#[derive(Debug)]
pub struct WorkerActionResponse<U, P> {
    pub unprocessed_records: VecDeque<U>,
    pub processed_records: VecDeque<P>,
    /// A per-record failure; records before it were processed.
    pub exception: Option<anyhow::Error>,
    /// Where the unprocessed records go back to.
    pub input_key: String,
    /// Where processed records go; `None` hands them to [`Worker::load_processed`].
    pub output_key: Option<String>,
}

pub type ActionResponse<W> =
    WorkerActionResponse<<W as Worker>::Unprocessed, <W as Worker>::Processed>;

/// Summary of one invocation, as reported to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub stage_name: String,
    pub processed_records: Option<usize>,
    pub unprocessed_records: Option<usize>,
    pub error_message: Option<String>,
}

/// One ETL stage.
pub trait Worker: Clone + 'static {
    type Unprocessed: 'static;
    type Processed: 'static;

    fn stage_name(&self) -> &'static str;

    /// Load the input, apply the stage's action and report the outcome.
    fn execute(&self, context: &EtlContext) -> anyhow::Result<ActionResponse<Self>>;

    fn dump_unprocessed(&self, records: &VecDeque<Self::Unprocessed>) -> anyhow::Result<Vec<u8>>;

    fn dump_processed(&self, records: &VecDeque<Self::Processed>) -> anyhow::Result<Vec<u8>>;

    /// Sink for stages whose output is not an artifact.
    fn load_processed(
        &self,
        _context: &EtlContext,
        _records: &VecDeque<Self::Processed>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

struct WorkerContext<W> {
    worker: W,
    etl: EtlContext,
}

fn action_response<W: Worker>(data: &StepData) -> anyhow::Result<&ActionResponse<W>> {
    data.init::<ActionResponse<W>>()
        .ok_or_else(|| anyhow::anyhow!("save chain started without an action response"))
}

fn action_chain<W: Worker>() -> anyhow::Result<StepChain<WorkerContext<W>>> {
    let chain = StepChain::new(vec![Step::new(
        EXECUTE_ACTION,
        |_: &StepData, context: &mut WorkerContext<W>| context.worker.execute(&context.etl),
    )])?;
    Ok(chain.with_decorator(LogStep))
}

fn save_chain<W: Worker>() -> anyhow::Result<StepChain<WorkerContext<W>>> {
    let chain = StepChain::new(vec![
        Step::new(
            SAVE_UNPROCESSED_RECORDS,
            |data: &StepData, context: &mut WorkerContext<W>| -> anyhow::Result<()> {
                let response = action_response::<W>(data)?;
                let body = context.worker.dump_unprocessed(&response.unprocessed_records)?;
                context.etl.objects.put(&response.input_key, body)?;
                Ok(())
            },
        ),
        Step::new(
            SAVE_PROCESSED_RECORDS,
            |data: &StepData, context: &mut WorkerContext<W>| -> anyhow::Result<()> {
                let response = action_response::<W>(data)?;
                match &response.output_key {
                    Some(key) => {
                        let body = context.worker.dump_processed(&response.processed_records)?;
                        context.etl.objects.put(key, body)?;
                    }
                    None if !response.processed_records.is_empty() => {
                        context
                            .worker
                            .load_processed(&context.etl, &response.processed_records)?;
                    }
                    None => {}
                }
                Ok(())
            },
        ),
    ])?;
    Ok(chain.with_decorator(LogStep))
}

/// Run one worker invocation and summarise it.
pub fn execute_step_chain<W: Worker>(worker: &W, context: &EtlContext) -> WorkerResponse {
    let stage_name = worker.stage_name();
    let mut chain_context = WorkerContext {
        worker: worker.clone(),
        etl: context.clone(),
    };

    let response = action_chain::<W>().and_then(|chain| {
        chain
            .run((), &mut chain_context)
            .into_result::<ActionResponse<W>>()
    });
    let response = match response {
        Ok(response) => response,
        Err(err) => return render_response::<W>(stage_name, Err(&err), None),
    };

    match save_chain::<W>() {
        Ok(chain) => {
            let run = chain.run(response, &mut chain_context);
            match run.data().init::<ActionResponse<W>>() {
                Some(response) => render_response::<W>(stage_name, Ok(response), run.error()),
                None => render_response::<W>(
                    stage_name,
                    Err(&anyhow::anyhow!("action response was lost by the save chain")),
                    run.error(),
                ),
            }
        }
        Err(err) => render_response::<W>(stage_name, Ok(&response), Some(&err)),
    }
}

fn render_response<W: Worker>(
    stage_name: &str,
    action: Result<&ActionResponse<W>, &anyhow::Error>,
    save_error: Option<&anyhow::Error>,
) -> WorkerResponse {
    let mut errors = Vec::new();
    let mut fatal = false;

    match action {
        Err(err) => {
            fatal = true;
            errors.push(err);
        }
        Ok(response) => errors.extend(response.exception.as_ref()),
    }
    if let Some(err) = save_error {
        fatal = true;
        errors.push(err);
    }

    let counts = match action {
        Ok(response) if !fatal => Some((
            response.processed_records.len(),
            response.unprocessed_records.len(),
        )),
        _ => None,
    };
    let error_message = (!errors.is_empty()).then(|| render_errors(ERROR_GROUP_MESSAGE, &errors));

    match (&counts, &error_message) {
        (None, _) => tracing::error!(stage = stage_name, error = ?error_message, "worker failed"),
        (Some((processed, unprocessed)), Some(_)) => tracing::warn!(
            stage = stage_name,
            processed,
            unprocessed,
            "worker stopped at a failing record"
        ),
        (Some((processed, unprocessed)), None) => {
            tracing::info!(stage = stage_name, processed, unprocessed, "worker finished")
        }
    }

    WorkerResponse {
        stage_name: stage_name.to_owned(),
        processed_records: counts.map(|(processed, _)| processed),
        unprocessed_records: counts.map(|(_, unprocessed)| unprocessed),
        error_message,
    }
}

/// Render errors as a numbered group.
///
/// ```text
/// The following errors were encountered
///   -- Error 1 --
///   Failed to parse record 3
///   {"dn": ...}
///   missing field `nhsidcode`
/// ```
///
/// Context attached to an error is rendered above its root cause, joined by `, `.
pub fn render_errors(message: &str, errors: &[&anyhow::Error]) -> String {
    let mut rendered = message.to_owned();
    for (index, err) in errors.iter().enumerate() {
        rendered.push('\n');
        rendered.push_str(&format!("{INDENTATION}-- Error {} --\n", index + 1));
        rendered.push_str(INDENTATION);
        rendered.push_str(&render_error(err).replace('\n', &format!("\n{INDENTATION}")));
    }
    rendered
}

fn render_error(err: &anyhow::Error) -> String {
    let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
    match chain.split_last() {
        Some((cause, [])) => cause.clone(),
        Some((cause, notes)) => format!("{}\n{cause}", notes.join(", ")),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use anyhow::bail;
    use cpm_infra::{InMemoryObjectStore, InMemoryStore, ObjectStore};

    use crate::codec;

    const INPUT: &str = "input--numbers/unprocessed";
    const OUTPUT: &str = "output--numbers/processed";

    /// Doubles numbers; negative numbers fail, `99` fails the whole action.
    #[derive(Clone)]
    struct Doubler {
        output: bool,
        sink: Arc<std::sync::Mutex<Vec<i64>>>,
    }

    impl Doubler {
        fn new(output: bool) -> Self {
            Self {
                output,
                sink: Arc::default(),
            }
        }
    }

    impl Worker for Doubler {
        type Unprocessed = i64;
        type Processed = i64;

        fn stage_name(&self) -> &'static str {
            "double"
        }

        fn execute(&self, context: &EtlContext) -> anyhow::Result<ActionResponse<Self>> {
            let bytes = context.objects.get(INPUT)?.unwrap_or_default();
            let mut unprocessed: VecDeque<i64> = codec::decode::<i64>(&bytes)?.into();
            if unprocessed.contains(&99) {
                bail!("99 is not allowed anywhere");
            }
            let mut processed = VecDeque::new();
            let exception = apply_action(
                &mut unprocessed,
                &mut processed,
                |n: &i64| {
                    if *n < 0 {
                        bail!("cannot double {n}");
                    }
                    Ok(Some(n * 2))
                },
                context.max_records,
            );
            Ok(WorkerActionResponse {
                unprocessed_records: unprocessed,
                processed_records: processed,
                exception,
                input_key: INPUT.to_owned(),
                output_key: self.output.then(|| OUTPUT.to_owned()),
            })
        }

        fn dump_unprocessed(&self, records: &VecDeque<i64>) -> anyhow::Result<Vec<u8>> {
            Ok(codec::encode(records)?)
        }

        fn dump_processed(&self, records: &VecDeque<i64>) -> anyhow::Result<Vec<u8>> {
            Ok(codec::encode(records)?)
        }

        fn load_processed(&self, _: &EtlContext, records: &VecDeque<i64>) -> anyhow::Result<()> {
            if records.contains(&0) {
                bail!("zero cannot be loaded");
            }
            self.sink.lock().unwrap().extend(records.iter().copied());
            Ok(())
        }
    }

    fn context(input: &[i64]) -> (EtlContext, Arc<InMemoryObjectStore>) {
        let objects = Arc::new(InMemoryObjectStore::new());
        objects.put(INPUT, codec::encode(input).unwrap()).unwrap();
        let context = EtlContext::new(objects.clone(), Arc::new(InMemoryStore::new()), "etl");
        (context, objects)
    }

    fn read(objects: &InMemoryObjectStore, key: &str) -> Vec<i64> {
        codec::decode(&objects.get(key).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn successful_run_saves_both_artifacts() {
        let (context, objects) = context(&[1, 2, 3]);
        let response = execute_step_chain(&Doubler::new(true), &context);
        assert_eq!(
            response,
            WorkerResponse {
                stage_name: "double".into(),
                processed_records: Some(3),
                unprocessed_records: Some(0),
                error_message: None,
            }
        );
        assert!(read(&objects, INPUT).is_empty());
        assert_eq!(read(&objects, OUTPUT), vec![2, 4, 6]);
    }

    #[test]
    fn record_failure_is_reported_with_counts() {
        let (context, objects) = context(&[1, -2, 3]);
        let response = execute_step_chain(&Doubler::new(true), &context);
        assert_eq!(response.processed_records, Some(1));
        assert_eq!(response.unprocessed_records, Some(2));
        assert_eq!(
            response.error_message.as_deref(),
            Some(
                "The following errors were encountered\n  -- Error 1 --\n  Failed to parse record 1\n  -2\n  cannot double -2"
            )
        );
        assert_eq!(read(&objects, INPUT), vec![-2, 3]);
        assert_eq!(read(&objects, OUTPUT), vec![2]);
    }

    #[test]
    fn action_failure_is_fatal_and_saves_nothing() {
        let (context, objects) = context(&[1, 99]);
        let response = execute_step_chain(&Doubler::new(true), &context);
        assert_eq!(response.processed_records, None);
        assert_eq!(response.unprocessed_records, None);
        assert!(response.error_message.unwrap().contains("99 is not allowed anywhere"));
        assert_eq!(read(&objects, INPUT), vec![1, 99]);
        assert_eq!(objects.get(OUTPUT).unwrap(), None);
    }

    #[test]
    fn processed_records_without_an_output_are_loaded() {
        let (context, objects) = context(&[1, 2]);
        let worker = Doubler::new(false);
        let response = execute_step_chain(&worker, &context);
        assert_eq!(response.processed_records, Some(2));
        assert_eq!(*worker.sink.lock().unwrap(), vec![2, 4]);
        assert_eq!(objects.get(OUTPUT).unwrap(), None);
    }

    #[test]
    fn save_failure_is_fatal_after_record_failure() {
        let (context, _) = context(&[0, -1]);
        let response = execute_step_chain(&Doubler::new(false), &context);
        assert_eq!(response.processed_records, None);
        let message = response.error_message.unwrap();
        assert!(message.contains("-- Error 1 --"));
        assert!(message.contains("cannot double -1"));
        assert!(message.contains("-- Error 2 --"));
        assert!(message.contains("zero cannot be loaded"));
    }

    #[test]
    fn max_records_bounds_each_invocation() {
        let (context, objects) = context(&[1, 2, 3, 4, 5]);
        let context = context.with_max_records(Some(2));
        let response = execute_step_chain(&Doubler::new(true), &context);
        assert_eq!(response.processed_records, Some(2));
        assert_eq!(response.unprocessed_records, Some(3));
        assert_eq!(read(&objects, INPUT), vec![3, 4, 5]);
    }
}
