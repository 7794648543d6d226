//! Ordered step execution with errors captured as values.
//!
//! A [`StepChain`] runs named steps in order. Every step sees:
//!
//! - a read-only [`StepData`]: the chain's initial input plus the result of every
//!   step that already ran, keyed by step name
//! - a shared mutable context `C` carrying injected dependencies (store clients,
//!   configuration, ...)
//!
//! ```text
//! init ─▶ step 1 ─▶ step 2 ─▶ ... ─▶ step n ─▶ StepChainRun { data, outcome }
//!            │         │
//!            └─ Err ───┴──────────────────────▶ StepChainRun { data, Err(e) }
//! ```
//!
//! The first failing step stops the chain and its error becomes the run's terminal
//! outcome; later steps never execute. Callers branch on the outcome instead of
//! unwinding, which is what lets response rendering and the ETL save chain run
//! after a failed action chain.
//!
//! Cross-cutting concerns wrap each step through a [`StepDecorator`]. Decorators
//! see the step name and its outcome but cannot change the contract above.

use std::any::Any;
use std::collections::HashMap;

use thiserror::Error;

type StepFn<C> = Box<dyn Fn(&StepData, &mut C) -> anyhow::Result<Box<dyn Any>>>;

/// Reserved slot for the chain's initial input.
const INIT: &str = "__init__";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepChainError {
    #[error("a step chain needs at least one step")]
    Empty,

    #[error("duplicate step name '{0}'")]
    DuplicateStep(String),

    #[error("step '{step}' did not produce a {expected}")]
    UnexpectedType { step: String, expected: &'static str },
}

/// One named unit of work.
pub struct Step<C> {
    name: String,
    run: StepFn<C>,
}

impl<C> Step<C> {
    pub fn new<T, F>(name: impl Into<String>, run: F) -> Self
    where
        T: Any,
        F: Fn(&StepData, &mut C) -> anyhow::Result<T> + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(move |data, context| {
                run(data, context).map(|value| Box::new(value) as Box<dyn Any>)
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<C> core::fmt::Debug for Step<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish()
    }
}

/// Results accumulated by a run so far.
#[derive(Default)]
pub struct StepData {
    values: HashMap<String, Box<dyn Any>>,
    order: Vec<String>,
}

impl StepData {
    fn with_init<I: Any>(init: I) -> Self {
        let mut data = Self::default();
        data.values.insert(INIT.to_owned(), Box::new(init));
        data
    }

    /// The chain's initial input, if it is a `T`.
    pub fn init<T: Any>(&self) -> Option<&T> {
        self.values.get(INIT).and_then(|value| value.downcast_ref())
    }

    /// The result of an earlier step, if it ran and produced a `T`.
    pub fn get<T: Any>(&self, step: &str) -> Option<&T> {
        self.values.get(step).and_then(|value| value.downcast_ref())
    }

    /// Like [`StepData::get`], but a missing or mistyped result is an error.
    pub fn require<T: Any>(&self, step: &str) -> Result<&T, StepChainError> {
        self.get(step).ok_or_else(|| StepChainError::UnexpectedType {
            step: step.to_owned(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Names of the steps that completed, in order.
    pub fn completed(&self) -> &[String] {
        &self.order
    }

    fn record(&mut self, step: &str, value: Box<dyn Any>) {
        self.order.push(step.to_owned());
        self.values.insert(step.to_owned(), value);
    }

    fn take(&mut self, step: &str) -> Option<Box<dyn Any>> {
        self.values.remove(step)
    }
}

impl core::fmt::Debug for StepData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StepData").field("completed", &self.order).finish()
    }
}

/// Wraps every step of a chain.
pub trait StepDecorator {
    fn around(
        &self,
        step: &str,
        run: &mut dyn FnMut() -> anyhow::Result<Box<dyn Any>>,
    ) -> anyhow::Result<Box<dyn Any>>;
}

/// Logs each step in its own span.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStep;

impl StepDecorator for LogStep {
    fn around(
        &self,
        step: &str,
        run: &mut dyn FnMut() -> anyhow::Result<Box<dyn Any>>,
    ) -> anyhow::Result<Box<dyn Any>> {
        let span = tracing::info_span!("step", step);
        let _entered = span.enter();
        tracing::debug!("step started");
        let outcome = run();
        match &outcome {
            Ok(_) => tracing::debug!("step succeeded"),
            Err(err) => tracing::warn!(error = %err, "step failed"),
        }
        outcome
    }
}

/// Outcome of one chain run.
#[derive(Debug)]
pub struct StepChainRun {
    data: StepData,
    outcome: Result<String, anyhow::Error>,
}

impl StepChainRun {
    pub fn data(&self) -> &StepData {
        &self.data
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        self.outcome.as_ref().err()
    }

    /// The terminal result: the last step's value, or the error that stopped the chain.
    ///
    /// `Ok(None)` means the chain succeeded but its last step did not produce a `T`.
    pub fn result<T: Any>(&self) -> Result<Option<&T>, &anyhow::Error> {
        match &self.outcome {
            Ok(last) => Ok(self.data.get(last)),
            Err(err) => Err(err),
        }
    }

    pub fn into_result<T: Any>(mut self) -> anyhow::Result<T> {
        let last = self.outcome?;
        let value = self.data.take(&last).and_then(|value| value.downcast().ok());
        match value {
            Some(value) => Ok(*value),
            None => Err(StepChainError::UnexpectedType {
                step: last,
                expected: std::any::type_name::<T>(),
            }
            .into()),
        }
    }
}

/// An ordered list of steps over a context `C`.
pub struct StepChain<C> {
    steps: Vec<Step<C>>,
    decorators: Vec<Box<dyn StepDecorator>>,
}

impl<C> StepChain<C> {
    pub fn new(steps: Vec<Step<C>>) -> Result<Self, StepChainError> {
        if steps.is_empty() {
            return Err(StepChainError::Empty);
        }
        let mut seen = std::collections::HashSet::new();
        for step in &steps {
            if step.name == INIT || !seen.insert(step.name.as_str()) {
                return Err(StepChainError::DuplicateStep(step.name.clone()));
            }
        }
        Ok(Self {
            steps,
            decorators: Vec::new(),
        })
    }

    /// Add a decorator. The first one added is the outermost.
    pub fn with_decorator(mut self, decorator: impl StepDecorator + 'static) -> Self {
        self.decorators.push(Box::new(decorator));
        self
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(Step::name)
    }

    pub fn run<I: Any>(&self, init: I, context: &mut C) -> StepChainRun {
        let mut data = StepData::with_init(init);
        for step in &self.steps {
            let outcome = self.run_step(step, &data, context);
            match outcome {
                Ok(value) => data.record(&step.name, value),
                Err(err) => {
                    return StepChainRun {
                        data,
                        outcome: Err(err),
                    };
                }
            }
        }
        let last = data.order.last().cloned().unwrap_or_default();
        StepChainRun {
            data,
            outcome: Ok(last),
        }
    }

    fn run_step(
        &self,
        step: &Step<C>,
        data: &StepData,
        context: &mut C,
    ) -> anyhow::Result<Box<dyn Any>> {
        let mut inner = || (step.run)(data, context);
        let mut run: Box<dyn FnMut() -> anyhow::Result<Box<dyn Any>> + '_> = Box::new(&mut inner);
        for decorator in self.decorators.iter().rev() {
            let name = step.name.as_str();
            let mut wrapped = run;
            run = Box::new(move || decorator.around(name, &mut *wrapped));
        }
        run()
    }
}

impl<C> core::fmt::Debug for StepChain<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StepChain")
            .field("steps", &self.steps)
            .field("decorators", &self.decorators.len())
            .finish()
    }
}
