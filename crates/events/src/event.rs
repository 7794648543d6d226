use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use cpm_core::AggregateRoot;

use crate::error::EventError;
use crate::exported::ExportedEvent;

/// A domain event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **closed**: each aggregate raises a fixed enum of variants
/// - **self-describing**: every variant has a stable public name, which is also
///   its key in the exported `{"<name>": {payload}}` form
pub trait Event: Clone + core::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable public event name (e.g. "device_key_added_event").
    fn event_type(&self) -> &'static str;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Convert into the exported wire form.
    fn export(&self) -> Result<ExportedEvent, EventError> {
        let exported = ExportedEvent::from_event(self)?;
        if exported.name() != self.event_type() {
            return Err(EventError::MismatchedName {
                expected: self.event_type().to_owned(),
                actual: exported.name().to_owned(),
            });
        }
        Ok(exported)
    }
}

/// Export-and-drain for any aggregate whose events implement [`Event`].
pub trait ExportEvents: AggregateRoot
where
    Self::Event: Event,
{
    /// Export all pending events in order, then empty the log.
    ///
    /// The log is only drained if every event exported successfully.
    fn export_events(&mut self) -> Result<Vec<ExportedEvent>, EventError> {
        let exported = self
            .events()
            .iter()
            .map(Event::export)
            .collect::<Result<Vec<_>, _>>()?;
        self.clear_events();
        Ok(exported)
    }
}

impl<A> ExportEvents for A
where
    A: AggregateRoot,
    A::Event: Event,
{
}
