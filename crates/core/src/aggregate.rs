//! Aggregate roots and the ordered log of events they raise.

use crate::error::{DomainError, DomainResult};

/// Ordered, append-only list of events raised since the last drain.
///
/// Events are never reordered or edited once pushed; the only way to remove
/// them is to drain the whole log (after they have been persisted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLog<E> {
    events: Vec<E>,
}

impl<E> Default for EventLog<E> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<E> EventLog<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: E) -> &E {
        self.events.push(event);
        let last = self.events.len() - 1;
        &self.events[last]
    }

    pub fn as_slice(&self) -> &[E] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Return every pending event and leave the log empty.
    pub fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// An entity that owns the authoritative event log for a cluster of data.
///
/// Mutating operations on an aggregate never touch storage: they validate,
/// evolve in-memory state and append an event describing what happened.
/// Persisting those events is the job of a repository.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Closed set of events this aggregate can raise.
    type Event: Clone + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    fn event_log(&self) -> &EventLog<Self::Event>;

    fn event_log_mut(&mut self) -> &mut EventLog<Self::Event>;

    /// Append an event to the pending log.
    fn add_event(&mut self, event: Self::Event) -> &Self::Event {
        self.event_log_mut().push(event)
    }

    /// Pending events, in the order they were raised.
    fn events(&self) -> &[Self::Event] {
        self.event_log().as_slice()
    }

    fn clear_events(&mut self) {
        self.event_log_mut().clear();
    }

    /// Drain the pending events (returns them and empties the log).
    fn take_events(&mut self) -> Vec<Self::Event> {
        self.event_log_mut().drain()
    }
}

/// Aggregates whose state can be rebuilt purely from their own events.
pub trait EventSourced: AggregateRoot + Sized {
    /// Build the aggregate from the event that created it.
    fn from_creation(event: &Self::Event) -> DomainResult<Self>;

    /// Evolve state from a single (non-creation) event.
    fn apply(&mut self, event: &Self::Event) -> DomainResult<()>;

    /// Replay an ordered event stream. The rebuilt aggregate has no pending events.
    fn replay<I>(events: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = Self::Event>,
    {
        let mut events = events.into_iter();
        let first = events
            .next()
            .ok_or_else(|| DomainError::invariant("cannot replay an empty event stream"))?;
        let mut aggregate = Self::from_creation(&first)?;
        for event in events {
            aggregate.apply(&event)?;
        }
        aggregate.clear_events();
        Ok(aggregate)
    }
}
