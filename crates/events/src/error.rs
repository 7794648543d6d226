use thiserror::Error;

use crate::deserializer::Rejection;

/// Failure to convert an event to or from its exported form.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Exported events are single-entry maps; anything else is malformed.
    #[error("exported event must have exactly one entry, found {0}")]
    Malformed(usize),

    #[error("event exported as '{actual}' but declares type '{expected}'")]
    MismatchedName { expected: String, actual: String },
}

/// No registered parser accepted an exported event.
///
/// Carries the reason given by every parser, in the order they were tried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not deserialize event '{event_name}': {}", render_rejections(.rejections))]
pub struct EventDeserializeError {
    pub event_name: String,
    pub rejections: Vec<Rejection>,
}

fn render_rejections(rejections: &[Rejection]) -> String {
    if rejections.is_empty() {
        return "no parsers registered".to_owned();
    }
    rejections
        .iter()
        .map(|r| format!("[{}] {}", r.parser, r.reason))
        .collect::<Vec<_>>()
        .join("; ")
}
