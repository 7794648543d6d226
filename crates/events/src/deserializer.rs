//! Priority-ordered event parsing.
//!
//! A deserializer holds an ordered list of named parsers. Each exported event is
//! offered to the parsers in registration order and the first success wins. When
//! every parser rejects the event, the error lists all of their reasons.

use serde::de::DeserializeOwned;

use crate::error::EventDeserializeError;
use crate::exported::ExportedEvent;

type ParseFn<T> = Box<dyn Fn(&ExportedEvent) -> Result<T, String> + Send + Sync>;

/// One parser's reason for rejecting an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub parser: String,
    pub reason: String,
}

pub struct EventDeserializer<T> {
    parsers: Vec<(String, ParseFn<T>)>,
}

impl<T> Default for EventDeserializer<T> {
    fn default() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }
}

impl<T> core::fmt::Debug for EventDeserializer<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventDeserializer")
            .field(
                "parsers",
                &self.parsers.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<T: 'static> EventDeserializer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parser with an arbitrary function. Later registrations have lower priority.
    pub fn with_parser<F>(mut self, name: impl Into<String>, parse: F) -> Self
    where
        F: Fn(&ExportedEvent) -> Result<T, String> + Send + Sync + 'static,
    {
        self.parsers.push((name.into(), Box::new(parse)));
        self
    }

    /// Register a parser that deserializes into `E` and converts into `T`.
    pub fn with_type<E>(self, name: impl Into<String>) -> Self
    where
        E: DeserializeOwned + Into<T> + 'static,
    {
        self.with_parser(name, |event: &ExportedEvent| {
            event
                .parse::<E>()
                .map(Into::into)
                .map_err(|e| e.to_string())
        })
    }

    pub fn parser_names(&self) -> impl Iterator<Item = &str> {
        self.parsers.iter().map(|(name, _)| name.as_str())
    }

    pub fn deserialize(&self, event: &ExportedEvent) -> Result<T, EventDeserializeError> {
        let mut rejections = Vec::with_capacity(self.parsers.len());
        for (name, parse) in &self.parsers {
            match parse(event) {
                Ok(parsed) => return Ok(parsed),
                Err(reason) => {
                    tracing::debug!(parser = %name, event = %event.name(), %reason, "parser rejected event");
                    rejections.push(Rejection {
                        parser: name.clone(),
                        reason,
                    });
                }
            }
        }
        Err(EventDeserializeError {
            event_name: event.name().to_owned(),
            rejections,
        })
    }

    /// Deserialize an ordered stream, stopping at the first event no parser accepts.
    pub fn deserialize_all<'a, I>(&self, events: I) -> Result<Vec<T>, EventDeserializeError>
    where
        I: IntoIterator<Item = &'a ExportedEvent>,
    {
        events.into_iter().map(|e| self.deserialize(e)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    enum Apple {
        #[serde(rename = "fruit_event")]
        Fruit { colour: String },
    }

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    enum Pear {
        #[serde(rename = "fruit_event")]
        Fruit { colour: String, shape: String },
    }

    #[derive(Debug, PartialEq)]
    enum Parsed {
        Apple(Apple),
        Pear(Pear),
    }

    impl From<Apple> for Parsed {
        fn from(value: Apple) -> Self {
            Parsed::Apple(value)
        }
    }

    impl From<Pear> for Parsed {
        fn from(value: Pear) -> Self {
            Parsed::Pear(value)
        }
    }

    fn exported(value: serde_json::Value) -> ExportedEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn first_successful_parser_wins() {
        let deserializer = EventDeserializer::<Parsed>::new()
            .with_type::<Pear>("pear")
            .with_type::<Apple>("apple");

        // Both parsers would accept this; the higher-priority one is used.
        let event = exported(json!({"fruit_event": {"colour": "green", "shape": "pear"}}));
        assert!(matches!(deserializer.deserialize(&event).unwrap(), Parsed::Pear(_)));

        // Pear rejects (no shape) so Apple gets it.
        let event = exported(json!({"fruit_event": {"colour": "red"}}));
        assert!(matches!(deserializer.deserialize(&event).unwrap(), Parsed::Apple(_)));
    }

    #[test]
    fn all_rejections_are_reported() {
        let deserializer = EventDeserializer::<Parsed>::new()
            .with_type::<Pear>("pear")
            .with_type::<Apple>("apple");

        let event = exported(json!({"vegetable_event": {}}));
        let err = deserializer.deserialize(&event).unwrap_err();

        assert_eq!(err.event_name, "vegetable_event");
        let parsers: Vec<_> = err.rejections.iter().map(|r| r.parser.as_str()).collect();
        assert_eq!(parsers, vec!["pear", "apple"]);
        let message = err.to_string();
        assert!(message.contains("[pear]"));
        assert!(message.contains("[apple]"));
    }

    #[test]
    fn empty_deserializer_rejects_everything() {
        let deserializer = EventDeserializer::<Parsed>::new();
        let err = deserializer
            .deserialize(&exported(json!({"fruit_event": {"colour": "red"}})))
            .unwrap_err();
        assert!(err.rejections.is_empty());
        assert!(err.to_string().contains("no parsers registered"));
    }
}
