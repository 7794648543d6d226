//! Domain events: the `Event` contract, the exported wire form and replay parsing.

pub mod deserializer;
pub mod error;
pub mod event;
pub mod exported;

pub use deserializer::{EventDeserializer, Rejection};
pub use error::{EventDeserializeError, EventError};
pub use event::{Event, ExportEvents};
pub use exported::ExportedEvent;
