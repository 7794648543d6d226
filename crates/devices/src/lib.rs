//! Devices: product and endpoint registrations owned by a product team.

pub mod device;
pub mod event;
pub mod key;
pub mod questionnaire;
pub mod tag;

pub use device::{Device, DeviceRecord, DeviceType, DeviceUpdate};
pub use event::{
    DeviceEvent, DeviceKeyAddedEvent, DeviceKeyDeletedEvent, DeviceTagAddedEvent,
    QuestionnaireResponseAddedEvent,
};
pub use key::{DeviceKey, DeviceKeyType};
pub use questionnaire::QuestionnaireResponse;
pub use tag::DeviceTag;
