use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cpm_events::Event;

use crate::device::DeviceRecord;
use crate::key::DeviceKey;
use crate::questionnaire::QuestionnaireResponse;
use crate::tag::DeviceTag;

/// Event: a key was added. Carries the device as it is after the change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceKeyAddedEvent {
    pub new_key: DeviceKey,
    #[serde(flatten)]
    pub device: DeviceRecord,
}

/// Event: a key was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceKeyDeletedEvent {
    pub deleted_key: DeviceKey,
    #[serde(flatten)]
    pub device: DeviceRecord,
}

/// Event: a searchable tag was attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceTagAddedEvent {
    pub new_tag: DeviceTag,
    #[serde(flatten)]
    pub device: DeviceRecord,
}

/// Event: a questionnaire response was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionnaireResponseAddedEvent {
    pub questionnaire_response: QuestionnaireResponse,
    #[serde(flatten)]
    pub device: DeviceRecord,
}

/// Every event a [`crate::Device`] can raise.
///
/// Each variant carries a full snapshot of the device after the transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceEvent {
    #[serde(rename = "device_created_event")]
    Created(DeviceRecord),
    #[serde(rename = "device_updated_event")]
    Updated(DeviceRecord),
    #[serde(rename = "device_deleted_event")]
    Deleted(DeviceRecord),
    #[serde(rename = "device_key_added_event")]
    KeyAdded(DeviceKeyAddedEvent),
    #[serde(rename = "device_key_deleted_event")]
    KeyDeleted(DeviceKeyDeletedEvent),
    #[serde(rename = "device_tag_added_event")]
    TagAdded(DeviceTagAddedEvent),
    #[serde(rename = "questionnaire_response_added_event")]
    QuestionnaireResponseAdded(QuestionnaireResponseAddedEvent),
}

impl DeviceEvent {
    /// The device snapshot carried by this event.
    pub fn device(&self) -> &DeviceRecord {
        match self {
            DeviceEvent::Created(d) | DeviceEvent::Updated(d) | DeviceEvent::Deleted(d) => d,
            DeviceEvent::KeyAdded(e) => &e.device,
            DeviceEvent::KeyDeleted(e) => &e.device,
            DeviceEvent::TagAdded(e) => &e.device,
            DeviceEvent::QuestionnaireResponseAdded(e) => &e.device,
        }
    }
}

impl Event for DeviceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DeviceEvent::Created(_) => "device_created_event",
            DeviceEvent::Updated(_) => "device_updated_event",
            DeviceEvent::Deleted(_) => "device_deleted_event",
            DeviceEvent::KeyAdded(_) => "device_key_added_event",
            DeviceEvent::KeyDeleted(_) => "device_key_deleted_event",
            DeviceEvent::TagAdded(_) => "device_tag_added_event",
            DeviceEvent::QuestionnaireResponseAdded(_) => "questionnaire_response_added_event",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        let device = self.device();
        device.updated_on.unwrap_or(device.created_on)
    }
}
