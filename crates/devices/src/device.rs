use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use cpm_core::validation::{validate_name, validate_ods_code};
use cpm_core::{
    AggregateRoot, DeviceId, DomainError, DomainResult, EventLog, EventSourced, ProductId,
    ProductTeamId, Status, Timestamp, now,
};

use crate::event::{
    DeviceEvent, DeviceKeyAddedEvent, DeviceKeyDeletedEvent, DeviceTagAddedEvent,
    QuestionnaireResponseAddedEvent,
};
use crate::key::{DeviceKey, DeviceKeyType};
use crate::questionnaire::QuestionnaireResponse;
use crate::tag::DeviceTag;

/// How a device is assured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Product,
    Endpoint,
}

/// The persisted state of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub name: String,
    pub device_type: DeviceType,
    pub product_team_id: ProductTeamId,
    #[serde(default)]
    pub product_id: Option<ProductId>,
    pub ods_code: String,
    pub status: Status,
    pub created_on: Timestamp,
    #[serde(default)]
    pub updated_on: Option<Timestamp>,
    #[serde(default)]
    pub deleted_on: Option<Timestamp>,
    #[serde(default)]
    pub keys: Vec<DeviceKey>,
    #[serde(default)]
    pub tags: Vec<DeviceTag>,
    /// Responses grouped by questionnaire name, oldest first.
    #[serde(default)]
    pub questionnaire_responses: BTreeMap<String, Vec<QuestionnaireResponse>>,
}

/// Fields that may change through [`Device::update`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceUpdate {
    pub name: Option<String>,
    pub ods_code: Option<String>,
}

/// Aggregate root: Device.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    record: DeviceRecord,
    events: EventLog<DeviceEvent>,
}

impl Device {
    /// Create a new, active device and raise its creation event.
    pub fn create(
        id: DeviceId,
        name: impl Into<String>,
        device_type: DeviceType,
        product_team_id: ProductTeamId,
        product_id: Option<ProductId>,
        ods_code: impl Into<String>,
    ) -> DomainResult<Self> {
        let name = name.into();
        let ods_code = ods_code.into();
        validate_name("name", &name)?;
        validate_ods_code(&ods_code)?;

        let record = DeviceRecord {
            id,
            name,
            device_type,
            product_team_id,
            product_id,
            ods_code,
            status: Status::Active,
            created_on: now(),
            updated_on: None,
            deleted_on: None,
            keys: Vec::new(),
            tags: Vec::new(),
            questionnaire_responses: BTreeMap::new(),
        };
        let mut device = Self {
            record: record.clone(),
            events: EventLog::new(),
        };
        device.add_event(DeviceEvent::Created(record));
        Ok(device)
    }

    /// Rehydrate from a stored snapshot. The result has no pending events.
    pub fn from_record(record: DeviceRecord) -> Self {
        Self {
            record,
            events: EventLog::new(),
        }
    }

    pub fn record(&self) -> &DeviceRecord {
        &self.record
    }

    pub fn into_record(self) -> DeviceRecord {
        self.record
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn device_type(&self) -> DeviceType {
        self.record.device_type
    }

    pub fn product_team_id(&self) -> ProductTeamId {
        self.record.product_team_id
    }

    pub fn status(&self) -> Status {
        self.record.status
    }

    pub fn keys(&self) -> &[DeviceKey] {
        &self.record.keys
    }

    pub fn tags(&self) -> &[DeviceTag] {
        &self.record.tags
    }

    pub fn is_active(&self) -> bool {
        self.record.status.is_active()
    }

    /// Returns the updated snapshot carried by the raised event.
    pub fn update(&mut self, update: DeviceUpdate) -> DomainResult<DeviceRecord> {
        self.ensure_active()?;
        let mut next = self.record.clone();
        if let Some(name) = update.name {
            validate_name("name", &name)?;
            next.name = name;
        }
        if let Some(ods_code) = update.ods_code {
            validate_ods_code(&ods_code)?;
            next.ods_code = ods_code;
        }
        next.updated_on = Some(now());
        self.raise(DeviceEvent::Updated(next.clone()))?;
        Ok(next)
    }

    /// Soft delete: the device stays in the model with status `inactive`.
    pub fn delete(&mut self) -> DomainResult<()> {
        self.ensure_active()?;
        let deleted_on = now();
        let mut next = self.record.clone();
        next.status = Status::Inactive;
        next.updated_on = Some(deleted_on);
        next.deleted_on = Some(deleted_on);
        self.raise(DeviceEvent::Deleted(next))
    }

    pub fn add_key(&mut self, key_type: DeviceKeyType, key_value: &str) -> DomainResult<DeviceKey> {
        self.ensure_active()?;
        let key = DeviceKey::new(key_type, key_value)?;
        if self.record.keys.contains(&key) {
            return Err(DomainError::duplicate(format!(
                "It is forbidden to supply duplicate keys: {key}"
            )));
        }
        let mut next = self.record.clone();
        next.keys.push(key.clone());
        next.updated_on = Some(now());
        self.raise(DeviceEvent::KeyAdded(DeviceKeyAddedEvent {
            new_key: key.clone(),
            device: next,
        }))?;
        Ok(key)
    }

    pub fn delete_key(&mut self, key_type: DeviceKeyType, key_value: &str) -> DomainResult<DeviceKey> {
        self.ensure_active()?;
        let key = DeviceKey::new(key_type, key_value)?;
        if !self.record.keys.contains(&key) {
            return Err(DomainError::not_found(format!(
                "This device does not contain key {key}"
            )));
        }
        let mut next = self.record.clone();
        next.keys.retain(|k| k != &key);
        next.updated_on = Some(now());
        self.raise(DeviceEvent::KeyDeleted(DeviceKeyDeletedEvent {
            deleted_key: key.clone(),
            device: next,
        }))?;
        Ok(key)
    }

    pub fn add_tag<I, F, V>(&mut self, components: I) -> DomainResult<DeviceTag>
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<String>,
    {
        self.ensure_active()?;
        let tag = DeviceTag::new(components)?;
        if self.record.tags.contains(&tag) {
            return Err(DomainError::duplicate(format!(
                "It is forbidden to supply duplicate tag: '{tag}'"
            )));
        }
        let mut next = self.record.clone();
        next.tags.push(tag.clone());
        next.updated_on = Some(now());
        self.raise(DeviceEvent::TagAdded(DeviceTagAddedEvent {
            new_tag: tag.clone(),
            device: next,
        }))?;
        Ok(tag)
    }

    pub fn add_questionnaire_response(
        &mut self,
        response: QuestionnaireResponse,
    ) -> DomainResult<QuestionnaireResponse> {
        self.ensure_active()?;
        let existing = self
            .record
            .questionnaire_responses
            .get(&response.questionnaire_name);
        if existing.is_some_and(|rs| rs.iter().any(|r| r.created_on == response.created_on)) {
            return Err(DomainError::duplicate(format!(
                "This device already contains a response created on {} for questionnaire '{}'",
                response.created_on, response.questionnaire_name
            )));
        }
        let mut next = self.record.clone();
        let responses = next
            .questionnaire_responses
            .entry(response.questionnaire_name.clone())
            .or_default();
        responses.push(response.clone());
        responses.sort_by_key(|r| r.created_on);
        next.updated_on = Some(now());
        self.raise(DeviceEvent::QuestionnaireResponseAdded(
            QuestionnaireResponseAddedEvent {
                questionnaire_response: response.clone(),
                device: next,
            },
        ))?;
        Ok(response)
    }

    fn ensure_active(&self) -> DomainResult<()> {
        if !self.is_active() {
            return Err(DomainError::invariant(format!(
                "device {} has been deleted",
                self.record.id
            )));
        }
        Ok(())
    }

    fn raise(&mut self, event: DeviceEvent) -> DomainResult<()> {
        self.apply(&event)?;
        self.add_event(event);
        Ok(())
    }
}

impl AggregateRoot for Device {
    type Id = DeviceId;
    type Event = DeviceEvent;

    fn id(&self) -> &Self::Id {
        &self.record.id
    }

    fn event_log(&self) -> &EventLog<DeviceEvent> {
        &self.events
    }

    fn event_log_mut(&mut self) -> &mut EventLog<DeviceEvent> {
        &mut self.events
    }
}

impl EventSourced for Device {
    fn from_creation(event: &DeviceEvent) -> DomainResult<Self> {
        match event {
            DeviceEvent::Created(record) => Ok(Self {
                record: record.clone(),
                events: EventLog::new(),
            }),
            other => Err(DomainError::invariant(format!(
                "device history must start with a creation event, found {other:?}"
            ))),
        }
    }

    fn apply(&mut self, event: &DeviceEvent) -> DomainResult<()> {
        if matches!(event, DeviceEvent::Created(_)) {
            return Err(DomainError::invariant("device has already been created"));
        }
        let snapshot = event.device();
        if snapshot.id != self.record.id {
            return Err(DomainError::invariant(format!(
                "event for device {} applied to device {}",
                snapshot.id, self.record.id
            )));
        }
        self.record = snapshot.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpm_events::{Event, ExportEvents, ExportedEvent};
    use serde_json::json;

    fn test_device() -> Device {
        Device::create(
            DeviceId::new(),
            "My Device",
            DeviceType::Product,
            ProductTeamId::new(),
            None,
            "AAA",
        )
        .unwrap()
    }

    fn parse(events: &[ExportedEvent]) -> Vec<DeviceEvent> {
        events.iter().map(|e| e.parse().unwrap()).collect()
    }

    #[test]
    fn create_device_raises_created_event() {
        let device = test_device();
        assert_eq!(device.events().len(), 1);
        match &device.events()[0] {
            DeviceEvent::Created(record) => {
                assert_eq!(record.name, "My Device");
                assert_eq!(record.status, Status::Active);
            }
            _ => panic!("Expected Created event"),
        }
    }

    #[test]
    fn create_device_rejects_bad_input() {
        let err = Device::create(
            DeviceId::new(),
            "  ",
            DeviceType::Product,
            ProductTeamId::new(),
            None,
            "AAA",
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn add_key_rejects_duplicates() {
        let mut device = test_device();
        device
            .add_key(DeviceKeyType::AccreditedSystemId, "AAA:123")
            .unwrap();
        let err = device
            .add_key(DeviceKeyType::AccreditedSystemId, "AAA:123")
            .unwrap_err();
        match err {
            DomainError::Duplicate(msg) => assert!(msg.contains("AAA:123")),
            _ => panic!("Expected Duplicate error"),
        }
        assert_eq!(device.keys().len(), 1);
    }

    #[test]
    fn delete_key_requires_existing_key() {
        let mut device = test_device();
        let err = device
            .delete_key(DeviceKeyType::AccreditedSystemId, "AAA:123")
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));

        device
            .add_key(DeviceKeyType::AccreditedSystemId, "AAA:123")
            .unwrap();
        device
            .delete_key(DeviceKeyType::AccreditedSystemId, "AAA:123")
            .unwrap();
        assert!(device.keys().is_empty());
    }

    #[test]
    fn add_tag_rejects_duplicates_regardless_of_order() {
        let mut device = test_device();
        device.add_tag([("a", "1"), ("b", "2")]).unwrap();
        let err = device.add_tag([("b", "2"), ("a", "1")]).unwrap_err();
        assert!(matches!(err, DomainError::Duplicate(_)));
    }

    #[test]
    fn update_returns_the_raised_snapshot() {
        let mut device = test_device();
        let updated = device
            .update(DeviceUpdate {
                name: Some("Renamed".into()),
                ods_code: Some("BBB".into()),
            })
            .unwrap();

        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.ods_code, "BBB");
        assert!(updated.updated_on.is_some());
        assert_eq!(&updated, device.record());
        match device.events().last() {
            Some(DeviceEvent::Updated(record)) => assert_eq!(record, &updated),
            _ => panic!("Expected Updated event"),
        }
    }

    #[test]
    fn questionnaire_responses_are_unique_per_creation_time() {
        let mut device = test_device();
        let answers = BTreeMap::from([("colour".to_owned(), json!("blue"))]);
        let created_on = now();
        let response = QuestionnaireResponse::new("spine_device", created_on, answers).unwrap();

        let added = device.add_questionnaire_response(response.clone()).unwrap();
        assert_eq!(added, response);
        let err = device.add_questionnaire_response(response).unwrap_err();
        assert!(matches!(err, DomainError::Duplicate(_)));
        assert_eq!(device.record().questionnaire_responses["spine_device"].len(), 1);
    }

    #[test]
    fn delete_is_soft_and_blocks_further_mutation() {
        let mut device = test_device();
        device.delete().unwrap();

        assert_eq!(device.status(), Status::Inactive);
        assert!(device.record().deleted_on.is_some());
        assert!(matches!(device.events().last(), Some(DeviceEvent::Deleted(_))));

        let err = device
            .add_key(DeviceKeyType::AccreditedSystemId, "AAA:123")
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        let err = device.delete().unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn exported_events_use_public_names() {
        let mut device = test_device();
        device
            .add_key(DeviceKeyType::AccreditedSystemId, "AAA:123")
            .unwrap();
        let names: Vec<_> = device.events().iter().map(Event::event_type).collect();
        assert_eq!(names, vec!["device_created_event", "device_key_added_event"]);

        let exported = device.export_events().unwrap();
        assert!(device.events().is_empty());
        let value = serde_json::to_value(&exported[1]).unwrap();
        assert_eq!(
            value["device_key_added_event"]["new_key"],
            json!({"key_type": "accredited_system_id", "key_value": "AAA:123"})
        );
    }

    #[test]
    fn replay_from_exported_events_matches_original() {
        let mut device = test_device();
        device
            .add_key(DeviceKeyType::AccreditedSystemId, "AAA:123")
            .unwrap();
        device.add_tag([("nhs_id_code", "AAA")]).unwrap();
        device
            .update(DeviceUpdate {
                name: Some("Renamed".into()),
                ..Default::default()
            })
            .unwrap();

        let exported = device.export_events().unwrap();
        let replayed = Device::replay(parse(&exported)).unwrap();
        assert_eq!(replayed, device);
    }

    #[test]
    fn apply_rejects_events_for_other_devices() {
        let mut device = test_device();
        let mut other = test_device();
        other.delete().unwrap();
        let foreign = other.events().last().unwrap().clone();
        let err = device.apply(&foreign).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            AddKey(u16),
            AddTag(u16),
            Rename(String),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u16..50).prop_map(Op::AddKey),
                (0u16..50).prop_map(Op::AddTag),
                "[A-Za-z][A-Za-z ]{0,20}".prop_map(Op::Rename),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig { cases: 200, .. ProptestConfig::default() })]

            #[test]
            fn replay_round_trips_any_history(ops in prop::collection::vec(op(), 0..20), delete in any::<bool>()) {
                let mut device = test_device();
                for op in ops {
                    // Duplicates are expected to be rejected; the rest must succeed.
                    let _ = match op {
                        Op::AddKey(n) => device
                            .add_key(DeviceKeyType::AccreditedSystemId, &format!("AAA:{n}"))
                            .map(|_| ()),
                        Op::AddTag(n) => device.add_tag([("n", n.to_string())]).map(|_| ()),
                        Op::Rename(name) => device
                            .update(DeviceUpdate { name: Some(name), ods_code: None })
                            .map(|_| ()),
                    };
                }
                if delete {
                    device.delete().unwrap();
                }

                let exported = device.export_events().unwrap();
                let json = serde_json::to_string(&exported).unwrap();
                let restored: Vec<ExportedEvent> = serde_json::from_str(&json).unwrap();
                let replayed = Device::replay(parse(&restored)).unwrap();
                prop_assert_eq!(replayed, device);
            }
        }
    }
}
