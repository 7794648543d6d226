//! Cross-aggregate writes for the ETL load stage.
//!
//! The load stage receives a flat, ordered stream of exported events from
//! several aggregate types. Each event is parsed back into its aggregate's
//! event union and routed to that aggregate's transaction mapping, so rows land
//! exactly as they would through the per-aggregate repositories.

use std::sync::Arc;

use serde::Serialize;

use cpm_devices::DeviceEvent;
use cpm_events::{Event, EventDeserializer, EventError, ExportedEvent};
use cpm_products::{CpmProductEvent, ProductTeamEvent};

use crate::repository::{
    BatchedWriter, CpmProductRepository, DeviceRepository, ProductTeamRepository,
    RepositoryError, WriteResult,
};
use crate::store::{KeyValueStore, TransactItem};

/// Any event the CPM table knows how to store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CpmEvent {
    ProductTeam(ProductTeamEvent),
    Product(CpmProductEvent),
    Device(DeviceEvent),
}

impl CpmEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            CpmEvent::ProductTeam(event) => event.event_type(),
            CpmEvent::Product(event) => event.event_type(),
            CpmEvent::Device(event) => event.event_type(),
        }
    }

    pub fn export(&self) -> Result<ExportedEvent, EventError> {
        match self {
            CpmEvent::ProductTeam(event) => event.export(),
            CpmEvent::Product(event) => event.export(),
            CpmEvent::Device(event) => event.export(),
        }
    }

    pub fn transactions(&self) -> Result<Vec<TransactItem>, RepositoryError> {
        match self {
            CpmEvent::ProductTeam(event) => ProductTeamRepository::transactions(event),
            CpmEvent::Product(event) => CpmProductRepository::transactions(event),
            CpmEvent::Device(event) => DeviceRepository::transactions(event),
        }
    }
}

impl From<ProductTeamEvent> for CpmEvent {
    fn from(value: ProductTeamEvent) -> Self {
        CpmEvent::ProductTeam(value)
    }
}

impl From<CpmProductEvent> for CpmEvent {
    fn from(value: CpmProductEvent) -> Self {
        CpmEvent::Product(value)
    }
}

impl From<DeviceEvent> for CpmEvent {
    fn from(value: DeviceEvent) -> Self {
        CpmEvent::Device(value)
    }
}

/// Parses any exported CPM event, trying product team, product, then device events.
pub fn cpm_event_deserializer() -> EventDeserializer<CpmEvent> {
    EventDeserializer::new()
        .with_type::<ProductTeamEvent>("product_team")
        .with_type::<CpmProductEvent>("cpm_product")
        .with_type::<DeviceEvent>("device")
}

#[derive(Clone)]
pub struct EtlRepository {
    writer: BatchedWriter,
}

impl EtlRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            writer: BatchedWriter::new(store),
        }
    }

    pub fn with_writer(writer: BatchedWriter) -> Self {
        Self { writer }
    }

    /// Persist a mixed stream of events, in order.
    pub fn write(&self, events: &[CpmEvent]) -> Result<Vec<WriteResult>, RepositoryError> {
        let mut items = Vec::new();
        for event in events {
            items.extend(event.transactions()?);
        }
        tracing::debug!(events = events.len(), items = items.len(), "writing etl events");
        self.writer.write(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::DeviceRepository;
    use crate::store::InMemoryStore;
    use cpm_core::{AggregateRoot, ProductTeamId};
    use cpm_devices::{DeviceKeyType, DeviceType};
    use cpm_events::ExportEvents;
    use cpm_products::ProductTeam;

    #[test]
    fn deserializer_routes_each_event_to_its_aggregate() {
        let mut team = ProductTeam::create(ProductTeamId::new(), "Team", "AAA", Vec::new()).unwrap();
        let mut device = team.create_device("Device", DeviceType::Endpoint).unwrap();
        let exported: Vec<ExportedEvent> = team
            .export_events()
            .unwrap()
            .into_iter()
            .chain(device.export_events().unwrap())
            .collect();

        let parsed = cpm_event_deserializer().deserialize_all(&exported).unwrap();
        assert!(matches!(parsed[0], CpmEvent::ProductTeam(ProductTeamEvent::Created(_))));
        assert!(matches!(parsed[1], CpmEvent::Device(DeviceEvent::Created(_))));
        assert_eq!(parsed[1].export().unwrap(), exported[1]);
    }

    #[test]
    fn unknown_event_lists_every_rejection() {
        let event = ExportedEvent::new("no_such_event", serde_json::json!({}));
        let err = cpm_event_deserializer().deserialize(&event).unwrap_err();
        assert_eq!(err.rejections.len(), 3);
        assert_eq!(err.event_name, "no_such_event");
    }

    #[test]
    fn write_persists_mixed_streams_in_order() {
        let store = Arc::new(InMemoryStore::new());
        let repository = EtlRepository::new(store.clone());
        let team = ProductTeam::create(ProductTeamId::new(), "Team", "AAA", Vec::new()).unwrap();
        let mut device = team.create_device("Device", DeviceType::Endpoint).unwrap();
        device
            .add_key(DeviceKeyType::AccreditedSystemId, "AAA:1234")
            .unwrap();
        device.add_tag([("nhs_as_client", "AAA")]).unwrap();

        let mut events: Vec<CpmEvent> = team.events().iter().cloned().map(Into::into).collect();
        events.extend(device.events().iter().cloned().map(CpmEvent::from));
        repository.write(&events).unwrap();

        let stored = DeviceRepository::new(store).read(device.id()).unwrap();
        assert_eq!(stored.record(), device.record());
    }
}
