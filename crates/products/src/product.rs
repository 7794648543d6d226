use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cpm_core::validation::{validate_name, validate_ods_code};
use cpm_core::{
    AggregateRoot, DeviceId, DomainError, DomainResult, EventLog, EventSourced, ProductId,
    ProductTeamId, Status, Timestamp, now,
};
use cpm_devices::{Device, DeviceType};
use cpm_events::Event;

use crate::keys::{ProductKey, ProductKeyType};

/// The persisted state of a CPM product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpmProductRecord {
    pub id: ProductId,
    pub product_team_id: ProductTeamId,
    pub name: String,
    pub ods_code: String,
    pub status: Status,
    pub created_on: Timestamp,
    #[serde(default)]
    pub updated_on: Option<Timestamp>,
    #[serde(default)]
    pub deleted_on: Option<Timestamp>,
    #[serde(default)]
    pub keys: Vec<ProductKey>,
}

/// Event: a party key was added to a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpmProductKeyAddedEvent {
    pub new_key: ProductKey,
    #[serde(flatten)]
    pub product: CpmProductRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpmProductEvent {
    #[serde(rename = "cpm_product_created_event")]
    Created(CpmProductRecord),
    #[serde(rename = "cpm_product_key_added_event")]
    KeyAdded(CpmProductKeyAddedEvent),
    #[serde(rename = "cpm_product_deleted_event")]
    Deleted(CpmProductRecord),
}

impl CpmProductEvent {
    pub fn product(&self) -> &CpmProductRecord {
        match self {
            CpmProductEvent::Created(p) | CpmProductEvent::Deleted(p) => p,
            CpmProductEvent::KeyAdded(e) => &e.product,
        }
    }
}

impl Event for CpmProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CpmProductEvent::Created(_) => "cpm_product_created_event",
            CpmProductEvent::KeyAdded(_) => "cpm_product_key_added_event",
            CpmProductEvent::Deleted(_) => "cpm_product_deleted_event",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        let product = self.product();
        product.updated_on.unwrap_or(product.created_on)
    }
}

/// Aggregate root: CpmProduct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpmProduct {
    record: CpmProductRecord,
    events: EventLog<CpmProductEvent>,
}

impl CpmProduct {
    /// Create a product for a team. Usually reached through [`crate::ProductTeam::create_cpm_product`].
    pub fn create(
        id: ProductId,
        product_team_id: ProductTeamId,
        name: impl Into<String>,
        ods_code: impl Into<String>,
    ) -> DomainResult<Self> {
        let name = name.into();
        let ods_code = ods_code.into();
        validate_name("name", &name)?;
        validate_ods_code(&ods_code)?;

        let record = CpmProductRecord {
            id,
            product_team_id,
            name,
            ods_code,
            status: Status::Active,
            created_on: now(),
            updated_on: None,
            deleted_on: None,
            keys: Vec::new(),
        };
        let mut product = Self {
            record: record.clone(),
            events: EventLog::new(),
        };
        product.add_event(CpmProductEvent::Created(record));
        Ok(product)
    }

    /// Rehydrate from a stored snapshot. The result has no pending events.
    pub fn from_record(record: CpmProductRecord) -> Self {
        Self {
            record,
            events: EventLog::new(),
        }
    }

    pub fn record(&self) -> &CpmProductRecord {
        &self.record
    }

    pub fn into_record(self) -> CpmProductRecord {
        self.record
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn product_team_id(&self) -> ProductTeamId {
        self.record.product_team_id
    }

    pub fn status(&self) -> Status {
        self.record.status
    }

    pub fn keys(&self) -> &[ProductKey] {
        &self.record.keys
    }

    pub fn add_key(&mut self, key_type: ProductKeyType, key_value: &str) -> DomainResult<ProductKey> {
        self.ensure_active()?;
        let key = ProductKey::new(key_type, key_value)?;
        if self.record.keys.contains(&key) {
            return Err(DomainError::duplicate(format!(
                "It is forbidden to supply duplicate keys: {key}"
            )));
        }
        let mut next = self.record.clone();
        next.keys.push(key.clone());
        next.updated_on = Some(now());
        self.raise(CpmProductEvent::KeyAdded(CpmProductKeyAddedEvent {
            new_key: key.clone(),
            product: next,
        }))?;
        Ok(key)
    }

    /// Soft delete: the product stays in the model with status `inactive`.
    pub fn delete(&mut self) -> DomainResult<()> {
        self.ensure_active()?;
        let deleted_on = now();
        let mut next = self.record.clone();
        next.status = Status::Inactive;
        next.updated_on = Some(deleted_on);
        next.deleted_on = Some(deleted_on);
        self.raise(CpmProductEvent::Deleted(next))
    }

    /// Register a `product` device for this product. The creation event is raised on the device.
    pub fn create_device(&self, name: impl Into<String>) -> DomainResult<Device> {
        self.ensure_active()?;
        Device::create(
            DeviceId::new(),
            name,
            DeviceType::Product,
            self.record.product_team_id,
            Some(self.record.id.clone()),
            self.record.ods_code.clone(),
        )
    }

    fn ensure_active(&self) -> DomainResult<()> {
        if !self.record.status.is_active() {
            return Err(DomainError::invariant(format!(
                "product {} has been deleted",
                self.record.id
            )));
        }
        Ok(())
    }

    fn raise(&mut self, event: CpmProductEvent) -> DomainResult<()> {
        self.apply(&event)?;
        self.add_event(event);
        Ok(())
    }
}

impl AggregateRoot for CpmProduct {
    type Id = ProductId;
    type Event = CpmProductEvent;

    fn id(&self) -> &Self::Id {
        &self.record.id
    }

    fn event_log(&self) -> &EventLog<CpmProductEvent> {
        &self.events
    }

    fn event_log_mut(&mut self) -> &mut EventLog<CpmProductEvent> {
        &mut self.events
    }
}

impl EventSourced for CpmProduct {
    fn from_creation(event: &CpmProductEvent) -> DomainResult<Self> {
        match event {
            CpmProductEvent::Created(record) => Ok(Self {
                record: record.clone(),
                events: EventLog::new(),
            }),
            _ => Err(DomainError::invariant(
                "product history must start with a creation event",
            )),
        }
    }

    fn apply(&mut self, event: &CpmProductEvent) -> DomainResult<()> {
        if matches!(event, CpmProductEvent::Created(_)) {
            return Err(DomainError::invariant("product has already been created"));
        }
        let snapshot = event.product();
        if snapshot.id != self.record.id {
            return Err(DomainError::invariant(format!(
                "event for product {} applied to product {}",
                snapshot.id, self.record.id
            )));
        }
        self.record = snapshot.clone();
        Ok(())
    }
}
