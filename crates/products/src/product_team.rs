use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cpm_core::validation::{validate_name, validate_ods_code};
use cpm_core::{
    AggregateRoot, DeviceId, DomainError, DomainResult, EventLog, EventSourced, ProductId,
    ProductTeamId, Status, Timestamp, now,
};
use cpm_devices::{Device, DeviceType};
use cpm_events::Event;

use crate::keys::ProductTeamKey;
use crate::product::CpmProduct;

/// The persisted state of a product team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductTeamRecord {
    pub id: ProductTeamId,
    pub name: String,
    pub ods_code: String,
    pub status: Status,
    pub created_on: Timestamp,
    #[serde(default)]
    pub updated_on: Option<Timestamp>,
    #[serde(default)]
    pub deleted_on: Option<Timestamp>,
    #[serde(default)]
    pub keys: Vec<ProductTeamKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductTeamEvent {
    #[serde(rename = "product_team_created_event")]
    Created(ProductTeamRecord),
    #[serde(rename = "product_team_deleted_event")]
    Deleted(ProductTeamRecord),
}

impl ProductTeamEvent {
    pub fn product_team(&self) -> &ProductTeamRecord {
        match self {
            ProductTeamEvent::Created(t) | ProductTeamEvent::Deleted(t) => t,
        }
    }
}

impl Event for ProductTeamEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductTeamEvent::Created(_) => "product_team_created_event",
            ProductTeamEvent::Deleted(_) => "product_team_deleted_event",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        let team = self.product_team();
        team.updated_on.unwrap_or(team.created_on)
    }
}

/// Aggregate root: ProductTeam.
///
/// A product team owns products and devices. Teams are derived from ODS
/// organisations, but one organisation may have several teams, so `ods_code`
/// is not unique amongst teams. Team keys are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductTeam {
    record: ProductTeamRecord,
    events: EventLog<ProductTeamEvent>,
}

impl ProductTeam {
    pub fn create(
        id: ProductTeamId,
        name: impl Into<String>,
        ods_code: impl Into<String>,
        keys: Vec<ProductTeamKey>,
    ) -> DomainResult<Self> {
        let name = name.into();
        let ods_code = ods_code.into();
        validate_name("name", &name)?;
        validate_ods_code(&ods_code)?;

        let mut seen = BTreeSet::new();
        if let Some(duplicate) = keys.iter().find(|k| !seen.insert(*k)) {
            return Err(DomainError::duplicate(format!(
                "It is forbidden to supply duplicate keys: {duplicate}"
            )));
        }

        let record = ProductTeamRecord {
            id,
            name,
            ods_code,
            status: Status::Active,
            created_on: now(),
            updated_on: None,
            deleted_on: None,
            keys,
        };
        let mut team = Self {
            record: record.clone(),
            events: EventLog::new(),
        };
        team.add_event(ProductTeamEvent::Created(record));
        Ok(team)
    }

    /// Rehydrate from a stored snapshot. The result has no pending events.
    pub fn from_record(record: ProductTeamRecord) -> Self {
        Self {
            record,
            events: EventLog::new(),
        }
    }

    pub fn record(&self) -> &ProductTeamRecord {
        &self.record
    }

    pub fn into_record(self) -> ProductTeamRecord {
        self.record
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn ods_code(&self) -> &str {
        &self.record.ods_code
    }

    pub fn status(&self) -> Status {
        self.record.status
    }

    pub fn keys(&self) -> &[ProductTeamKey] {
        &self.record.keys
    }

    /// Create a product owned by this team. The creation event is raised on the product.
    pub fn create_cpm_product(&self, product_id: ProductId, name: impl Into<String>) -> DomainResult<CpmProduct> {
        self.ensure_active()?;
        CpmProduct::create(product_id, self.record.id, name, self.record.ods_code.clone())
    }

    /// Create a device owned by this team. The creation event is raised on the device.
    pub fn create_device(&self, name: impl Into<String>, device_type: DeviceType) -> DomainResult<Device> {
        self.create_device_with_id(DeviceId::new(), name, device_type)
    }

    pub fn create_device_with_id(
        &self,
        id: DeviceId,
        name: impl Into<String>,
        device_type: DeviceType,
    ) -> DomainResult<Device> {
        self.ensure_active()?;
        Device::create(
            id,
            name,
            device_type,
            self.record.id,
            None,
            self.record.ods_code.clone(),
        )
    }

    /// Soft delete. Key aliases are released once the deletion is persisted.
    pub fn delete(&mut self) -> DomainResult<()> {
        self.ensure_active()?;
        let deleted_on = now();
        let mut next = self.record.clone();
        next.status = Status::Inactive;
        next.updated_on = Some(deleted_on);
        next.deleted_on = Some(deleted_on);
        let event = ProductTeamEvent::Deleted(next);
        self.apply(&event)?;
        self.add_event(event);
        Ok(())
    }

    fn ensure_active(&self) -> DomainResult<()> {
        if !self.record.status.is_active() {
            return Err(DomainError::invariant(format!(
                "product team {} has been deleted",
                self.record.id
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for ProductTeam {
    type Id = ProductTeamId;
    type Event = ProductTeamEvent;

    fn id(&self) -> &Self::Id {
        &self.record.id
    }

    fn event_log(&self) -> &EventLog<ProductTeamEvent> {
        &self.events
    }

    fn event_log_mut(&mut self) -> &mut EventLog<ProductTeamEvent> {
        &mut self.events
    }
}

impl EventSourced for ProductTeam {
    fn from_creation(event: &ProductTeamEvent) -> DomainResult<Self> {
        match event {
            ProductTeamEvent::Created(record) => Ok(Self {
                record: record.clone(),
                events: EventLog::new(),
            }),
            ProductTeamEvent::Deleted(_) => Err(DomainError::invariant(
                "product team history must start with a creation event",
            )),
        }
    }

    fn apply(&mut self, event: &ProductTeamEvent) -> DomainResult<()> {
        match event {
            ProductTeamEvent::Created(_) => {
                Err(DomainError::invariant("product team has already been created"))
            }
            ProductTeamEvent::Deleted(record) => {
                if record.id != self.record.id {
                    return Err(DomainError::invariant("event belongs to another product team"));
                }
                self.record = record.clone();
                Ok(())
            }
        }
    }
}
