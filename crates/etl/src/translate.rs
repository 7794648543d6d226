//! SDS records to CPM devices.
//!
//! - A message handling system becomes one `endpoint` device keyed by its
//!   scoped party key.
//! - An accredited system becomes one `product` device per client
//!   organisation, keyed by `<client ods>:<unique identifier>`.
//!
//! Devices belong to the product team derived from their ODS code, so the same
//! organisation always lands in the same team. The first device of an
//! organisation is preceded by the creation of that team (see
//! [`ProductTeams`]). Each device carries its source record as a questionnaire
//! response and is tagged by the fields it can be searched on.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use cpm_core::{DeviceId, DomainError, ProductTeamId, now};
use cpm_devices::{Device, DeviceKeyType, DeviceType, QuestionnaireResponse};
use cpm_events::{EventError, ExportEvents, ExportedEvent};
use cpm_infra::repository::{ProductTeamRepository, RepositoryError};
use cpm_products::{ProductTeam, ProductTeamEvent, ProductTeamKey, ProductTeamKeyType};

use crate::sds::{NhsAccreditedSystem, NhsMhs, SdsRecord};

pub const SPINE_ENDPOINT_QUESTIONNAIRE: &str = "spine_endpoint";
pub const SPINE_DEVICE_QUESTIONNAIRE: &str = "spine_device";

const NHS_ID_CODE: &str = "nhs_id_code";
const NHS_MHS_SVC_IA: &str = "nhs_mhs_svc_ia";
const NHS_MHS_PARTY_KEY: &str = "nhs_mhs_party_key";
const NHS_AS_SVC_IA: &str = "nhs_as_svc_ia";
const NHS_AS_CLIENT: &str = "nhs_as_client";

const PRODUCT_TEAM_CREATED_EVENT: &str = "product_team_created_event";

/// Endpoints are searchable by any two or more of these.
const ENDPOINT_SEARCH_FIELDS: usize = 2;

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("record could not be captured as a questionnaire response: {0}")]
    Answers(#[source] serde_json::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("{name} at position {index} could not be read: {source}")]
    Unreadable {
        name: String,
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// The EPR product team of an organisation: `"<ods> (EPR)"`, keyed `EPR-<ods>`.
pub fn epr_product_team(ods_code: &str) -> Result<ProductTeam, TranslationError> {
    let key = ProductTeamKey::new(ProductTeamKeyType::EprId, format!("EPR-{ods_code}"))?;
    Ok(ProductTeam::create(
        ProductTeamId::from_ods_code(ods_code),
        format!("{ods_code} (EPR)"),
        ods_code,
        vec![key],
    )?)
}

/// Product teams that already exist or are already queued for loading.
///
/// A team counts as existing once its creation event has been emitted, once
/// it is seen in a pending batch ([`ProductTeams::remember`]) or once the
/// table holds it.
#[derive(Clone, Default)]
pub struct ProductTeams {
    repository: Option<ProductTeamRepository>,
    known: BTreeSet<ProductTeamId>,
}

impl ProductTeams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also consult the table before creating a team.
    pub fn with_repository(repository: ProductTeamRepository) -> Self {
        Self {
            repository: Some(repository),
            known: BTreeSet::new(),
        }
    }

    /// Record every team created in `events`.
    pub fn remember<'a, I>(&mut self, events: I) -> Result<(), TranslationError>
    where
        I: IntoIterator<Item = &'a ExportedEvent>,
    {
        for (index, exported) in events.into_iter().enumerate() {
            if exported.name() != PRODUCT_TEAM_CREATED_EVENT {
                continue;
            }
            let event = exported
                .parse::<ProductTeamEvent>()
                .map_err(|source| TranslationError::Unreadable {
                    name: exported.name().to_owned(),
                    index,
                    source,
                })?;
            self.known.insert(event.product_team().id);
        }
        Ok(())
    }

    pub fn contains(&self, id: &ProductTeamId) -> bool {
        self.known.contains(id)
    }

    fn exists(&self, id: &ProductTeamId) -> Result<bool, TranslationError> {
        if self.known.contains(id) {
            return Ok(true);
        }
        let Some(repository) = &self.repository else {
            return Ok(false);
        };
        match repository.read(id) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

/// Translate one record and export the events it produces: the creation of
/// any product team not yet in `teams`, then every device.
///
/// `teams` only learns about new teams when the whole record translates.
pub fn translate(
    record: &SdsRecord,
    teams: &mut ProductTeams,
) -> Result<Vec<ExportedEvent>, TranslationError> {
    let devices = match record {
        SdsRecord::MessageHandlingSystem(mhs) => vec![nhs_mhs_to_device(mhs)?],
        SdsRecord::AccreditedSystem(system) => nhs_accredited_system_to_devices(system)?,
    };

    let mut created = BTreeSet::new();
    let mut exported = Vec::new();
    for mut device in devices {
        let team_id = device.product_team_id();
        if !created.contains(&team_id) && !teams.exists(&team_id)? {
            let mut team = epr_product_team(&device.record().ods_code)?;
            exported.extend(team.export_events()?);
            created.insert(team_id);
        }
        exported.extend(device.export_events()?);
    }
    teams.known.extend(created);
    Ok(exported)
}

pub fn nhs_mhs_to_device(mhs: &NhsMhs) -> Result<Device, TranslationError> {
    let scoped_party_key = mhs.scoped_party_key();
    let name = mhs
        .nhs_product_name
        .clone()
        .unwrap_or_else(|| scoped_party_key.clone());
    let ods_code = mhs.nhs_id_code.trim();

    let mut device = Device::create(
        DeviceId::new(),
        name,
        DeviceType::Endpoint,
        ProductTeamId::from_ods_code(ods_code),
        None,
        ods_code,
    )?;
    device.add_key(DeviceKeyType::MessageHandlingSystemId, &scoped_party_key)?;
    device.add_questionnaire_response(QuestionnaireResponse::new(
        SPINE_ENDPOINT_QUESTIONNAIRE,
        now(),
        answers(mhs)?,
    )?)?;

    let fields = [
        (NHS_ID_CODE, mhs.nhs_id_code.trim()),
        (NHS_MHS_SVC_IA, mhs.nhs_mhs_svc_ia.trim()),
        (NHS_MHS_PARTY_KEY, mhs.nhs_mhs_party_key.trim()),
    ];
    for tag in combinations(&fields, ENDPOINT_SEARCH_FIELDS) {
        device.add_tag(tag)?;
    }
    Ok(device)
}

pub fn nhs_accredited_system_to_devices(
    system: &NhsAccreditedSystem,
) -> Result<Vec<Device>, TranslationError> {
    let name = system
        .nhs_product_name
        .clone()
        .unwrap_or_else(|| system.unique_identifier.clone());
    let mut answers = answers(system)?;

    let mut devices = Vec::new();
    for (ods_code, accredited_system_id) in system.accredited_system_ids() {
        answers.insert(
            NHS_AS_CLIENT.to_owned(),
            Value::Array(vec![Value::String(ods_code.clone())]),
        );
        let mut device = Device::create(
            DeviceId::new(),
            name.clone(),
            DeviceType::Product,
            ProductTeamId::from_ods_code(&ods_code),
            None,
            ods_code.as_str(),
        )?;
        device.add_key(DeviceKeyType::AccreditedSystemId, &accredited_system_id)?;
        device.add_questionnaire_response(QuestionnaireResponse::new(
            SPINE_DEVICE_QUESTIONNAIRE,
            now(),
            answers.clone(),
        )?)?;
        for svc_ia in &system.nhs_as_svc_ia {
            let id_code = system.nhs_id_code.as_str();
            device.add_tag([(NHS_ID_CODE, id_code), (NHS_AS_SVC_IA, svc_ia.as_str())])?;
            device.add_tag([
                (NHS_ID_CODE, id_code),
                (NHS_AS_SVC_IA, svc_ia.as_str()),
                (NHS_MHS_PARTY_KEY, system.nhs_mhs_party_key.as_str()),
            ])?;
        }
        devices.push(device);
    }
    Ok(devices)
}

fn answers<T: Serialize>(record: &T) -> Result<BTreeMap<String, Value>, TranslationError> {
    match serde_json::to_value(record).map_err(TranslationError::Answers)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(TranslationError::Domain(DomainError::invariant(format!(
            "expected record fields, got {other}"
        )))),
    }
}

/// Every subset of `fields` with at least `min` members, in field order.
fn combinations<'a>(fields: &[(&'a str, &'a str)], min: usize) -> Vec<Vec<(&'a str, &'a str)>> {
    let mut subsets: Vec<Vec<(&str, &str)>> = (1u32..(1 << fields.len()))
        .map(|mask| {
            fields
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, field)| *field)
                .collect::<Vec<_>>()
        })
        .filter(|subset| subset.len() >= min)
        .collect();
    subsets.sort_by_key(Vec::len);
    subsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sds::fixtures::{as_record, mhs_record};
    use cpm_core::AggregateRoot;
    use cpm_devices::DeviceEvent;

    fn parse(record: &crate::ldif::LdifRecord) -> SdsRecord {
        SdsRecord::from_ldif(record).unwrap()
    }

    #[test]
    fn message_handling_system_becomes_one_endpoint() {
        let SdsRecord::MessageHandlingSystem(mhs) =
            parse(&mhs_record("AAA", "AAA-123456", "urn:nhs:names:services:pds:QUPA_IN040000UK32"))
        else {
            panic!("Expected MessageHandlingSystem");
        };
        let device = nhs_mhs_to_device(&mhs).unwrap();

        assert_eq!(device.device_type(), DeviceType::Endpoint);
        assert_eq!(device.name(), "AAA:AAA-123456:urn:nhs:names:services:pds:QUPA_IN040000UK32");
        assert_eq!(device.product_team_id(), ProductTeamId::from_ods_code("AAA"));
        assert_eq!(device.keys().len(), 1);
        assert_eq!(device.tags().len(), 4);
        let responses = &device.record().questionnaire_responses[SPINE_ENDPOINT_QUESTIONNAIRE];
        assert_eq!(responses[0].answers["nhs_mhs_party_key"], "AAA-123456");
        assert!(!responses[0].answers.contains_key("dn"));
    }

    #[test]
    fn accredited_system_fans_out_per_client() {
        let record = parse(&as_record("200000000001", &["BBB", "CCC"], &["urn:one", "urn:two"]));
        let SdsRecord::AccreditedSystem(system) = &record else {
            panic!("Expected AccreditedSystem");
        };
        let devices = nhs_accredited_system_to_devices(system).unwrap();

        assert_eq!(devices.len(), 2);
        for (device, ods_code) in devices.iter().zip(["BBB", "CCC"]) {
            assert_eq!(device.device_type(), DeviceType::Product);
            assert_eq!(device.name(), "200000000001");
            assert_eq!(device.product_team_id(), ProductTeamId::from_ods_code(ods_code));
            assert_eq!(
                device.keys()[0].key_value(),
                format!("{ods_code}:200000000001")
            );
            assert_eq!(device.tags().len(), 4);
            let responses = &device.record().questionnaire_responses[SPINE_DEVICE_QUESTIONNAIRE];
            assert_eq!(responses[0].answers[NHS_AS_CLIENT], serde_json::json!([ods_code]));
        }
    }

    #[test]
    fn translation_exports_creation_first() {
        let mut teams = ProductTeams::new();
        let events = translate(&parse(&mhs_record("AAA", "AAA-1", "urn:one")), &mut teams).unwrap();
        assert_eq!(events[0].name(), PRODUCT_TEAM_CREATED_EVENT);
        assert_eq!(events[1].name(), "device_created_event");
        assert_eq!(events[2].name(), "device_key_added_event");
        assert_eq!(events.len(), 1 + 1 + 1 + 1 + 4);
        let device = match events[2].parse::<DeviceEvent>().unwrap() {
            DeviceEvent::KeyAdded(event) => event.device,
            _ => panic!("Expected KeyAdded"),
        };
        assert_eq!(device.keys[0].key_value(), "AAA:AAA-1:urn:one");
        assert!(teams.contains(&ProductTeamId::from_ods_code("AAA")));
    }

    #[test]
    fn each_team_is_created_once() {
        let mut teams = ProductTeams::new();
        let created = |events: &[ExportedEvent]| -> Vec<ProductTeamId> {
            events
                .iter()
                .filter(|event| event.name() == PRODUCT_TEAM_CREATED_EVENT)
                .map(|event| match event.parse::<ProductTeamEvent>().unwrap() {
                    ProductTeamEvent::Created(team) => team.id,
                    _ => panic!("Expected Created"),
                })
                .collect()
        };

        let first = translate(&parse(&as_record("200000000001", &["BBB", "CCC"], &["urn:one"])), &mut teams)
            .unwrap();
        assert_eq!(
            created(&first),
            vec![ProductTeamId::from_ods_code("BBB"), ProductTeamId::from_ods_code("CCC")]
        );

        let second = translate(&parse(&as_record("200000000002", &["CCC", "DDD"], &["urn:one"])), &mut teams)
            .unwrap();
        assert_eq!(created(&second), vec![ProductTeamId::from_ods_code("DDD")]);

        let mut resumed = ProductTeams::new();
        resumed.remember(first.iter().chain(&second)).unwrap();
        let third = translate(&parse(&mhs_record("BBB", "BBB-1", "urn:one")), &mut resumed).unwrap();
        assert!(created(&third).is_empty());
    }

    #[test]
    fn epr_teams_are_derived_from_the_ods_code() {
        let team = epr_product_team("AAA").unwrap();
        assert_eq!(team.record().id, ProductTeamId::from_ods_code("AAA"));
        assert_eq!(team.name(), "AAA (EPR)");
        assert_eq!(team.keys()[0].key_value(), "EPR-AAA");
    }

    #[test]
    fn failed_records_do_not_claim_teams() {
        let mut teams = ProductTeams::new();
        let SdsRecord::MessageHandlingSystem(mhs) = parse(&mhs_record("aaa", "AAA-1", "urn:one"))
        else {
            panic!("Expected MessageHandlingSystem");
        };
        assert!(translate(&SdsRecord::MessageHandlingSystem(mhs), &mut teams).is_err());
        assert!(!teams.contains(&ProductTeamId::from_ods_code("aaa")));
    }

    #[test]
    fn unreadable_team_events_are_reported() {
        let mut teams = ProductTeams::new();
        let events = [ExportedEvent::new(PRODUCT_TEAM_CREATED_EVENT, serde_json::json!({"id": 1}))];
        match teams.remember(&events).unwrap_err() {
            TranslationError::Unreadable { index, .. } => assert_eq!(index, 0),
            _ => panic!("Expected Unreadable"),
        }
    }

    #[test]
    fn invalid_ods_codes_fail_translation() {
        let SdsRecord::MessageHandlingSystem(mhs) = parse(&mhs_record("aaa", "AAA-1", "urn:one"))
        else {
            panic!("Expected MessageHandlingSystem");
        };
        match nhs_mhs_to_device(&mhs).unwrap_err() {
            TranslationError::Domain(DomainError::Validation(_)) => {}
            _ => panic!("Expected Validation"),
        }
    }

    #[test]
    fn combinations_respect_the_minimum() {
        let fields = [("a", "1"), ("b", "2"), ("c", "3")];
        let subsets = combinations(&fields, 2);
        assert_eq!(subsets.len(), 4);
        assert_eq!(subsets[3], fields.to_vec());
        assert!(subsets.iter().all(|s| s.len() >= 2));
    }

    #[test]
    fn exported_devices_have_no_pending_events() {
        let SdsRecord::MessageHandlingSystem(mhs) = parse(&mhs_record("AAA", "AAA-1", "urn:one"))
        else {
            panic!("Expected MessageHandlingSystem");
        };
        let mut device = nhs_mhs_to_device(&mhs).unwrap();
        assert!(!device.events().is_empty());
        device.export_events().unwrap();
        assert!(device.events().is_empty());
    }
}
