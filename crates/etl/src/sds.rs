//! Spine Directory Service records: the directory object classes the ETL
//! translates into CPM devices.
//!
//! Records arrive as [`LdifRecord`]s. Attribute values are multi-valued in
//! LDIF; fields modelled as single values must carry exactly one value.
//! Unknown attributes are rejected.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ldif::{CHANGE_TYPE, ChangeType, DistinguishedName, LdifRecord};

pub const OBJECT_CLASS: &str = "objectclass";
const DN: &str = "dn";
const EXCLUDED_OBJECT_CLASSES: [&str; 2] = ["top", "nhsexternalchangelogentry"];

/// Client organisation used when an accredited system lists none.
pub const DEFAULT_ORGANISATION: &str = "LSP04";

/// Separator between the parts of a device key built from SDS fields.
pub const KEY_SEPARATOR: &str = ":";

#[derive(Debug, Error)]
pub enum SdsError {
    #[error("{dn}: changetype '{change_type:?}' cannot be translated in bulk")]
    UnsupportedChangeType { dn: String, change_type: ChangeType },

    #[error("{dn}: no translatable object class in {found:?}")]
    UnknownObjectClass { dn: String, found: Vec<String> },

    #[error("{dn}: invalid {object_class} record: {source}")]
    Invalid {
        dn: String,
        object_class: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A message handling system (`nhsMhs`): one endpoint of one interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NhsMhs {
    #[serde(skip_serializing)]
    pub dn: DistinguishedName,
    #[serde(rename(deserialize = "nhsapproverurp"))]
    pub nhs_approver_urp: String,
    #[serde(rename(deserialize = "nhsdateapproved"))]
    pub nhs_date_approved: String,
    #[serde(rename(deserialize = "nhsdatednsapproved"))]
    pub nhs_date_dns_approved: String,
    #[serde(rename(deserialize = "nhsdaterequested"))]
    pub nhs_date_requested: String,
    #[serde(rename(deserialize = "nhsdnsapprover"))]
    pub nhs_dns_approver: String,
    #[serde(rename(deserialize = "nhsidcode"))]
    pub nhs_id_code: String,
    #[serde(rename(deserialize = "nhsmhscpaid"), default, skip_serializing_if = "Option::is_none")]
    pub nhs_mhs_cpa_id: Option<String>,
    pub binding: String,
    #[serde(rename(deserialize = "nhsmhsendpoint"))]
    pub nhs_mhs_end_point: String,
    #[serde(rename(deserialize = "nhsmhsfqdn"))]
    pub nhs_mhs_fqdn: String,
    #[serde(rename(deserialize = "nhsmhsmanufacturerorg"))]
    pub nhs_mhs_manufacturer_org: String,
    #[serde(rename(deserialize = "nhsmhspartykey"))]
    pub nhs_mhs_party_key: String,
    #[serde(rename(deserialize = "nhsproductname"), default, skip_serializing_if = "Option::is_none")]
    pub nhs_product_name: Option<String>,
    #[serde(rename(deserialize = "nhsproductversion"), default, skip_serializing_if = "Option::is_none")]
    pub nhs_product_version: Option<String>,
    #[serde(rename(deserialize = "nhsrequestorurp"))]
    pub nhs_requestor_urp: String,
    #[serde(
        rename(deserialize = "nhsmhsservicedescription"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub nhs_mhs_service_description: Option<String>,
    #[serde(rename(deserialize = "nhsmhsin"))]
    pub nhs_mhs_in: String,
    #[serde(rename(deserialize = "nhsmhssn"))]
    pub nhs_mhs_sn: String,
    #[serde(rename(deserialize = "nhsmhssvcia"))]
    pub nhs_mhs_svc_ia: String,
    #[serde(rename(deserialize = "nhsmhsretries"), default, skip_serializing_if = "Option::is_none")]
    pub nhs_mhs_retries: Option<String>,
    #[serde(rename(deserialize = "nhsmhsretryinterval"), default, skip_serializing_if = "Option::is_none")]
    pub nhs_mhs_retry_interval: Option<String>,
    #[serde(
        rename(deserialize = "nhsmhspersistduration"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub nhs_mhs_persist_duration: Option<String>,
}

impl NhsMhs {
    pub const OBJECT_CLASS: &'static str = "nhsmhs";

    /// `<ods code>:<party key>:<interaction>`, the endpoint's unique key.
    pub fn scoped_party_key(&self) -> String {
        [
            self.nhs_id_code.trim(),
            self.nhs_mhs_party_key.trim(),
            self.nhs_mhs_svc_ia.trim(),
        ]
        .join(KEY_SEPARATOR)
    }
}

/// An accredited system (`nhsAs`): a product installed for one or more client organisations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NhsAccreditedSystem {
    #[serde(skip_serializing)]
    pub dn: DistinguishedName,
    #[serde(rename(deserialize = "uniqueidentifier"))]
    pub unique_identifier: String,
    #[serde(rename(deserialize = "nhsapproverurp"))]
    pub nhs_approver_urp: String,
    #[serde(rename(deserialize = "nhsdateapproved"))]
    pub nhs_date_approved: String,
    #[serde(rename(deserialize = "nhsrequestorurp"))]
    pub nhs_requestor_urp: String,
    #[serde(rename(deserialize = "nhsdaterequested"))]
    pub nhs_date_requested: String,
    #[serde(rename(deserialize = "nhsidcode"))]
    pub nhs_id_code: String,
    #[serde(rename(deserialize = "nhsmhsmanufacturerorg"), default, skip_serializing_if = "Option::is_none")]
    pub nhs_mhs_manufacturer_org: Option<String>,
    #[serde(rename(deserialize = "nhsmhspartykey"))]
    pub nhs_mhs_party_key: String,
    #[serde(rename(deserialize = "nhsproductkey"))]
    pub nhs_product_key: String,
    #[serde(rename(deserialize = "nhsproductname"), default, skip_serializing_if = "Option::is_none")]
    pub nhs_product_name: Option<String>,
    #[serde(rename(deserialize = "nhsproductversion"), default, skip_serializing_if = "Option::is_none")]
    pub nhs_product_version: Option<String>,
    #[serde(rename(deserialize = "nhsasacf"), default, skip_serializing_if = "Option::is_none")]
    pub nhs_as_acf: Option<BTreeSet<String>>,
    #[serde(rename(deserialize = "nhsasclient"), default, skip_serializing_if = "Option::is_none")]
    pub nhs_as_client: Option<BTreeSet<String>>,
    #[serde(rename(deserialize = "nhsassvcia"))]
    pub nhs_as_svc_ia: BTreeSet<String>,
    #[serde(rename(deserialize = "nhstempuid"), default, skip_serializing_if = "Option::is_none")]
    pub nhs_temp_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename(deserialize = "nhsascategorybag"), default, skip_serializing_if = "Option::is_none")]
    pub nhs_as_category_bag: Option<BTreeSet<String>>,
}

impl NhsAccreditedSystem {
    pub const OBJECT_CLASS: &'static str = "nhsas";
    const SET_FIELDS: [&'static str; 4] = ["nhsasacf", "nhsasclient", "nhsassvcia", "nhsascategorybag"];

    /// `(client ods code, <ods code>:<unique identifier>)` for every client,
    /// falling back to [`DEFAULT_ORGANISATION`].
    pub fn accredited_system_ids(&self) -> Vec<(String, String)> {
        let clients: Vec<&str> = match &self.nhs_as_client {
            Some(clients) if !clients.is_empty() => clients.iter().map(String::as_str).collect(),
            _ => vec![DEFAULT_ORGANISATION],
        };
        clients
            .into_iter()
            .map(|ods_code| {
                (
                    ods_code.to_owned(),
                    [ods_code, self.unique_identifier.as_str()].join(KEY_SEPARATOR),
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdsRecord {
    MessageHandlingSystem(NhsMhs),
    AccreditedSystem(NhsAccreditedSystem),
}

impl SdsRecord {
    /// Validate a bulk (add) record against its object class.
    pub fn from_ldif(record: &LdifRecord) -> Result<Self, SdsError> {
        let dn = record.dn.to_string();
        match record.change_type() {
            None | Some(ChangeType::Add) => {}
            Some(change_type) => {
                return Err(SdsError::UnsupportedChangeType { dn, change_type });
            }
        }

        let found: Vec<String> = record
            .get(OBJECT_CLASS)
            .into_iter()
            .flatten()
            .filter(|class| !EXCLUDED_OBJECT_CLASSES.contains(&class.to_lowercase().as_str()))
            .cloned()
            .collect();
        if found.len() != 1 {
            return Err(SdsError::UnknownObjectClass { dn, found });
        }
        let object_class = found[0].to_lowercase();

        if object_class == NhsMhs::OBJECT_CLASS {
            let fields = fields(record, &[]);
            serde_json::from_value(fields)
                .map(SdsRecord::MessageHandlingSystem)
                .map_err(|source| SdsError::Invalid {
                    dn,
                    object_class: NhsMhs::OBJECT_CLASS,
                    source,
                })
        } else if object_class == NhsAccreditedSystem::OBJECT_CLASS {
            let fields = fields(record, &NhsAccreditedSystem::SET_FIELDS);
            serde_json::from_value(fields)
                .map(SdsRecord::AccreditedSystem)
                .map_err(|source| SdsError::Invalid {
                    dn,
                    object_class: NhsAccreditedSystem::OBJECT_CLASS,
                    source,
                })
        } else {
            Err(SdsError::UnknownObjectClass { dn, found })
        }
    }

    pub fn object_class(&self) -> &'static str {
        match self {
            SdsRecord::MessageHandlingSystem(_) => NhsMhs::OBJECT_CLASS,
            SdsRecord::AccreditedSystem(_) => NhsAccreditedSystem::OBJECT_CLASS,
        }
    }
}

/// Single values are unpacked unless the field is a set.
fn fields(record: &LdifRecord, set_fields: &[&str]) -> Value {
    let mut map = Map::new();
    map.insert(DN.to_owned(), Value::String(record.dn.to_string()));
    for (attribute, values) in &record.attributes {
        if attribute == OBJECT_CLASS || attribute == CHANGE_TYPE {
            continue;
        }
        let value = match values.iter().collect::<Vec<_>>().as_slice() {
            [single] if !set_fields.contains(&attribute.as_str()) => Value::String((*single).clone()),
            many => Value::Array(many.iter().map(|v| Value::String((*v).clone())).collect()),
        };
        map.insert(attribute.clone(), value);
    }
    Value::Object(map)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn mhs_record(ods_code: &str, party_key: &str, svc_ia: &str) -> LdifRecord {
        let dn = DistinguishedName::parse(&format!("uniqueIdentifier={party_key},ou=Services,o=nhs"))
            .unwrap();
        LdifRecord::new(dn)
            .with_attribute("objectClass", "nhsMhs")
            .with_attribute("objectClass", "top")
            .with_attribute("nhsApproverURP", "uniqueIdentifier=1,ou=People,o=nhs")
            .with_attribute("nhsDateApproved", "20240101000000")
            .with_attribute("nhsDateDNSApproved", "20240101000000")
            .with_attribute("nhsDateRequested", "20240101000000")
            .with_attribute("nhsDNSApprover", "uniqueIdentifier=1,ou=People,o=nhs")
            .with_attribute("nhsIDCode", ods_code)
            .with_attribute("binding", "https://")
            .with_attribute("nhsMhsEndPoint", "https://example.nhs.uk/reliablemessaging")
            .with_attribute("nhsMhsFQDN", "example.nhs.uk")
            .with_attribute("nhsMHSManufacturerOrg", ods_code)
            .with_attribute("nhsMHSPartyKey", party_key)
            .with_attribute("nhsRequestorURP", "uniqueIdentifier=1,ou=People,o=nhs")
            .with_attribute("nhsMhsIN", "QUPA_IN040000UK32")
            .with_attribute("nhsMhsSN", "urn:nhs:names:services:pds")
            .with_attribute("nhsMhsSvcIA", svc_ia)
    }

    pub fn as_record(unique_identifier: &str, clients: &[&str], svc_ias: &[&str]) -> LdifRecord {
        let dn = DistinguishedName::parse(&format!(
            "uniqueIdentifier={unique_identifier},ou=Services,o=nhs"
        ))
        .unwrap();
        let mut record = LdifRecord::new(dn)
            .with_attribute("objectClass", "nhsAS")
            .with_attribute("uniqueIdentifier", unique_identifier)
            .with_attribute("nhsApproverURP", "uniqueIdentifier=1,ou=People,o=nhs")
            .with_attribute("nhsDateApproved", "20240101000000")
            .with_attribute("nhsRequestorURP", "uniqueIdentifier=1,ou=People,o=nhs")
            .with_attribute("nhsDateRequested", "20240101000000")
            .with_attribute("nhsIDCode", "AAA")
            .with_attribute("nhsMHSPartyKey", "AAA-123456")
            .with_attribute("nhsProductKey", "1234");
        for client in clients {
            record.insert("nhsAsClient", *client);
        }
        for svc_ia in svc_ias {
            record.insert("nhsAsSvcIA", *svc_ia);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn message_handling_systems_are_recognised() {
        let record = mhs_record("AAA", "AAA-123456", " urn:nhs:names:services:pds:QUPA_IN040000UK32");
        let SdsRecord::MessageHandlingSystem(mhs) = SdsRecord::from_ldif(&record).unwrap() else {
            panic!("Expected MessageHandlingSystem");
        };
        assert_eq!(mhs.nhs_id_code, "AAA");
        assert_eq!(mhs.nhs_product_name, None);
        assert_eq!(
            mhs.scoped_party_key(),
            "AAA:AAA-123456:urn:nhs:names:services:pds:QUPA_IN040000UK32"
        );
    }

    #[test]
    fn accredited_systems_keep_sets() {
        let record = as_record("200000000001", &["BBB"], &["urn:one"]);
        let SdsRecord::AccreditedSystem(system) = SdsRecord::from_ldif(&record).unwrap() else {
            panic!("Expected AccreditedSystem");
        };
        assert_eq!(system.nhs_as_svc_ia, BTreeSet::from(["urn:one".to_owned()]));
        assert_eq!(
            system.accredited_system_ids(),
            vec![("BBB".to_owned(), "BBB:200000000001".to_owned())]
        );
    }

    #[test]
    fn missing_clients_fall_back_to_the_default_organisation() {
        let record = as_record("200000000001", &[], &["urn:one"]);
        let SdsRecord::AccreditedSystem(system) = SdsRecord::from_ldif(&record).unwrap() else {
            panic!("Expected AccreditedSystem");
        };
        assert_eq!(
            system.accredited_system_ids(),
            vec![(DEFAULT_ORGANISATION.to_owned(), format!("{DEFAULT_ORGANISATION}:200000000001"))]
        );
    }

    #[test]
    fn invalid_records_are_rejected() {
        let unknown = as_record("1", &[], &["urn:one"]).with_attribute("nhsFavouriteColour", "blue");
        match SdsRecord::from_ldif(&unknown).unwrap_err() {
            SdsError::Invalid { object_class, .. } => assert_eq!(object_class, "nhsas"),
            _ => panic!("Expected Invalid"),
        }

        let multi = mhs_record("AAA", "AAA-1", "urn:one").with_attribute("nhsMhsSvcIA", "urn:two");
        match SdsRecord::from_ldif(&multi).unwrap_err() {
            SdsError::Invalid { .. } => {}
            _ => panic!("Expected Invalid"),
        }

        let mut other = mhs_record("AAA", "AAA-1", "urn:one");
        other.attributes.remove(OBJECT_CLASS);
        other.insert("objectClass", "organizationalUnit");
        match SdsRecord::from_ldif(&other).unwrap_err() {
            SdsError::UnknownObjectClass { found, .. } => {
                assert_eq!(found, vec!["organizationalUnit".to_owned()]);
            }
            _ => panic!("Expected UnknownObjectClass"),
        }

        let deletion = mhs_record("AAA", "AAA-1", "urn:one").with_attribute("changetype", "delete");
        match SdsRecord::from_ldif(&deletion).unwrap_err() {
            SdsError::UnsupportedChangeType { change_type, .. } => {
                assert_eq!(change_type, ChangeType::Delete);
            }
            _ => panic!("Expected UnsupportedChangeType"),
        }
    }
}
