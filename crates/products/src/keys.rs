use serde::{Deserialize, Serialize};

use cpm_core::{DomainError, DomainResult, EntityKey, KeyType};

/// Secondary key types for a product team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductTeamKeyType {
    /// Free-form alias chosen by the team.
    ProductTeamIdAlias,
    /// Identifier of the team in the legacy EPR directory (`EPR-<ods code>...`).
    EprId,
}

impl KeyType for ProductTeamKeyType {
    fn as_str(self) -> &'static str {
        match self {
            ProductTeamKeyType::ProductTeamIdAlias => "product_team_id_alias",
            ProductTeamKeyType::EprId => "epr_id",
        }
    }

    fn validate(self, value: &str) -> DomainResult<()> {
        match self {
            ProductTeamKeyType::ProductTeamIdAlias => Ok(()),
            ProductTeamKeyType::EprId => {
                let valid = value.strip_prefix("EPR-").is_some_and(|rest| {
                    !rest.is_empty()
                        && rest
                            .chars()
                            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
                });
                if valid {
                    Ok(())
                } else {
                    Err(DomainError::invalid_key(format!(
                        "epr_id '{value}' must look like 'EPR-<ODS CODE>'"
                    )))
                }
            }
        }
    }
}

/// Secondary key types for a CPM product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKeyType {
    /// `<ODS CODE>-<6 digits>` messaging party key.
    PartyKey,
}

impl KeyType for ProductKeyType {
    fn as_str(self) -> &'static str {
        match self {
            ProductKeyType::PartyKey => "party_key",
        }
    }

    fn validate(self, value: &str) -> DomainResult<()> {
        match self {
            ProductKeyType::PartyKey => {
                let valid = value.split_once('-').is_some_and(|(ods, number)| {
                    !ods.is_empty()
                        && ods.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
                        && number.len() == 6
                        && number.chars().all(|c| c.is_ascii_digit())
                });
                if valid {
                    Ok(())
                } else {
                    Err(DomainError::invalid_key(format!(
                        "party_key '{value}' must look like '<ODS CODE>-<6 digits>'"
                    )))
                }
            }
        }
    }
}

pub type ProductTeamKey = EntityKey<ProductTeamKeyType>;
pub type ProductKey = EntityKey<ProductKeyType>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn party_keys_have_ods_prefix_and_six_digits() {
        assert!(ProductKey::new(ProductKeyType::PartyKey, "F5H1R-850000").is_ok());
        assert!(ProductKey::new(ProductKeyType::PartyKey, "F5H1R-85000").is_err());
        assert!(ProductKey::new(ProductKeyType::PartyKey, "f5h1r-850000").is_err());
        assert!(ProductKey::new(ProductKeyType::PartyKey, "850000").is_err());
    }

    #[test]
    fn epr_ids_have_prefix() {
        assert!(ProductTeamKey::new(ProductTeamKeyType::EprId, "EPR-F5H1R").is_ok());
        assert!(ProductTeamKey::new(ProductTeamKeyType::EprId, "F5H1R").is_err());
        assert!(ProductTeamKey::new(ProductTeamKeyType::ProductTeamIdAlias, "my-alias").is_ok());
        assert!(ProductTeamKey::new(ProductTeamKeyType::ProductTeamIdAlias, "my#alias").is_err());
    }
}
