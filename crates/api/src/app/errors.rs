use core::fmt::Display;

use cpm_core::{DomainError, Status};
use cpm_infra::RepositoryError;

pub fn not_found(entity: &str, id: impl Display) -> DomainError {
    DomainError::not_found(format!("Could not find {entity} for key ('{id}')"))
}

/// Deleted resources are reported as missing.
pub fn ensure_active(status: Status, entity: &str, id: impl Display) -> Result<(), DomainError> {
    if status.is_active() {
        Ok(())
    } else {
        Err(not_found(entity, id))
    }
}

/// Replace a repository miss with a readable not-found error.
pub fn on_missing(entity: &str, id: impl Display) -> impl FnOnce(RepositoryError) -> anyhow::Error {
    let missing = not_found(entity, id);
    move |err: RepositoryError| -> anyhow::Error {
        if err.is_not_found() {
            missing.into()
        } else {
            err.into()
        }
    }
}
