//! Conditional transaction construction and failure translation.

use crate::repository::RepositoryError;
use crate::store::{CancellationReason, Condition, Item, PrimaryKey, StoreError, TransactItem};

/// Put a new row; fails if the key is already taken.
pub fn create_transaction(key: PrimaryKey, data: Item) -> TransactItem {
    TransactItem::Put {
        key,
        item: data,
        condition: Some(Condition::MustNotExist),
    }
}

/// Set `data` on every given row; each row must already exist.
pub fn update_transactions<I>(keys: I, data: &Item) -> Vec<TransactItem>
where
    I: IntoIterator<Item = PrimaryKey>,
{
    keys.into_iter()
        .map(|key| TransactItem::Update {
            key,
            fields: data.clone(),
            condition: Some(Condition::MustExist),
        })
        .collect()
}

/// Remove a row that must exist.
pub fn delete_transaction(key: PrimaryKey) -> TransactItem {
    TransactItem::Delete {
        key,
        condition: Some(Condition::MustExist),
    }
}

/// Translate a failed transaction into a repository error.
///
/// Cancellation reasons are positionally aligned with the attempted items. The
/// first item whose precondition failed decides the error: a violated
/// must-not-exist is a conflict, a violated must-exist is a missing item.
/// Anything else is surfaced as unhandled together with what was attempted.
pub fn handle_store_error(error: StoreError, attempted: &[TransactItem]) -> RepositoryError {
    match error {
        StoreError::TransactionCanceled { reasons } => {
            let failed = reasons
                .iter()
                .zip(attempted)
                .filter(|(reason, _)| reason.condition_check_failed());
            for (_, item) in failed {
                match item.condition() {
                    Some(Condition::MustNotExist) => {
                        return RepositoryError::AlreadyExists {
                            key: item.key().clone(),
                        };
                    }
                    Some(Condition::MustExist) => {
                        return RepositoryError::NotFound {
                            key: item.key().to_string(),
                        };
                    }
                    None => {}
                }
            }
            RepositoryError::Unhandled {
                message: format!("transaction cancelled: {}", describe(&reasons)),
                attempted: attempted.to_vec(),
            }
        }
        StoreError::ConditionalCheckFailed(key) => {
            let condition = attempted
                .iter()
                .find(|item| item.key() == &key)
                .and_then(TransactItem::condition);
            match condition {
                Some(Condition::MustNotExist) => RepositoryError::AlreadyExists { key },
                Some(Condition::MustExist) => RepositoryError::NotFound {
                    key: key.to_string(),
                },
                None => RepositoryError::Unhandled {
                    message: format!("conditional check failed for {key}"),
                    attempted: attempted.to_vec(),
                },
            }
        }
        other => RepositoryError::Unhandled {
            message: other.to_string(),
            attempted: attempted.to_vec(),
        },
    }
}

fn describe(reasons: &[CancellationReason]) -> String {
    reasons
        .iter()
        .map(|r| match r {
            CancellationReason::None => "None".to_owned(),
            CancellationReason::ConditionalCheckFailed => "ConditionalCheckFailed".to_owned(),
            CancellationReason::Other(code) => code.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
