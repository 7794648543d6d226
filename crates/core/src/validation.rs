//! Validation rules shared by every entity.

use crate::error::{DomainError, DomainResult};

/// Separator used when composing storage keys. Never allowed inside a key value.
pub const KEY_SEPARATOR: char = '#';

pub const MAX_NAME_LENGTH: usize = 256;
pub const MAX_ODS_CODE_LENGTH: usize = 10;

/// Names must be non-empty after trimming, printable and bounded.
pub fn validate_name(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    if value.chars().count() > MAX_NAME_LENGTH {
        return Err(DomainError::validation(format!(
            "{field} must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(DomainError::validation(format!(
            "{field} must not contain control characters"
        )));
    }
    Ok(())
}

/// ODS codes are short upper-case alphanumeric organisation codes.
pub fn validate_ods_code(value: &str) -> DomainResult<()> {
    let valid = !value.is_empty()
        && value.len() <= MAX_ODS_CODE_LENGTH
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase());
    if !valid {
        return Err(DomainError::validation(format!(
            "ods_code '{value}' must be 1-{MAX_ODS_CODE_LENGTH} upper-case alphanumeric characters"
        )));
    }
    Ok(())
}

/// Every key value is bounded, non-empty and free of the storage separator.
pub fn validate_key_value(key_type: &str, value: &str) -> DomainResult<()> {
    if value.is_empty() {
        return Err(DomainError::invalid_key(format!("{key_type} must not be empty")));
    }
    if value.contains(KEY_SEPARATOR) {
        return Err(DomainError::invalid_key(format!(
            "{key_type} '{value}' must not contain '{KEY_SEPARATOR}'"
        )));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(DomainError::invalid_key(format!(
            "{key_type} '{value}' must not contain whitespace"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_must_be_meaningful() {
        assert!(validate_name("name", "My Team").is_ok());
        assert!(validate_name("name", "   ").is_err());
        assert!(validate_name("name", "tab\there").is_err());
        assert!(validate_name("name", &"x".repeat(MAX_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn ods_codes_are_upper_alphanumeric() {
        assert!(validate_ods_code("F5H1R").is_ok());
        assert!(validate_ods_code("f5h1r").is_err());
        assert!(validate_ods_code("").is_err());
        assert!(validate_ods_code("ABCDEFGHIJK").is_err());
    }

    #[test]
    fn key_values_never_contain_the_separator() {
        let err = validate_key_value("party_key", "ABC#123").unwrap_err();
        assert!(matches!(err, DomainError::InvalidKey(_)));
        assert!(validate_key_value("party_key", "ABC-123").is_ok());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

            #[test]
            fn any_value_with_separator_is_rejected(prefix in "[A-Z0-9]{0,8}", suffix in "[A-Z0-9]{0,8}") {
                let value = format!("{prefix}#{suffix}");
                prop_assert!(validate_key_value("key", &value).is_err());
            }

            #[test]
            fn separator_free_tokens_are_accepted(value in "[A-Za-z0-9:.-]{1,32}") {
                prop_assert!(validate_key_value("key", &value).is_ok());
            }
        }
    }
}
