use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cpm_core::{DomainError, DomainResult, Timestamp, validation::validate_name};

/// One submission of answers to a named questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionnaireResponse {
    pub questionnaire_name: String,
    pub created_on: Timestamp,
    pub answers: BTreeMap<String, Value>,
}

impl QuestionnaireResponse {
    pub fn new(
        questionnaire_name: impl Into<String>,
        created_on: Timestamp,
        answers: BTreeMap<String, Value>,
    ) -> DomainResult<Self> {
        let questionnaire_name = questionnaire_name.into();
        validate_name("questionnaire_name", &questionnaire_name)?;
        if answers.is_empty() {
            return Err(DomainError::validation(format!(
                "response to '{questionnaire_name}' has no answers"
            )));
        }
        Ok(Self {
            questionnaire_name,
            created_on,
            answers,
        })
    }
}
