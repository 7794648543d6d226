use serde::{Deserialize, Serialize};

use cpm_core::{DomainError, DomainResult};

const TAG_SEPARATOR: &str = "##";
const TAG_COMPONENT_SEPARATOR: &str = "##";
const TAG_COMPONENT_LEFT: &str = "<<";
const TAG_COMPONENT_RIGHT: &str = ">>";
const FORBIDDEN: [char; 3] = ['#', '<', '>'];

/// A searchable set of `(field, value)` pairs attached to a device.
///
/// Components are sorted by field name so that the same query always renders
/// the same tag value, regardless of argument order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<(String, String)>", into = "Vec<(String, String)>")]
pub struct DeviceTag {
    components: Vec<(String, String)>,
}

impl DeviceTag {
    pub fn new<I, F, V>(components: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<String>,
    {
        let mut components: Vec<(String, String)> = components
            .into_iter()
            .map(|(f, v)| (f.into(), v.into()))
            .collect();
        if components.is_empty() {
            return Err(DomainError::validation("a tag needs at least one component"));
        }
        for (field, value) in &components {
            if field.is_empty() {
                return Err(DomainError::validation("tag fields must not be empty"));
            }
            if field.contains(FORBIDDEN) || value.contains(FORBIDDEN) {
                return Err(DomainError::validation(format!(
                    "tag component '{field}'='{value}' contains a reserved character"
                )));
            }
        }
        components.sort_by(|a, b| a.0.cmp(&b.0));
        if components.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(DomainError::validation("tag fields must be unique"));
        }
        Ok(Self { components })
    }

    pub fn components(&self) -> &[(String, String)] {
        &self.components
    }

    /// Rendered form: `<<field##value>>##<<field##value>>`.
    pub fn value(&self) -> String {
        self.components
            .iter()
            .map(|(field, value)| {
                format!("{TAG_COMPONENT_LEFT}{field}{TAG_COMPONENT_SEPARATOR}{value}{TAG_COMPONENT_RIGHT}")
            })
            .collect::<Vec<_>>()
            .join(TAG_SEPARATOR)
    }
}

impl core::fmt::Display for DeviceTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.value())
    }
}

impl TryFrom<Vec<(String, String)>> for DeviceTag {
    type Error = DomainError;

    fn try_from(value: Vec<(String, String)>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DeviceTag> for Vec<(String, String)> {
    fn from(value: DeviceTag) -> Self {
        value.components
    }
}
