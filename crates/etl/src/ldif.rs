//! LDIF reading and writing for directory change records.
//!
//! Parsing follows RFC 2849 closely enough for directory exports:
//! - an optional `version:` header
//! - `#` comments and folded (space-prefixed) continuation lines
//! - `attr: value` and base64 `attr:: value` pairs, with attribute names lower-cased
//! - `changetype: modify` blocks (`add:`/`delete:`/`replace:` ... `-`)
//!
//! URL values (`attr:< url`) are never fetched and are dropped. Values are
//! collected into sets, empty values are discarded.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CHANGE_TYPE: &str = "changetype";
const DN: &str = "dn";
const VERSION: &str = "version";
const MODIFICATION_END: &str = "-";
const FOLD_COLUMNS: usize = 76;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LdifError {
    #[error("line {line}: no value-spec in '{text}'")]
    MissingValueSpec { line: usize, text: String },

    #[error("line {line}: first line of record does not start with \"dn:\": '{found}'")]
    MissingDn { line: usize, found: String },

    #[error("line {line}: {source}")]
    InvalidDn {
        line: usize,
        #[source]
        source: InvalidDistinguishedName,
    },

    #[error("line {line}: invalid changetype '{value}'")]
    InvalidChangeType { line: usize, value: String },

    #[error("line {line}: invalid version '{value}'")]
    InvalidVersion { line: usize, value: String },

    #[error("line {line}: '{attribute}' is not valid base64")]
    InvalidBase64 { line: usize, attribute: String },

    #[error("line {line}: '{attribute}' is not valid UTF-8")]
    InvalidUtf8 { line: usize, attribute: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a valid distinguished name: '{0}'")]
pub struct InvalidDistinguishedName(pub String);

/// A distinguished name, kept verbatim alongside its `(attribute, value)` parts.
///
/// `uniqueIdentifier=200000000001,ou=Services,o=nhs` parses into
/// `[("uniqueidentifier", "200000000001"), ("ou", "Services"), ("o", "nhs")]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DistinguishedName {
    raw: String,
    parts: Vec<(String, String)>,
}

impl DistinguishedName {
    pub fn parse(raw: &str) -> Result<Self, InvalidDistinguishedName> {
        let invalid = || InvalidDistinguishedName(raw.to_owned());
        let mut parts = Vec::new();
        if !raw.trim().is_empty() {
            for rdn in split_unescaped(raw, ',') {
                let (attribute, value) = rdn.split_once('=').ok_or_else(invalid)?;
                let attribute = attribute.trim();
                let value = value.trim();
                if attribute.is_empty() || value.is_empty() {
                    return Err(invalid());
                }
                parts.push((attribute.to_lowercase(), value.to_owned()));
            }
        }
        Ok(Self {
            raw: raw.to_owned(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn parts(&self) -> &[(String, String)] {
        &self.parts
    }

    /// Value of the first part with this (case-insensitive) attribute.
    pub fn get(&self, attribute: &str) -> Option<&str> {
        let attribute = attribute.to_lowercase();
        self.parts
            .iter()
            .find(|(a, _)| *a == attribute)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for DistinguishedName {
    type Error = InvalidDistinguishedName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.raw
    }
}

fn split_unescaped(raw: &str, separator: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (index, c) in raw.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            c if c == separator && !escaped => {
                pieces.push(&raw[start..index]);
                start = index + c.len_utf8();
            }
            _ => escaped = false,
        }
    }
    pieces.push(&raw[start..]);
    pieces
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Delete,
    Modify,
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(ChangeType::Add),
            "delete" => Ok(ChangeType::Delete),
            "modify" => Ok(ChangeType::Modify),
            other => Err(other.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifyOperation {
    Add,
    Delete,
    Replace,
}

impl ModifyOperation {
    fn as_str(self) -> &'static str {
        match self {
            ModifyOperation::Add => "add",
            ModifyOperation::Delete => "delete",
            ModifyOperation::Replace => "replace",
        }
    }
}

impl FromStr for ModifyOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(ModifyOperation::Add),
            "delete" => Ok(ModifyOperation::Delete),
            "replace" => Ok(ModifyOperation::Replace),
            other => Err(other.to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub operation: ModifyOperation,
    pub attribute: String,
    pub values: BTreeSet<String>,
}

/// One LDIF record: its distinguished name and multi-valued attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdifRecord {
    pub dn: DistinguishedName,
    #[serde(default)]
    pub attributes: BTreeMap<String, BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifications: Vec<Modification>,
}

impl LdifRecord {
    pub fn new(dn: DistinguishedName) -> Self {
        Self {
            dn,
            attributes: BTreeMap::new(),
            modifications: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: &str, value: impl Into<String>) -> Self {
        self.insert(attribute, value);
        self
    }

    /// Add a value. Attribute names are lower-cased; empty values are ignored.
    pub fn insert(&mut self, attribute: &str, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        self.attributes
            .entry(attribute.to_lowercase())
            .or_default()
            .insert(value);
    }

    pub fn get(&self, attribute: &str) -> Option<&BTreeSet<String>> {
        self.attributes.get(&attribute.to_lowercase())
    }

    pub fn change_type(&self) -> Option<ChangeType> {
        self.get(CHANGE_TYPE)?.iter().next()?.parse().ok()
    }
}

struct Line {
    number: usize,
    text: String,
}

struct Pair {
    line: usize,
    attribute: String,
    value: Option<String>,
}

/// Parse every record in an LDIF document.
pub fn parse(input: &str) -> Result<Vec<LdifRecord>, LdifError> {
    let mut records = Vec::new();
    let mut header = true;
    for block in blocks(unfold(input)) {
        let mut pairs = block
            .iter()
            .map(parse_pair)
            .collect::<Result<Vec<_>, _>>()?;
        if header {
            header = false;
            if pairs.first().is_some_and(|p| p.attribute == VERSION) {
                let version = pairs.remove(0);
                let value = version.value.unwrap_or_default();
                if value.trim().parse::<u32>().is_err() {
                    return Err(LdifError::InvalidVersion {
                        line: version.line,
                        value,
                    });
                }
                if pairs.is_empty() {
                    continue;
                }
            }
        }
        records.push(parse_record(pairs)?);
    }
    Ok(records)
}

fn unfold(input: &str) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::new();
    let mut continuing = false;
    for (index, raw) in input.lines().enumerate() {
        if let Some(rest) = raw.strip_prefix(' ') {
            if continuing {
                if let Some(last) = lines.last_mut() {
                    last.text.push_str(rest);
                    continue;
                }
            }
        }
        continuing = !raw.is_empty();
        lines.push(Line {
            number: index + 1,
            text: raw.to_owned(),
        });
    }
    lines.retain(|line| !line.text.starts_with('#'));
    lines
}

fn blocks(lines: Vec<Line>) -> Vec<Vec<Line>> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();
    for line in lines {
        if line.text.is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn parse_pair(line: &Line) -> Result<Pair, LdifError> {
    if line.text == MODIFICATION_END {
        return Ok(Pair {
            line: line.number,
            attribute: MODIFICATION_END.to_owned(),
            value: None,
        });
    }
    let (attribute, spec) =
        line.text
            .split_once(':')
            .ok_or_else(|| LdifError::MissingValueSpec {
                line: line.number,
                text: line.text.clone(),
            })?;
    let attribute = attribute.to_lowercase();
    let value = if let Some(encoded) = spec.strip_prefix(':') {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| LdifError::InvalidBase64 {
                line: line.number,
                attribute: attribute.clone(),
            })?;
        Some(String::from_utf8(bytes).map_err(|_| LdifError::InvalidUtf8 {
            line: line.number,
            attribute: attribute.clone(),
        })?)
    } else if spec.starts_with('<') {
        tracing::debug!(line = line.number, %attribute, "skipping URL value");
        None
    } else if let Some(value) = spec.strip_prefix(' ') {
        Some(value.trim_start().to_owned())
    } else {
        Some(spec.to_owned())
    };
    Ok(Pair {
        line: line.number,
        attribute,
        value,
    })
}

fn parse_record(pairs: Vec<Pair>) -> Result<LdifRecord, LdifError> {
    let mut pairs = pairs.into_iter().peekable();
    let first = match pairs.next() {
        Some(first) if first.attribute == DN => first,
        Some(other) => {
            return Err(LdifError::MissingDn {
                line: other.line,
                found: other.attribute,
            });
        }
        None => {
            return Err(LdifError::MissingDn {
                line: 0,
                found: String::new(),
            });
        }
    };
    let dn = DistinguishedName::parse(first.value.as_deref().unwrap_or_default())
        .map_err(|source| LdifError::InvalidDn {
            line: first.line,
            source,
        })?;
    let mut record = LdifRecord::new(dn);

    let change_type = match pairs.peek() {
        Some(pair) if pair.attribute == CHANGE_TYPE => {
            let value = pair.value.clone().unwrap_or_default();
            Some(
                value
                    .parse::<ChangeType>()
                    .map_err(|value| LdifError::InvalidChangeType {
                        line: pair.line,
                        value,
                    })?,
            )
        }
        _ => None,
    };

    if change_type == Some(ChangeType::Modify) {
        pairs.next();
        record.insert(CHANGE_TYPE, "modify");
        while let Some(pair) = pairs.next() {
            let Ok(operation) = pair.attribute.parse::<ModifyOperation>() else {
                if let Some(value) = pair.value {
                    record.insert(&pair.attribute, value);
                }
                continue;
            };
            let attribute = pair.value.unwrap_or_default().to_lowercase();
            let mut values = BTreeSet::new();
            while let Some(next) = pairs.next_if(|p| p.attribute == attribute) {
                values.extend(next.value);
            }
            record.modifications.push(Modification {
                operation,
                attribute,
                values,
            });
            pairs.next_if(|p| p.attribute == MODIFICATION_END);
        }
        return Ok(record);
    }

    for pair in pairs {
        if let Some(value) = pair.value {
            record.insert(&pair.attribute, value);
        }
    }
    Ok(record)
}

/// Render records as LDIF, folding lines at 76 columns.
///
/// `changetype` is always written straight after the `dn` so that the output
/// parses back into the same records.
pub fn write(records: &[LdifRecord]) -> String {
    let mut out = String::new();
    for record in records {
        write_pair(&mut out, DN, record.dn.as_str());
        if let Some(values) = record.attributes.get(CHANGE_TYPE) {
            for value in values {
                write_pair(&mut out, CHANGE_TYPE, value);
            }
        }
        for (attribute, values) in &record.attributes {
            if attribute == CHANGE_TYPE {
                continue;
            }
            for value in values {
                write_pair(&mut out, attribute, value);
            }
        }
        for modification in &record.modifications {
            fold(
                &mut out,
                &format!("{}: {}", modification.operation.as_str(), modification.attribute),
            );
            for value in &modification.values {
                write_pair(&mut out, &modification.attribute, value);
            }
            fold(&mut out, MODIFICATION_END);
        }
        out.push('\n');
    }
    out
}

fn needs_base64(value: &str) -> bool {
    value.starts_with(['\0', '\n', '\r', ' ', ':', '<'])
        || value.contains(['\0', '\n', '\r'])
        || !value.is_ascii()
        || value.ends_with(' ')
}

fn write_pair(out: &mut String, attribute: &str, value: &str) {
    if needs_base64(value) {
        fold(out, &format!("{attribute}:: {}", STANDARD.encode(value)));
    } else {
        fold(out, &format!("{attribute}: {value}"));
    }
}

fn fold(out: &mut String, line: &str) {
    let chars: Vec<char> = line.chars().collect();
    let (first, mut rest) = chars.split_at(chars.len().min(FOLD_COLUMNS));
    out.extend(first);
    out.push('\n');
    while !rest.is_empty() {
        let (chunk, tail) = rest.split_at(rest.len().min(FOLD_COLUMNS - 1));
        out.push(' ');
        out.extend(chunk);
        out.push('\n');
        rest = tail;
    }
}
