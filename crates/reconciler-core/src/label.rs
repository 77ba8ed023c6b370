//! Container-label parsing for the docker source extractor
//!
//! Labels are grouped by a numeric suffix so one container can publish
//! more than one record: `dns.hostname`, `dns.type`, `dns.content` (index
//! 0, the bare key) and `dns.hostname.1`, `dns.type.1`, ... for additional
//! records. The key space is closed — an unrecognized suffix is a
//! validation error, not silently ignored, so a typo'd label doesn't
//! produce a record nobody asked for instead of a startup-visible error.

use crate::hostname::normalize_hostname;
use crate::record::RecordType;
use crate::spec::{DesiredSpec, SourceKind};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// The closed set of label suffixes this system understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKey {
    Skip,
    Hostname,
    Type,
    Content,
    Ttl,
    Proxied,
    Manage,
    Priority,
    Weight,
    Port,
    Flags,
    Tag,
}

impl LabelKey {
    fn parse(field: &str) -> Option<Self> {
        match field {
            "skip" => Some(Self::Skip),
            "hostname" => Some(Self::Hostname),
            "type" => Some(Self::Type),
            "content" => Some(Self::Content),
            "ttl" => Some(Self::Ttl),
            "proxied" => Some(Self::Proxied),
            "manage" => Some(Self::Manage),
            "priority" => Some(Self::Priority),
            "weight" => Some(Self::Weight),
            "port" => Some(Self::Port),
            "flags" => Some(Self::Flags),
            "tag" => Some(Self::Tag),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum LabelError {
    UnknownSuffix(String),
    MalformedInteger { field: String, value: String },
    InvalidHostname(String),
    AmbiguousManaged(String),
    MissingHostname(String),
}

impl fmt::Display for LabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelError::UnknownSuffix(s) => write!(f, "unrecognized label key: {s}"),
            LabelError::MalformedInteger { field, value } => {
                write!(f, "label {field} is not a valid integer: {value}")
            }
            LabelError::InvalidHostname(e) => write!(f, "invalid hostname label: {e}"),
            LabelError::AmbiguousManaged(v) => {
                write!(f, "manage label must be \"true\" or \"false\", got: {v}")
            }
            LabelError::MissingHostname(idx) => {
                write!(f, "record group {idx} has no hostname label")
            }
        }
    }
}

impl std::error::Error for LabelError {}

impl From<LabelError> for crate::error::Error {
    fn from(e: LabelError) -> Self {
        crate::error::Error::validation(e.to_string())
    }
}

/// Parse a container's labels into zero or more `DesiredSpec`s.
///
/// `prefixes` lists the label prefixes recognized as record declarations,
/// tried in order (e.g. `["dns.", "traefik."]`); a container carrying
/// both is expected to be rare, but the first prefix with any matching
/// keys wins per index group.
pub fn parse_container_labels(
    prefixes: &[&str],
    labels: &HashMap<String, String>,
    default_type: RecordType,
) -> Result<Vec<DesiredSpec>, LabelError> {
    // index -> (field -> raw value)
    let mut groups: BTreeMap<String, HashMap<LabelKey, String>> = BTreeMap::new();

    for (key, value) in labels {
        let Some(prefix) = prefixes.iter().find(|p| key.starts_with(**p)) else {
            continue;
        };
        let rest = &key[prefix.len()..];
        let (field, index) = match rest.split_once('.') {
            Some((field, index)) => (field, index.to_string()),
            None => (rest, "0".to_string()),
        };
        let Some(label_key) = LabelKey::parse(field) else {
            return Err(LabelError::UnknownSuffix(key.clone()));
        };
        groups
            .entry(index)
            .or_default()
            .insert(label_key, value.clone());
    }

    let mut specs = Vec::new();
    for (index, fields) in groups {
        if fields.get(&LabelKey::Skip).map(|v| v == "true").unwrap_or(false) {
            continue;
        }
        let Some(hostname) = fields.get(&LabelKey::Hostname) else {
            return Err(LabelError::MissingHostname(index));
        };
        let hostname = normalize_hostname(hostname).map_err(|e| {
            LabelError::InvalidHostname(format!("{hostname}: {e}"))
        })?;

        let record_type = match fields.get(&LabelKey::Type) {
            Some(t) => t
                .parse::<RecordType>()
                .map_err(|_| LabelError::UnknownSuffix(format!("type={t}")))?,
            None => default_type,
        };

        let mut spec = DesiredSpec::new(hostname, record_type, SourceKind::Container);
        spec.content = fields.get(&LabelKey::Content).cloned();

        if let Some(ttl) = fields.get(&LabelKey::Ttl) {
            spec.ttl = Some(parse_field(ttl, "ttl")?);
        }
        if let Some(proxied) = fields.get(&LabelKey::Proxied) {
            spec.proxied = Some(parse_bool_field(proxied, "proxied")?);
        }
        if let Some(priority) = fields.get(&LabelKey::Priority) {
            spec.priority = Some(parse_field(priority, "priority")?);
        }
        if let Some(weight) = fields.get(&LabelKey::Weight) {
            spec.weight = Some(parse_field(weight, "weight")?);
        }
        if let Some(port) = fields.get(&LabelKey::Port) {
            spec.port = Some(parse_field(port, "port")?);
        }
        if let Some(flags) = fields.get(&LabelKey::Flags) {
            spec.flags = Some(parse_field(flags, "flags")?);
        }
        spec.tag = fields.get(&LabelKey::Tag).cloned();

        if let Some(manage) = fields.get(&LabelKey::Manage) {
            spec.managed = parse_managed(manage)?;
        }

        specs.push(spec);
    }

    Ok(specs)
}

fn parse_field<T: std::str::FromStr>(value: &str, field: &str) -> Result<T, LabelError> {
    value.parse::<T>().map_err(|_| LabelError::MalformedInteger {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool_field(value: &str, field: &str) -> Result<bool, LabelError> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(LabelError::MalformedInteger {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

/// `managed` must be exactly (case-insensitively) `"true"` or `"false"`;
/// anything else is rejected rather than coerced.
fn parse_managed(value: &str) -> Result<bool, LabelError> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(LabelError::AmbiguousManaged(other.to_string())),
    }
}
