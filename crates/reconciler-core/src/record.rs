//! The DNS record data model, record keys (fingerprints), and per-type
//! content canonicalization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A DNS record type this system understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Txt,
    Srv,
    Caa,
    Ns,
}

impl Default for RecordType {
    /// `dnsDefaultType`'s fallback when the operator leaves it unset
    /// (SPEC_FULL §4.8): a bare A record, same as the container-label
    /// extractor's own per-label default.
    fn default() -> Self {
        RecordType::A
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Mx => "MX",
            RecordType::Txt => "TXT",
            RecordType::Srv => "SRV",
            RecordType::Caa => "CAA",
            RecordType::Ns => "NS",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RecordType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "CNAME" => Ok(RecordType::Cname),
            "MX" => Ok(RecordType::Mx),
            "TXT" => Ok(RecordType::Txt),
            "SRV" => Ok(RecordType::Srv),
            "CAA" => Ok(RecordType::Caa),
            "NS" => Ok(RecordType::Ns),
            other => Err(crate::error::Error::validation(format!(
                "unsupported record type: {other}"
            ))),
        }
    }
}

/// A DNS record as last observed from the provider's authoritative zone
/// listing (C2's cache contents).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Provider-assigned identifier, used for update/delete calls. Empty
    /// for records that exist only as a desired spec not yet created.
    pub id: String,
    pub zone: String,
    pub record_type: RecordType,
    /// Fully-qualified hostname, normalized (lower-case, no trailing dot).
    pub name: String,
    /// Provider's wire-format content (may include surrounding quotes for
    /// TXT, a trailing dot for CNAME on providers that require one, etc).
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
    pub priority: Option<u16>,
    pub weight: Option<u16>,
    pub port: Option<u16>,
    pub flags: Option<u8>,
    pub tag: Option<String>,
}

/// The identity of a record independent of its mutable attributes (TTL,
/// proxied flag): `(provider, zone, type, name, content-discriminator)`.
///
/// Two `Record`s with the same `RecordKey` are the same logical record even
/// if their TTL differs; the reconciler treats such a pair as an update,
/// not a create+delete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub provider: String,
    pub zone: String,
    pub record_type: RecordType,
    pub name: String,
    pub discriminator: String,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.provider, self.zone, self.record_type, self.name, self.discriminator
        )
    }
}

/// Strip a single trailing `.` and lower-case the rest. Idempotent.
pub fn strip_dot_lower(s: &str) -> String {
    s.trim_end_matches('.').to_ascii_lowercase()
}

/// Compute the type-dependent content discriminator used for fingerprinting.
///
/// `content` is expected already stripped of provider wire-formatting
/// (e.g. TXT quotes joined) by the caller — see `provider::normalize`.
pub fn content_discriminator(
    record_type: RecordType,
    content: &str,
    priority: Option<u16>,
    weight: Option<u16>,
    port: Option<u16>,
    flags: Option<u8>,
    tag: Option<&str>,
) -> String {
    match record_type {
        RecordType::A | RecordType::Aaaa | RecordType::Cname | RecordType::Ns => {
            strip_dot_lower(content)
        }
        RecordType::Mx => {
            format!("{}|{}", priority.unwrap_or(0), strip_dot_lower(content))
        }
        RecordType::Srv => format!(
            "{}|{}|{}|{}",
            priority.unwrap_or(0),
            weight.unwrap_or(0),
            port.unwrap_or(0),
            strip_dot_lower(content)
        ),
        RecordType::Txt => unquote_txt(content),
        RecordType::Caa => format!(
            "{}|{}|{}",
            flags.unwrap_or(0),
            tag.unwrap_or(""),
            content
        ),
    }
}

/// Strip a single layer of surrounding double quotes from a TXT value, the
/// way a provider's wire format wraps it. Not a general unescaper: this
/// system treats TXT content as an opaque logical string once unwrapped.
pub fn unquote_txt(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Split a TXT value into provider wire-format chunks of at most 255
/// octets each (the DNS character-string limit), matching Route 53's
/// multi-string TXT handling.
pub fn split_txt_octets(value: &str) -> Vec<String> {
    const MAX: usize = 255;
    if value.len() <= MAX {
        return vec![value.to_string()];
    }
    let bytes = value.as_bytes();
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < bytes.len() {
        let mut end = (start + MAX).min(bytes.len());
        // Don't split a UTF-8 code point across chunks.
        while end < bytes.len() && !value.is_char_boundary(end) {
            end -= 1;
        }
        chunks.push(String::from_utf8_lossy(&bytes[start..end]).to_string());
        start = end;
    }
    chunks
}

/// Compute the `RecordKey` fingerprint for an observed or desired record.
pub fn fingerprint(provider: &str, zone: &str, record: &Record) -> RecordKey {
    let discriminator = content_discriminator(
        record.record_type,
        &record.content,
        record.priority,
        record.weight,
        record.port,
        record.flags,
        record.tag.as_deref(),
    );
    RecordKey {
        provider: provider.to_string(),
        zone: zone.to_string(),
        record_type: record.record_type,
        name: strip_dot_lower(&record.name),
        discriminator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_record_discriminator_is_case_and_dot_insensitive() {
        let d1 = content_discriminator(RecordType::A, "1.2.3.4", None, None, None, None, None);
        let d2 = content_discriminator(RecordType::A, "1.2.3.4.", None, None, None, None, None);
        assert_eq!(d1, d2);
    }

    #[test]
    fn cname_discriminator_ignores_case() {
        let d1 = content_discriminator(
            RecordType::Cname,
            "Target.Example.com.",
            None,
            None,
            None,
            None,
            None,
        );
        assert_eq!(d1, "target.example.com");
    }

    #[test]
    fn mx_discriminator_includes_priority() {
        let low = content_discriminator(
            RecordType::Mx,
            "mail.example.com",
            Some(10),
            None,
            None,
            None,
            None,
        );
        let high = content_discriminator(
            RecordType::Mx,
            "mail.example.com",
            Some(20),
            None,
            None,
            None,
            None,
        );
        assert_ne!(low, high);
    }

    #[test]
    fn txt_discriminator_unwraps_quotes() {
        let quoted = content_discriminator(
            RecordType::Txt,
            "\"v=spf1 -all\"",
            None,
            None,
            None,
            None,
            None,
        );
        assert_eq!(quoted, "v=spf1 -all");
    }

    #[test]
    fn split_txt_octets_respects_255_limit() {
        let long = "a".repeat(600);
        let chunks = split_txt_octets(&long);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= 255));
        assert_eq!(chunks.concat().len(), 600);
    }

    #[test]
    fn split_txt_octets_short_value_single_chunk() {
        assert_eq!(split_txt_octets("short"), vec!["short".to_string()]);
    }
}
