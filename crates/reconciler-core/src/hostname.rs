//! Hostname normalization and RFC 1035-style syntactic validation.

use crate::error::Error;

/// Lower-case, strip a single trailing dot, and validate as a DNS name:
/// 1-63 octets per label, total length <= 253, labels made of
/// alphanumerics and hyphens, never starting or ending with a hyphen.
pub fn normalize_hostname(raw: &str) -> Result<String, Error> {
    let trimmed = raw.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(Error::validation("hostname must not be empty"));
    }
    let normalized = trimmed.to_ascii_lowercase();
    if normalized.len() > 253 {
        return Err(Error::validation(format!(
            "hostname exceeds 253 octets: {normalized}"
        )));
    }
    for label in normalized.split('.') {
        validate_label(label, &normalized)?;
    }
    Ok(normalized)
}

fn validate_label(label: &str, full: &str) -> Result<(), Error> {
    if label.is_empty() {
        return Err(Error::validation(format!("empty label in hostname: {full}")));
    }
    if label.len() > 63 {
        return Err(Error::validation(format!(
            "label exceeds 63 octets in hostname: {full}"
        )));
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(Error::validation(format!(
            "label cannot start or end with a hyphen: {label} (in {full})"
        )));
    }
    if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(Error::validation(format!(
            "label contains invalid characters: {label} (in {full})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_dot_and_lowercases() {
        assert_eq!(normalize_hostname("App.Example.com.").unwrap(), "app.example.com");
    }

    #[test]
    fn rejects_empty_label() {
        assert!(normalize_hostname("app..example.com").is_err());
    }

    #[test]
    fn rejects_leading_hyphen() {
        assert!(normalize_hostname("-app.example.com").is_err());
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(normalize_hostname("app_name.example.com").is_err());
    }

    #[test]
    fn accepts_plain_name() {
        assert_eq!(normalize_hostname("example.com").unwrap(), "example.com");
    }
}
