//! Extracts the concrete host literals named by a router rule string.
//!
//! Supports `Host(\`a\`, \`b\`)`, `HostRegexp(\`...\`)` (literal alternation
//! only), and `HostSNI(\`a\`)` predicates, combined with `&&`/`||`. Anything
//! else in the rule (`PathPrefix`, `Headers`, ...) is ignored: this
//! extractor only cares what hosts a rule names, not how it routes.

use regex::Regex;
use std::sync::OnceLock;

fn predicate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(Host|HostRegexp|HostSNI)\(([^)]*)\)").expect("static predicate regex is valid")
    })
}

fn backtick_literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([^`]*)`").expect("static literal regex is valid"))
}

/// A plain alternation of literals such as `^(app|api)\.example\.com$`,
/// with no other regex metacharacters. Anchors and escaped dots are the
/// only metacharacters tolerated; anything else means the pattern names
/// more than a finite host set and is skipped.
fn try_expand_literal_alternation(pattern: &str) -> Option<Vec<String>> {
    let inner = pattern.strip_prefix('^')?.strip_suffix('$')?;
    let inner = inner.strip_prefix('(')?.strip_suffix(')')?;

    let mut hosts = Vec::new();
    for alt in inner.split('|') {
        if alt.is_empty() {
            return None;
        }
        let mut host = String::with_capacity(alt.len());
        let mut chars = alt.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some('.') => host.push('.'),
                    _ => return None,
                },
                c if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' => host.push(c),
                _ => return None,
            }
        }
        hosts.push(host);
    }
    Some(hosts)
}

/// Extracts every concrete host literal a rule names, deduplicated and in
/// the order first seen. Returns an empty vec when the rule has no
/// recognizable `Host`/`HostRegexp`/`HostSNI` predicate, or when its only
/// `HostRegexp` is not a finite literal alternation.
pub fn extract_hosts(rule: &str) -> Vec<String> {
    let mut hosts = Vec::new();
    for predicate in predicate_re().captures_iter(rule) {
        let kind = predicate[1].to_ascii_lowercase();
        let args = &predicate[2];
        let literals: Vec<String> = backtick_literal_re()
            .captures_iter(args)
            .map(|c| c[1].to_string())
            .collect();

        if kind == "hostregexp" {
            for pattern in literals {
                if let Some(expanded) = try_expand_literal_alternation(&pattern) {
                    for host in expanded {
                        if !hosts.contains(&host) {
                            hosts.push(host);
                        }
                    }
                }
            }
        } else {
            for host in literals {
                if !hosts.contains(&host) {
                    hosts.push(host);
                }
            }
        }
    }
    hosts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_host() {
        assert_eq!(extract_hosts("Host(`app.example.com`)"), vec!["app.example.com"]);
    }

    #[test]
    fn extracts_multiple_hosts_from_one_predicate() {
        assert_eq!(
            extract_hosts("Host(`a.example.com`, `b.example.com`)"),
            vec!["a.example.com", "b.example.com"]
        );
    }

    #[test]
    fn combines_host_and_other_predicates() {
        let hosts = extract_hosts("Host(`app.example.com`) && PathPrefix(`/api`)");
        assert_eq!(hosts, vec!["app.example.com"]);
    }

    #[test]
    fn hostsni_predicate_is_recognized() {
        assert_eq!(extract_hosts("HostSNI(`app.example.com`)"), vec!["app.example.com"]);
    }

    #[test]
    fn literal_alternation_regexp_expands() {
        let hosts = extract_hosts(r"HostRegexp(`^(app|api)\.example\.com$`)");
        assert_eq!(hosts, vec!["app.example.com", "api.example.com"]);
    }

    #[test]
    fn non_literal_regexp_is_skipped() {
        let hosts = extract_hosts(r"HostRegexp(`^.*\.example\.com$`)");
        assert!(hosts.is_empty());
    }

    #[test]
    fn rule_with_no_host_predicate_yields_nothing() {
        assert!(extract_hosts("PathPrefix(`/metrics`)").is_empty());
    }

    #[test]
    fn duplicate_hosts_are_deduplicated() {
        let hosts = extract_hosts("Host(`app.example.com`) || Host(`app.example.com`)");
        assert_eq!(hosts, vec!["app.example.com"]);
    }
}
