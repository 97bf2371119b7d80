use crate::types::{Candidate, HostKind};
use std::collections::HashSet;
use std::net::IpAddr;
use tracing::trace;

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Turn raw endpoint strings into a deduplicated, ordered list of candidates.
///
/// - entries carrying a scheme (`://`) are rejected
/// - surrounding whitespace, commas and quotes plus trailing `' , ; : )` are trimmed
/// - IP literals are kept in canonical form, names keep their first-seen casing
/// - duplicates are detected case-insensitively; the first occurrence wins
/// - anything that is neither an IP literal nor a valid DNS name is dropped
pub fn normalize<I, S>(raw: I) -> Vec<Candidate>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<Candidate> = Vec::new();
    let mut seen = HashSet::new();

    for item in raw {
        let item = item.as_ref();
        let Some((host, kind)) = clean(item) else {
            trace!(entry = item, "dropping malformed candidate");
            continue;
        };
        let key = match kind {
            HostKind::Ip(_) => host.clone(),
            HostKind::Domain => host.to_ascii_lowercase(),
        };
        if !seen.insert(key.clone()) {
            continue;
        }
        out.push(Candidate {
            host,
            key,
            kind,
            seq: out.len(),
        });
    }

    out
}

/// Normalize a single entry, returning its display form and kind.
pub fn clean(raw: &str) -> Option<(String, HostKind)> {
    let s = raw.trim().trim_matches(',').trim();
    if s.is_empty() || s.contains("://") {
        return None;
    }
    let s = s.trim_matches(|c: char| c == '\'' || c == '"' || c == ' ');

    if let Some(ip) = parse_ip(s) {
        return Some((ip.to_string(), HostKind::Ip(ip)));
    }

    let s = s.trim_end_matches(|c: char| matches!(c, '\'' | ',' | ';' | ':' | ')'));
    if let Some(ip) = parse_ip(s) {
        return Some((ip.to_string(), HostKind::Ip(ip)));
    }
    if !is_valid_domain(s) {
        return None;
    }
    let name = s.strip_suffix('.').unwrap_or(s);
    Some((name.to_string(), HostKind::Domain))
}

fn parse_ip(s: &str) -> Option<IpAddr> {
    let inner = s
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(s);
    inner.parse::<IpAddr>().ok()
}

/// DNS name check: total length, label shape and an alphabetic top label.
pub fn is_valid_domain(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_NAME_LEN {
        return false;
    }
    let name = s.strip_suffix('.').unwrap_or(s);
    let labels: Vec<&str> = name.split('.').collect();

    let label_ok = |l: &&str| {
        !l.is_empty()
            && l.len() <= MAX_LABEL_LEN
            && !l.starts_with('-')
            && l.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    };
    if !labels.iter().all(label_ok) {
        return false;
    }

    match labels.last() {
        Some(top) => top.len() >= 2 && top.bytes().all(|b| b.is_ascii_alphabetic()),
        None => false,
    }
}
