//! Tracker override computation.
//!
//! Configured override entries are alias-expanded, stripped of UDP
//! duplicates of HTTP trackers, and injected at tier 0 ahead of the
//! torrent's own announce list. Private torrents are exempt.

use std::collections::{HashMap, HashSet};

use tracing::debug;
use url::Url;

/// Expand one override entry through the alias table.
///
/// An entry that is itself an alias key is replaced wholesale; otherwise,
/// when its hostname matches an alias key, only the host is rewritten.
#[must_use]
pub fn expand_alias(entry: &str, aliases: &HashMap<String, String>) -> String {
    if let Some(replacement) = aliases.get(entry) {
        return replacement.clone();
    }
    let Ok(mut parsed) = Url::parse(entry) else {
        return entry.to_string();
    };
    let Some(host) = parsed.host_str().map(ToString::to_string) else {
        return entry.to_string();
    };
    if let Some(replacement) = aliases.get(&host) {
        if parsed.set_host(Some(replacement)).is_ok() {
            return parsed.to_string();
        }
    }
    entry.to_string()
}

fn host_port(url: &str) -> Option<(String, String, u16)> {
    let parsed = Url::parse(url).ok()?;
    let scheme = parsed.scheme().to_ascii_lowercase();
    let host = parsed.host_str()?.to_ascii_lowercase();
    let port = parsed.port_or_known_default().or_else(|| parsed.port())?;
    Some((scheme, host, port))
}

/// Compute the tier-0 override list.
///
/// `existing` is the torrent's own tracker set, used to detect UDP entries
/// that duplicate an HTTP tracker on the same host:port.
#[must_use]
pub fn override_list(
    add: &[String],
    aliases: &HashMap<String, String>,
    existing: &[String],
) -> Vec<String> {
    let expanded: Vec<String> = add
        .iter()
        .map(|entry| expand_alias(entry, aliases))
        .collect();

    let mut http_pairs: HashSet<(String, u16)> = HashSet::new();
    for url in expanded.iter().chain(existing) {
        if let Some((scheme, host, port)) = host_port(url) {
            if scheme == "http" || scheme == "https" {
                http_pairs.insert((host, port));
            }
        }
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(expanded.len());
    for url in expanded {
        if !seen.insert(url.clone()) {
            continue;
        }
        if let Some((scheme, host, port)) = host_port(&url) {
            if scheme == "udp" && http_pairs.contains(&(host, port)) {
                debug!(url = %url, "dropping udp duplicate of an http tracker");
                continue;
            }
        }
        out.push(url);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(
            "best".to_string(),
            "udp://tracker.example.org:1337/announce".to_string(),
        );
        map.insert("old.example".to_string(), "new.example".to_string());
        map
    }

    #[test]
    fn bare_alias_names_expand_to_full_urls() {
        assert_eq!(
            expand_alias("best", &aliases()),
            "udp://tracker.example.org:1337/announce"
        );
    }

    #[test]
    fn hostnames_are_rewritten_in_place() {
        assert_eq!(
            expand_alias("http://old.example:8080/announce", &aliases()),
            "http://new.example:8080/announce"
        );
        // Unknown hosts pass through untouched.
        assert_eq!(
            expand_alias("http://other.example/announce", &aliases()),
            "http://other.example/announce"
        );
    }

    #[test]
    fn udp_duplicates_of_http_pairs_are_dropped() {
        let add = vec![
            "http://tr.example:6969/announce".to_string(),
            "udp://tr.example:6969/announce".to_string(),
            "udp://solo.example:1337/announce".to_string(),
        ];
        let out = override_list(&add, &HashMap::new(), &[]);
        assert_eq!(
            out,
            vec![
                "http://tr.example:6969/announce",
                "udp://solo.example:1337/announce",
            ]
        );
    }

    #[test]
    fn udp_duplicates_of_existing_http_trackers_are_dropped() {
        let add = vec!["udp://tr.example:6969/announce".to_string()];
        let existing = vec!["http://tr.example:6969/announce".to_string()];
        assert!(override_list(&add, &HashMap::new(), &existing).is_empty());
    }

    #[test]
    fn exact_duplicates_collapse() {
        let add = vec![
            "udp://a.example:1/x".to_string(),
            "udp://a.example:1/x".to_string(),
        ];
        let out = override_list(&add, &HashMap::new(), &[]);
        assert_eq!(out.len(), 1);
    }
}
