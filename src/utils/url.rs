// src/utils/url.rs

//! URL manipulation utilities.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static EVENT_ID: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)/events/([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})").ok()
});

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Extract the event identifier (a UUID path segment) from an event URL.
///
/// # Examples
/// ```
/// use harvester::utils::url::extract_event_id;
///
/// assert_eq!(
///     extract_event_id("https://www.flowagility.com/zone/events/0f8fad5b-d9cb-469f-a165-70867728950e/info"),
///     Some("0f8fad5b-d9cb-469f-a165-70867728950e".to_string())
/// );
/// ```
pub fn extract_event_id(url: &str) -> Option<String> {
    let caps = EVENT_ID.as_ref()?.captures(url)?;
    caps.get(1).map(|m| m.as_str().to_lowercase())
}

/// Reduce an event URL to a comparison key.
///
/// Drops query and fragment, lowercases scheme and host, then strips
/// trailing slashes and any trailing path segments listed in `trailing`
/// (e.g. `info`, `participants_list`). Strings that do not parse as URLs
/// get the same treatment textually.
pub fn normalize_event_url(raw: &str, trailing: &[String]) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let (prefix, path) = match Url::parse(raw) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default().to_lowercase();
            let port = parsed.port().map(|p| format!(":{p}")).unwrap_or_default();
            (
                format!("{}://{}{}", parsed.scheme(), host, port),
                parsed.path().to_string(),
            )
        }
        Err(_) => {
            let bare = raw.split(['?', '#']).next().unwrap_or_default();
            (String::new(), bare.to_string())
        }
    };

    let mut segments: Vec<&str> = path.split('/').collect();
    while let Some(last) = segments.last() {
        if last.is_empty() || trailing.iter().any(|t| t.eq_ignore_ascii_case(last)) {
            segments.pop();
        } else {
            break;
        }
    }

    let key = format!("{}{}", prefix, segments.join("/"));
    if key.is_empty() { None } else { Some(key) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trailing() -> Vec<String> {
        ["info", "participants_list"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://example.com/zone/events").unwrap();
        assert_eq!(
            resolve_url(&base, "/zone/events/abc/info"),
            "https://example.com/zone/events/abc/info"
        );
        assert_eq!(
            resolve_url(&base, "https://other.com/x"),
            "https://other.com/x"
        );
    }

    #[test]
    fn test_extract_event_id() {
        assert_eq!(
            extract_event_id("https://x.com/zone/events/0F8FAD5B-D9CB-469F-A165-70867728950E"),
            Some("0f8fad5b-d9cb-469f-a165-70867728950e".to_string())
        );
        assert_eq!(extract_event_id("https://x.com/zone/events/open-2025"), None);
    }

    #[test]
    fn test_normalize_info_and_participants_agree() {
        let a = normalize_event_url(
            "https://WWW.Example.com/zone/events/abc/participants_list?page=2#top",
            &trailing(),
        );
        let b = normalize_event_url("https://www.example.com/zone/events/abc/info/", &trailing());
        assert_eq!(a, Some("https://www.example.com/zone/events/abc".to_string()));
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_non_url_and_blank() {
        assert_eq!(
            normalize_event_url("/zone/events/abc/info?x=1", &trailing()),
            Some("/zone/events/abc".to_string())
        );
        assert_eq!(normalize_event_url("   ", &trailing()), None);
    }
}
