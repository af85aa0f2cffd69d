//! URL normalization and domain allowlist checks used for frontier
//! membership tests.

use url::Url;

/// Normalizes a URL for visited-set membership: scheme + host (+ port) +
/// path with the trailing slash stripped, query preserved, fragment dropped.
///
/// Normalization is idempotent: normalizing an already-normalized URL yields
/// the same string.
pub fn normalize_url(raw: &str) -> Result<String, url::ParseError> {
    let parsed = Url::parse(raw)?;
    let host = parsed.host_str().unwrap_or_default();
    let mut normalized = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        normalized.push(':');
        normalized.push_str(&port.to_string());
    }
    normalized.push_str(parsed.path().trim_end_matches('/'));
    if let Some(query) = parsed.query() {
        normalized.push('?');
        normalized.push_str(query);
    }
    Ok(normalized)
}

/// Resolves `href` against `base` and normalizes the result.
///
/// Returns `None` for unparseable links and non-HTTP schemes
/// (`mailto:`, `javascript:`, ...).
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let absolute = base.join(href).ok()?;
    if !matches!(absolute.scheme(), "http" | "https") {
        return None;
    }
    normalize_url(absolute.as_str()).ok()
}

/// Checks whether a URL's host is admitted by the allowlist.
///
/// An absent allowlist admits everything. Membership is substring-of-host,
/// so allowlisting `x.com` admits `sub.x.com` but also `evil-x.com`.
pub fn is_allowed_domain(url: &str, allowlist: Option<&[String]>) -> bool {
    let Some(allowlist) = allowlist else {
        return true;
    };
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    allowlist.iter().any(|allowed| host.contains(allowed.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_stripped() {
        assert_eq!(
            normalize_url("https://x.com/p/").unwrap(),
            normalize_url("https://x.com/p").unwrap()
        );
    }

    #[test]
    fn fragment_dropped_query_preserved() {
        let normalized = normalize_url("https://x.com/p?a=1#section").unwrap();
        assert_eq!(normalized, "https://x.com/p?a=1");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_url("https://X.com/a/b/?q=2#frag").unwrap();
        let twice = normalize_url(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn port_survives_normalization() {
        assert_eq!(
            normalize_url("http://localhost:8080/docs/").unwrap(),
            "http://localhost:8080/docs"
        );
    }

    #[test]
    fn relative_links_resolve_against_base() {
        let base = Url::parse("https://x.com/docs/intro").unwrap();
        assert_eq!(
            resolve_link(&base, "../guide/").unwrap(),
            "https://x.com/guide"
        );
        assert!(resolve_link(&base, "mailto:team@x.com").is_none());
        assert!(resolve_link(&base, "javascript:void(0)").is_none());
    }

    #[test]
    fn allowlist_is_substring_of_host() {
        let allow = vec!["x.com".to_string()];
        assert!(is_allowed_domain("https://x.com/p", Some(&allow)));
        assert!(is_allowed_domain("https://docs.x.com/p", Some(&allow)));
        assert!(is_allowed_domain("https://evil-x.com/p", Some(&allow)));
        assert!(!is_allowed_domain("https://y.com/p", Some(&allow)));
        assert!(is_allowed_domain("https://anything.dev/p", None));
    }
}
