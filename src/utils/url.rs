// src/utils/url.rs

//! URL manipulation utilities.

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{AppError, Result};

/// Normalize a page URL into its canonical comparison form.
///
/// Scheme and host are lowercased, default ports and fragments are dropped,
/// and a trailing slash on the path is removed (including the bare root).
///
/// # Examples
/// ```
/// use owlscope::utils::url::normalize;
///
/// assert_eq!(
///     normalize("HTTPS://Example.com/docs/").unwrap(),
///     "https://example.com/docs"
/// );
/// ```
pub fn normalize(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("URL is empty"));
    }

    let mut parsed = Url::parse(trimmed)?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::validation(format!(
            "unsupported URL scheme '{}' in {}",
            parsed.scheme(),
            trimmed
        )));
    }
    if parsed.host_str().is_none() {
        return Err(AppError::validation(format!("URL has no host: {trimmed}")));
    }

    parsed.set_fragment(None);

    let path = parsed.path();
    if path.len() > 1 && path.ends_with('/') {
        let stripped = path.trim_end_matches('/').to_string();
        let stripped = if stripped.is_empty() { "/".to_string() } else { stripped };
        parsed.set_path(&stripped);
    }

    let mut out = parsed.to_string();
    // `Url` always renders an empty path as "/", strip it for the root page
    if parsed.path() == "/" && parsed.query().is_none() && out.ends_with('/') {
        out.pop();
    }
    Ok(out)
}

/// Byte offset where the path begins, i.e. the end of `scheme://authority`.
///
/// Returns the full length when there is no path.
pub fn authority_end(s: &str) -> usize {
    match s.find("://") {
        Some(idx) => {
            let rest = idx + 3;
            s[rest..].find('/').map(|p| rest + p).unwrap_or(s.len())
        }
        None => 0,
    }
}

/// Lowercase the `scheme://authority` prefix, leaving the path untouched.
pub fn lowercase_authority(s: &str) -> String {
    let end = authority_end(s);
    let mut out = s[..end].to_ascii_lowercase();
    out.push_str(&s[end..]);
    out
}

/// Stable short fingerprint of a normalized URL, used as an idempotency key.
pub fn fingerprint(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trailing_slash() {
        assert_eq!(
            normalize("https://example.com/docs/api/").unwrap(),
            "https://example.com/docs/api"
        );
        assert_eq!(
            normalize("https://example.com/").unwrap(),
            "https://example.com"
        );
        assert_eq!(normalize("https://example.com").unwrap(), "https://example.com");
    }

    #[test]
    fn test_normalize_scheme_and_host_case() {
        assert_eq!(
            normalize("HTTP://EXAMPLE.com/Docs").unwrap(),
            "http://example.com/Docs"
        );
    }

    #[test]
    fn test_normalize_drops_fragment_and_default_port() {
        assert_eq!(
            normalize("https://example.com:443/a#section").unwrap(),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_normalize_keeps_query() {
        assert_eq!(
            normalize("https://example.com/search?q=rust").unwrap(),
            "https://example.com/search?q=rust"
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize("").is_err());
        assert!(normalize("not a url").is_err());
        assert!(normalize("ftp://example.com/file").is_err());
    }

    #[test]
    fn test_lowercase_authority() {
        assert_eq!(
            lowercase_authority("HTTPS://Example.COM/Docs/API"),
            "https://example.com/Docs/API"
        );
        assert_eq!(lowercase_authority("HTTPS://Example.COM"), "https://example.com");
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = fingerprint("https://example.com/docs");
        assert_eq!(a, fingerprint("https://example.com/docs"));
        assert_ne!(a, fingerprint("https://example.com/blog"));
        assert_eq!(a.len(), 16);
    }
}
