//! Deterministic request fingerprinting (spec.md §3, §4.1).
//!
//! Construction mirrors the teacher's `idempotency::hash_parts`: fold a list
//! of canonical components through a `blake3::Hasher`, separating each part
//! with a byte that cannot appear in any of the inputs once percent-encoded.

use blake3::Hasher;

use crate::request::{Method, Request};

const SEP: u8 = 0x1f;

fn hash_parts(parts: &[&[u8]]) -> String {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part);
        hasher.update(&[SEP]);
    }
    hasher.finalize().to_hex().to_string()
}

/// Percent-encoding canonical form + lowercase scheme/host + sorted query
/// params + dropped fragment (spec.md §4.1).
pub fn canonicalize_url(url: &url::Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);

    let scheme = url.scheme().to_ascii_lowercase();
    let host = url.host_str().unwrap_or("").to_ascii_lowercase();

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let query = if pairs.is_empty() {
        String::new()
    } else {
        let joined = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("?{joined}")
    };

    let port = url
        .port()
        .map(|p| format!(":{p}"))
        .unwrap_or_default();

    format!("{scheme}://{host}{port}{}{query}", url.path())
}

/// The subset of headers a caller has opted into treating as
/// fingerprint-significant (spec.md §4.1 — defaults to empty).
pub fn compute(
    method: Method,
    url: &url::Url,
    body: &[u8],
    significant_headers: &[(&str, &str)],
) -> String {
    let canonical_url = canonicalize_url(url);
    let mut headers = significant_headers.to_vec();
    headers.sort_unstable();

    let mut parts: Vec<&[u8]> = vec![method.as_str().as_bytes(), canonical_url.as_bytes(), body];
    let header_strs: Vec<String> = headers
        .iter()
        .map(|(k, v)| format!("{}:{}", k.to_ascii_lowercase(), v))
        .collect();
    for header in &header_strs {
        parts.push(header.as_bytes());
    }

    hash_parts(&parts)
}

/// Compute the fingerprint of a request using a caller-selected significant
/// header set (most deployments use an empty set, per spec.md §4.1).
pub fn compute_for_request(request: &Request, significant_headers: &[&str]) -> String {
    let headers: Vec<(&str, &str)> = significant_headers
        .iter()
        .filter_map(|name| request.headers.get(name).map(|v| (*name, v)))
        .collect();
    compute(request.method, &request.url, &request.body, &headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> url::Url {
        url::Url::parse(s).unwrap()
    }

    #[test]
    fn fingerprint_is_pure_function_of_canonical_request() {
        let a = compute(Method::Get, &url("HTTP://Example.com/x?b=2&a=1"), b"", &[]);
        let b = compute(Method::Get, &url("http://example.com/x?a=1&b=2"), b"", &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn fragment_is_ignored() {
        let a = compute(Method::Get, &url("http://example.com/x#frag"), b"", &[]);
        let b = compute(Method::Get, &url("http://example.com/x"), b"", &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_method_differs() {
        let a = compute(Method::Get, &url("http://example.com/x"), b"", &[]);
        let b = compute(Method::Post, &url("http://example.com/x"), b"", &[]);
        assert_ne!(a, b);
    }

    #[test]
    fn different_body_differs() {
        let a = compute(Method::Post, &url("http://example.com/x"), b"a", &[]);
        let b = compute(Method::Post, &url("http://example.com/x"), b"b", &[]);
        assert_ne!(a, b);
    }

    #[test]
    fn significant_headers_change_fingerprint() {
        let a = compute(
            Method::Get,
            &url("http://example.com/x"),
            b"",
            &[("accept-language", "en")],
        );
        let b = compute(
            Method::Get,
            &url("http://example.com/x"),
            b"",
            &[("accept-language", "fr")],
        );
        assert_ne!(a, b);
    }
}
