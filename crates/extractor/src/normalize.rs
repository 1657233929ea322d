use url::Url;

/// Canonicalize a URL, optionally resolving it against a base first.
///
/// Returns `None` on: non-http(s) scheme, empty host, malformed input, or an
/// unresolvable relative URL. Two distinct inputs that differ only in
/// fragment, default-port presence, or host case normalize to the same
/// output — this falls out of `url::Url`'s own parsing (it already lowercases
/// scheme/host and collapses `.`/`..` path segments per the WHATWG URL
/// algorithm); normalization here only has to strip the fragment, strip a
/// trailing dot on the host, and strip an explicit default port.
pub fn normalize(raw: &str, base: Option<&str>) -> Option<String> {
    let parsed = match Url::parse(raw) {
        Ok(u) => u,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base_url = Url::parse(base?).ok()?;
            base_url.join(raw).ok()?
        }
        Err(_) => return None,
    };
    normalize_parsed(parsed)
}

fn normalize_parsed(mut url: Url) -> Option<String> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    let host = url.host_str()?;
    if host.is_empty() {
        return None;
    }

    url.set_fragment(None);

    if host.ends_with('.') {
        let trimmed = host.trim_end_matches('.').to_string();
        if trimmed.is_empty() {
            return None;
        }
        url.set_host(Some(&trimmed)).ok()?;
    }

    if let Some(port) = url.port() {
        let default_port = match url.scheme() {
            "http" => Some(80),
            "https" => Some(443),
            _ => None,
        };
        if Some(port) == default_port {
            url.set_port(None).ok()?;
        }
    }

    Some(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_schemes() {
        assert_eq!(normalize("mailto:a@b.com", None), None);
        assert_eq!(normalize("javascript:alert(1)", None), None);
        assert_eq!(normalize("data:text/plain;base64,aGk=", None), None);
    }

    #[test]
    fn resolves_relative_against_base() {
        assert_eq!(
            normalize("/a/b", Some("http://example.com/x/y")),
            Some("http://example.com/a/b".to_string())
        );
    }

    #[test]
    fn relative_without_base_is_rejected() {
        assert_eq!(normalize("/a/b", None), None);
    }

    #[test]
    fn fragment_and_default_port_are_equivalent() {
        let a = normalize("http://EXAMPLE.com:80/a#frag", None);
        let b = normalize("http://example.com/a", None);
        assert_eq!(a, b);
    }

    #[test]
    fn trailing_host_dot_is_stripped() {
        let a = normalize("http://example.com./a", None);
        let b = normalize("http://example.com/a", None);
        assert_eq!(a, b);
    }

    #[test]
    fn dot_segments_collapse() {
        let a = normalize("http://example.com/a/../b/./c", None);
        assert_eq!(a, Some("http://example.com/b/c".to_string()));
    }

    #[test]
    fn empty_host_is_rejected() {
        assert_eq!(normalize("http:///a", None), None);
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert_eq!(normalize("not a url at all", None), None);
    }
}
