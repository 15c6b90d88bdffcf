use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("invalid pairing endpoint {endpoint:?}: {reason}")]
    Invalid { endpoint: String, reason: String },
    #[error("unsupported pairing endpoint scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("no pairing endpoint configured and no page host to derive one from")]
    Unconfigured,
}

/// Where the embedding page is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOrigin {
    /// Host, optionally with a port (`app.example.com:8443`)
    pub host: String,
    /// Whether the page itself is served over https
    pub secure: bool,
}

/// Work out the WebSocket URL of the pairing backend.
///
/// An explicit endpoint wins: `ws`/`wss` URLs are used as-is and `http`/`https`
/// URLs get the matching duplex scheme. Without one, the URL is built from
/// the page host and `port`.
pub fn resolve_endpoint(
    explicit: Option<&str>,
    page: Option<&PageOrigin>,
    port: u16,
) -> Result<Url, EndpointError> {
    if let Some(raw) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        let mut url = Url::parse(raw).map_err(|e| EndpointError::Invalid {
            endpoint: raw.to_string(),
            reason: e.to_string(),
        })?;
        let scheme = match url.scheme() {
            "ws" | "wss" => return Ok(url),
            "http" => "ws",
            "https" => "wss",
            other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
        };
        url.set_scheme(scheme).map_err(|_| EndpointError::Invalid {
            endpoint: raw.to_string(),
            reason: format!("cannot switch scheme to {scheme}"),
        })?;
        return Ok(url);
    }

    let page = page.ok_or(EndpointError::Unconfigured)?;
    let host = strip_port(page.host.trim());
    if host.is_empty() {
        return Err(EndpointError::Unconfigured);
    }
    let scheme = if page.secure { "wss" } else { "ws" };
    let derived = format!("{scheme}://{host}:{port}/");
    Url::parse(&derived).map_err(|e| EndpointError::Invalid {
        endpoint: derived.clone(),
        reason: e.to_string(),
    })
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // bracketed IPv6 literal
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(host: &str, secure: bool) -> PageOrigin {
        PageOrigin {
            host: host.to_string(),
            secure,
        }
    }

    #[test]
    fn explicit_duplex_urls_are_used_verbatim() {
        let url = resolve_endpoint(Some("wss://pair.example.com:9000/link"), None, 1).unwrap();
        assert_eq!(url.as_str(), "wss://pair.example.com:9000/link");
    }

    #[test]
    fn http_schemes_are_mapped() {
        let url = resolve_endpoint(Some("http://localhost:3001/ws"), None, 1).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:3001/ws");
        let url = resolve_endpoint(Some("https://pair.example.com/ws"), None, 1).unwrap();
        assert_eq!(url.as_str(), "wss://pair.example.com/ws");
    }

    #[test]
    fn derives_from_page_host() {
        let url = resolve_endpoint(None, Some(&page("app.example.com:8443", true)), 3001).unwrap();
        assert_eq!(url.as_str(), "wss://app.example.com:3001/");
        let url = resolve_endpoint(None, Some(&page("localhost", false)), 4000).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:4000/");
        let url = resolve_endpoint(None, Some(&page("[::1]:8080", false)), 3001).unwrap();
        assert_eq!(url.as_str(), "ws://[::1]:3001/");
    }

    #[test]
    fn blank_explicit_endpoint_falls_back_to_page() {
        let url = resolve_endpoint(Some("  "), Some(&page("example.com", false)), 3001).unwrap();
        assert_eq!(url.as_str(), "ws://example.com:3001/");
    }

    #[test]
    fn rejects_unusable_configuration() {
        assert_eq!(
            resolve_endpoint(Some("ftp://example.com"), None, 1),
            Err(EndpointError::UnsupportedScheme("ftp".to_string()))
        );
        assert_eq!(resolve_endpoint(None, None, 1), Err(EndpointError::Unconfigured));
        assert_eq!(
            resolve_endpoint(None, Some(&page(" ", false)), 1),
            Err(EndpointError::Unconfigured)
        );
        assert!(matches!(
            resolve_endpoint(Some("not a url"), None, 1),
            Err(EndpointError::Invalid { .. })
        ));
    }
}
