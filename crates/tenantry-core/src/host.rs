//! Host header normalization.
//!
//! Turns a raw `Host` / `X-Forwarded-Host` value into the canonical key used
//! for domain lookups:
//!
//! 1. take the first comma-separated token (proxies may append their own)
//! 2. strip a trailing `:port`
//! 3. lowercase
//! 4. strip one leading `www.`
//! 5. accept only `localhost`, a dotted domain or a dotted IPv4 literal

/// Normalize a raw host header value.
///
/// Returns `None` when the value is absent, empty, or does not look like a
/// host this service could have a domain mapping for. Callers treat `None`
/// as "unresolvable".
#[must_use]
pub fn normalize_host(raw: Option<&str>) -> Option<String> {
    let first = raw?.split(',').next()?.trim();
    if first.is_empty() {
        return None;
    }

    let without_port = strip_port(first);
    let lowered = without_port.to_ascii_lowercase();
    let host = lowered.strip_prefix("www.").unwrap_or(&lowered);

    if host == "localhost" || is_dotted_domain(host) || is_dotted_ipv4(host) {
        Some(host.to_string())
    } else {
        None
    }
}

fn strip_port(value: &str) -> &str {
    match value.rsplit_once(':') {
        Some((head, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => head,
        _ => value,
    }
}

/// `label(.label)*.tld` with labels drawn from `[a-z0-9-]`.
fn is_dotted_domain(host: &str) -> bool {
    let Some((head, tld)) = host.rsplit_once('.') else {
        return false;
    };
    !head.is_empty()
        && !tld.is_empty()
        && head
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
        && tld
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

fn is_dotted_ipv4(host: &str) -> bool {
    host.contains('.') && host.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_strips_port_and_www() {
        assert_eq!(
            normalize_host(Some("WWW.Shop.Example.Test:8443")),
            Some("shop.example.test".to_string())
        );
    }

    #[test]
    fn takes_first_forwarded_value() {
        assert_eq!(
            normalize_host(Some(" acme.localhost:3000 , proxy.internal")),
            Some("acme.localhost".to_string())
        );
    }

    #[test]
    fn accepts_localhost_and_ipv4() {
        assert_eq!(normalize_host(Some("localhost:3000")), Some("localhost".to_string()));
        assert_eq!(normalize_host(Some("127.0.0.1:8080")), Some("127.0.0.1".to_string()));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(normalize_host(None), None);
        assert_eq!(normalize_host(Some("")), None);
        assert_eq!(normalize_host(Some(" , x.test")), None);
        assert_eq!(normalize_host(Some("intranet")), None);
        assert_eq!(normalize_host(Some("bad_host.example")), None);
        assert_eq!(normalize_host(Some("shop.example.")), None);
        assert_eq!(normalize_host(Some("[::1]:3000")), None);
    }

    #[test]
    fn only_one_www_prefix_is_stripped() {
        assert_eq!(
            normalize_host(Some("www.www.example.test")),
            Some("www.example.test".to_string())
        );
    }
}
