//! Request-forgery guard for outbound fetches. Hosts are rejected both on
//! the literal form before resolution and on every resolved address.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use esg_core::{EsgError, EsgResult, FetchFailure};

fn disallowed(message: impl Into<String>) -> EsgError {
    EsgError::Fetch {
        reason: FetchFailure::Disallowed,
        message: message.into(),
    }
}

pub fn is_disallowed_ipv4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        // carrier-grade NAT 100.64.0.0/10
        || (octets[0] == 100 && (octets[1] & 0xc0) == 64)
        // reserved 240.0.0.0/4
        || octets[0] >= 240
}

pub fn is_disallowed_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_disallowed_ipv4(mapped);
    }
    let segments = ip.segments();
    ip.is_loopback()
        || ip.is_unspecified()
        // unique local fc00::/7
        || (segments[0] & 0xfe00) == 0xfc00
        // link local fe80::/10
        || (segments[0] & 0xffc0) == 0xfe80
        // multicast ff00::/8
        || (segments[0] & 0xff00) == 0xff00
}

pub fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_disallowed_ipv4(v4),
        IpAddr::V6(v6) => is_disallowed_ipv6(v6),
    }
}

/// Scheme and shape checks alone, without address screening. Used by the
/// fetcher's test hook; production validation is [`validate_url`].
pub fn parse_allowed_scheme(raw: &str) -> EsgResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| disallowed(format!("invalid url: {}", e)))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(disallowed(format!("scheme not allowed: {}", other))),
    }
    if url.host().is_none() {
        return Err(disallowed("url has no host"));
    }
    Ok(url)
}

/// Parses and validates a URL before any network activity: scheme
/// allow-list, hostname sanity, and literal-IP screening.
pub fn validate_url(raw: &str) -> EsgResult<Url> {
    let url = parse_allowed_scheme(raw)?;

    match url.host() {
        None => return Err(disallowed("url has no host")),
        Some(Host::Ipv4(ip)) => {
            if is_disallowed_ipv4(ip) {
                return Err(disallowed(format!("address not allowed: {}", ip)));
            }
        }
        Some(Host::Ipv6(ip)) => {
            if is_disallowed_ipv6(ip) {
                return Err(disallowed(format!("address not allowed: {}", ip)));
            }
        }
        Some(Host::Domain(domain)) => {
            let lower = domain.to_lowercase();
            let bare = lower.trim_end_matches('.');
            if bare == "localhost" || bare.ends_with(".localhost") {
                return Err(disallowed("localhost is not allowed"));
            }
        }
    }

    Ok(url)
}

/// Resolves the host and rejects the URL when any resolved address falls
/// in a private, loopback, link-local or reserved range.
pub async fn resolve_and_check(url: &Url) -> EsgResult<()> {
    // Literal addresses were already screened; no DNS round trip needed.
    match url.host() {
        Some(Host::Ipv4(ip)) => {
            if is_disallowed_ipv4(ip) {
                return Err(disallowed(format!("address not allowed: {}", ip)));
            }
            return Ok(());
        }
        Some(Host::Ipv6(ip)) => {
            if is_disallowed_ipv6(ip) {
                return Err(disallowed(format!("address not allowed: {}", ip)));
            }
            return Ok(());
        }
        _ => {}
    }

    let host = url
        .host_str()
        .ok_or_else(|| disallowed("url has no host"))?;
    let port = url.port_or_known_default().unwrap_or(443);

    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| EsgError::Fetch {
            reason: FetchFailure::Upstream5xx,
            message: format!("dns resolution failed for {}: {}", host, e),
        })?;

    let mut any = false;
    for addr in addrs {
        any = true;
        if is_disallowed_ip(addr.ip()) {
            return Err(disallowed(format!(
                "{} resolves to a disallowed address {}",
                host,
                addr.ip()
            )));
        }
    }
    if !any {
        return Err(EsgError::Fetch {
            reason: FetchFailure::Upstream5xx,
            message: format!("dns resolution returned no addresses for {}", host),
        });
    }
    Ok(())
}

/// Canonical form used for fingerprinting: parsed URL with the fragment
/// stripped (scheme and host already lowercased by the parser).
pub fn canonicalize_url(raw: &str) -> EsgResult<String> {
    let mut url = validate_url(raw)?;
    url.set_fragment(None);
    Ok(url.to_string())
}
