use super::error::OutboundError;
use http::header::{ACCEPT, LOCATION, USER_AGENT};
use http::HeaderMap;
use reqwest::Url;

/// A configured limit of zero still allows a single hop.
pub fn effective_max_redirects(configured: usize) -> usize {
    configured.max(1)
}

/// Explicit port, else the scheme default. `https://h:443` and `https://h`
/// have the same effective port.
pub fn effective_port(url: &Url) -> Option<u16> {
    url.port_or_known_default()
}

pub fn same_host(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(ha), Some(hb)) => {
            ha.eq_ignore_ascii_case(hb) && effective_port(a) == effective_port(b)
        }
        _ => false,
    }
}

/// `https` may only be followed by `https`. `http -> https` is an upgrade.
pub fn is_downgrade(from: &Url, to: &Url) -> bool {
    from.scheme() == "https" && to.scheme() != "https"
}

/// Validate one redirect hop for an unsigned request and return its target.
///
/// `hops_taken` counts redirects already followed for this logical request.
/// The SSRF check on the returned target is the caller's job, it needs the
/// resolver and the cancellation token.
pub fn next_hop(
    current: &Url,
    response_headers: &HeaderMap,
    hops_taken: usize,
    max_redirects: usize,
) -> Result<Url, OutboundError> {
    let max = effective_max_redirects(max_redirects);
    if hops_taken >= max {
        return Err(OutboundError::TooManyRedirects { max });
    }

    let location = response_headers
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OutboundError::RedirectBlocked {
            reason: "missing or unreadable Location header".to_string(),
        })?;

    let target = current.join(location).map_err(|e| OutboundError::RedirectBlocked {
        reason: format!("invalid Location {location:?}: {e}"),
    })?;

    if is_downgrade(current, &target) {
        return Err(OutboundError::RedirectDowngrade {
            from: current.to_string(),
            to: target.to_string(),
        });
    }
    if !matches!(target.scheme(), "http" | "https") {
        return Err(OutboundError::RedirectBlocked {
            reason: format!("unsupported redirect scheme {:?}", target.scheme()),
        });
    }
    if !same_host(current, &target) {
        return Err(OutboundError::RedirectNotSameHost {
            from: origin_of(current),
            to: origin_of(&target),
        });
    }

    Ok(target)
}

/// Headers allowed across a hop. Credentials, cookies and signatures stay
/// behind.
pub fn carry_headers(original: &HeaderMap) -> HeaderMap {
    let mut carried = HeaderMap::new();
    for name in [USER_AGENT, ACCEPT] {
        for value in original.get_all(&name) {
            carried.append(name.clone(), value.clone());
        }
    }
    carried
}

fn origin_of(url: &Url) -> String {
    match (url.host_str(), effective_port(url)) {
        (Some(host), Some(port)) => format!("{}://{host}:{port}", url.scheme()),
        (Some(host), None) => format!("{}://{host}", url.scheme()),
        _ => url.to_string(),
    }
}
