use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;
use std::sync::LazyLock;

/// Why an address or hostname was refused as an outbound federation target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Localhost,
    Loopback,
    Private,
    LinkLocal,
    Unspecified,
    Multicast,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::Localhost => "localhost",
            BlockReason::Loopback => "loopback",
            BlockReason::Private => "private",
            BlockReason::LinkLocal => "link_local",
            BlockReason::Unspecified => "unspecified",
            BlockReason::Multicast => "multicast",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-public ranges, checked in order. Link-local multicast sits before the
/// generic multicast ranges so it is reported as link-local.
static BLOCKED_NETWORKS: LazyLock<Vec<(IpNet, BlockReason)>> = LazyLock::new(|| {
    [
        ("127.0.0.0/8", BlockReason::Loopback),
        ("::1/128", BlockReason::Loopback),
        ("10.0.0.0/8", BlockReason::Private),
        ("172.16.0.0/12", BlockReason::Private),
        ("192.168.0.0/16", BlockReason::Private),
        ("fc00::/7", BlockReason::Private),
        ("169.254.0.0/16", BlockReason::LinkLocal),
        ("fe80::/10", BlockReason::LinkLocal),
        ("224.0.0.0/24", BlockReason::LinkLocal),
        ("ff02::/16", BlockReason::LinkLocal),
        ("224.0.0.0/4", BlockReason::Multicast),
        ("ff00::/8", BlockReason::Multicast),
    ]
    .into_iter()
    .filter_map(|(net, reason)| net.parse::<IpNet>().ok().map(|net| (net, reason)))
    .collect()
});

/// Classify an address. `None` means the address is a public unicast target.
///
/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are classified as the
/// embedded IPv4 address.
pub fn classify_ip(ip: IpAddr) -> Option<BlockReason> {
    let ip = ip.to_canonical();
    if ip.is_unspecified() {
        return Some(BlockReason::Unspecified);
    }
    BLOCKED_NETWORKS
        .iter()
        .find(|(net, _)| net.contains(&ip))
        .map(|(_, reason)| *reason)
}

pub fn is_blocked_ip(ip: IpAddr) -> bool {
    classify_ip(ip).is_some()
}

/// Strip IPv6 brackets and a trailing root dot, lowercase the rest.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Hostnames that always mean "this machine", whatever DNS says.
pub fn is_blocked_hostname(host: &str) -> bool {
    let host = normalize_host(host);
    host == "localhost" || host == "localhost.localdomain"
}

/// Verdict for a host that needs no DNS lookup: a localhost alias or an IP
/// literal. Returns `None` when the host is a name that must be resolved.
pub fn classify_literal_host(host: &str) -> Option<Result<IpAddr, BlockReason>> {
    if is_blocked_hostname(host) {
        return Some(Err(BlockReason::Localhost));
    }
    let host = normalize_host(host);
    let ip = host.parse::<IpAddr>().ok()?;
    Some(match classify_ip(ip) {
        Some(reason) => Err(reason),
        None => Ok(ip),
    })
}
