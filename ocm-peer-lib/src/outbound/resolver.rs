use super::error::OutboundError;
use crate::security::ip_filter::{classify_ip, classify_literal_host, normalize_host};
use crate::telemetry::Metrics;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::lookup_host;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub type LookupFuture<'a> = Pin<Box<dyn Future<Output = io::Result<Vec<IpAddr>>> + Send + 'a>>;

/// DNS lookup used for SSRF vetting. Tests substitute their own.
pub trait Resolver: Send + Sync + fmt::Debug {
    fn lookup_ip<'a>(&'a self, host: &'a str) -> LookupFuture<'a>;
}

/// Resolver backed by the operating system (`getaddrinfo` via tokio)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn lookup_ip<'a>(&'a self, host: &'a str) -> LookupFuture<'a> {
        Box::pin(async move {
            let addrs = lookup_host((host, 0)).await?;
            Ok(addrs.map(|a| a.ip()).collect())
        })
    }
}

/// Resolve `host`, giving up as soon as `cancel` fires.
pub async fn resolve_cancellable(
    resolver: &dyn Resolver,
    cancel: &CancellationToken,
    host: &str,
) -> io::Result<Vec<IpAddr>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "dns lookup cancelled",
        )),
        result = resolver.lookup_ip(host) => result,
    }
}

/// Vet a host for SSRF: localhost aliases and IP literals are classified
/// directly, names are resolved and every returned address must be public.
/// A failed or empty lookup is a block.
pub async fn vet_host(
    resolver: &dyn Resolver,
    cancel: &CancellationToken,
    host: &str,
) -> Result<Vec<IpAddr>, OutboundError> {
    let host = normalize_host(host);
    if host.is_empty() {
        return Err(OutboundError::InvalidUrl { url: host, reason: "empty host".to_string() });
    }

    if let Some(verdict) = classify_literal_host(&host) {
        return match verdict {
            Ok(ip) => Ok(vec![ip]),
            Err(reason) => Err(OutboundError::Blocked { ip: host.parse().ok(), host, reason }),
        };
    }

    let addrs = resolve_cancellable(resolver, cancel, &host)
        .await
        .map_err(|source| OutboundError::HostUnresolvable { host: host.clone(), source })?;
    if addrs.is_empty() {
        return Err(OutboundError::HostUnresolvable {
            host,
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
        });
    }

    for ip in &addrs {
        if let Some(reason) = classify_ip(*ip) {
            return Err(OutboundError::Blocked { host, ip: Some(*ip), reason });
        }
    }
    debug!(%host, addrs = addrs.len(), "host vetted");
    Ok(addrs)
}

/// DNS hook for the transport: every connection re-resolves and re-vets
/// its target right before dialing, so a name that rebinds to a private
/// address after the pre-flight check is still refused.
#[derive(Clone)]
pub(crate) struct DialGuard {
    resolver: Arc<dyn Resolver>,
    metrics: Option<Arc<Metrics>>,
}

impl DialGuard {
    pub(crate) fn new(resolver: Arc<dyn Resolver>, metrics: Option<Arc<Metrics>>) -> Self {
        Self { resolver, metrics }
    }
}

impl fmt::Debug for DialGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialGuard").field("resolver", &self.resolver).finish()
    }
}

impl reqwest::dns::Resolve for DialGuard {
    fn resolve(&self, name: reqwest::dns::Name) -> reqwest::dns::Resolving {
        let resolver = Arc::clone(&self.resolver);
        let metrics = self.metrics.clone();
        let host = name.as_str().to_string();
        Box::pin(async move {
            // The transport drops this future when the caller's request is
            // cancelled, so a never-cancelled token is enough here.
            let never = CancellationToken::new();
            match vet_host(resolver.as_ref(), &never, &host).await {
                Ok(ips) => {
                    let addrs: reqwest::dns::Addrs =
                        Box::new(ips.into_iter().map(|ip| SocketAddr::new(ip, 0)));
                    Ok(addrs)
                }
                Err(err) => {
                    warn!(%host, error = %err, "dial-time ssrf check refused connection");
                    if let Some(ref m) = metrics {
                        m.record_outbound_blocked(err.kind().as_str());
                    }
                    Err(Box::new(err) as Box<dyn std::error::Error + Send + Sync>)
                }
            }
        })
    }
}
