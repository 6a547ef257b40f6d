use crate::compat::ReasonCode;
use crate::security::ip_filter::BlockReason;
use std::error::Error as StdError;
use std::io;
use std::net::IpAddr;
use thiserror::Error;

/// Errors produced by the safe outbound client
///
/// SSRF and redirect-policy failures are terminal for a call. Use
/// [`OutboundError::is`] to test category membership instead of matching on
/// message text.
#[derive(Debug, Error)]
pub enum OutboundError {
    #[error("ssrf blocked: {host} ({reason})")]
    Blocked { host: String, ip: Option<IpAddr>, reason: BlockReason },

    #[error("ssrf blocked: host unresolvable: {host}: {source}")]
    HostUnresolvable {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("redirect blocked: too many redirects (max {max})")]
    TooManyRedirects { max: usize },

    #[error("redirect blocked: {reason}")]
    RedirectBlocked { reason: String },

    #[error("redirect blocked: signed request must not follow redirect to {location}")]
    SignedNoRedirect { location: String },

    #[error("redirect blocked: target {to} is not the same host as {from}")]
    RedirectNotSameHost { from: String, to: String },

    #[error("redirect blocked: scheme downgrade from {from} to {to}")]
    RedirectDowngrade { from: String, to: String },

    #[error("response body exceeds {limit} bytes")]
    ResponseTooLarge { limit: u64 },

    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build outbound client: {0}")]
    Build(String),
}

/// Flat error categories. Some kinds are members of a broader kind, see
/// [`OutboundErrorKind::parent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundErrorKind {
    Blocked,
    HostUnresolvable,
    TooManyRedirects,
    RedirectBlocked,
    SignedNoRedirect,
    RedirectNotSameHost,
    RedirectDowngrade,
    ResponseTooLarge,
    InvalidUrl,
    Cancelled,
    Transport,
    Build,
}

impl OutboundErrorKind {
    /// The broader category this kind belongs to, if any.
    pub fn parent(self) -> Option<OutboundErrorKind> {
        match self {
            OutboundErrorKind::HostUnresolvable => Some(OutboundErrorKind::Blocked),
            OutboundErrorKind::TooManyRedirects
            | OutboundErrorKind::SignedNoRedirect
            | OutboundErrorKind::RedirectNotSameHost
            | OutboundErrorKind::RedirectDowngrade => Some(OutboundErrorKind::RedirectBlocked),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutboundErrorKind::Blocked => "blocked",
            OutboundErrorKind::HostUnresolvable => "host_unresolvable",
            OutboundErrorKind::TooManyRedirects => "too_many_redirects",
            OutboundErrorKind::RedirectBlocked => "redirect_blocked",
            OutboundErrorKind::SignedNoRedirect => "signed_no_redirect",
            OutboundErrorKind::RedirectNotSameHost => "redirect_not_same_host",
            OutboundErrorKind::RedirectDowngrade => "redirect_downgrade",
            OutboundErrorKind::ResponseTooLarge => "response_too_large",
            OutboundErrorKind::InvalidUrl => "invalid_url",
            OutboundErrorKind::Cancelled => "cancelled",
            OutboundErrorKind::Transport => "transport",
            OutboundErrorKind::Build => "build",
        }
    }
}

impl OutboundError {
    pub fn kind(&self) -> OutboundErrorKind {
        match self {
            OutboundError::Blocked { .. } => OutboundErrorKind::Blocked,
            OutboundError::HostUnresolvable { .. } => OutboundErrorKind::HostUnresolvable,
            OutboundError::TooManyRedirects { .. } => OutboundErrorKind::TooManyRedirects,
            OutboundError::RedirectBlocked { .. } => OutboundErrorKind::RedirectBlocked,
            OutboundError::SignedNoRedirect { .. } => OutboundErrorKind::SignedNoRedirect,
            OutboundError::RedirectNotSameHost { .. } => OutboundErrorKind::RedirectNotSameHost,
            OutboundError::RedirectDowngrade { .. } => OutboundErrorKind::RedirectDowngrade,
            OutboundError::ResponseTooLarge { .. } => OutboundErrorKind::ResponseTooLarge,
            OutboundError::InvalidUrl { .. } => OutboundErrorKind::InvalidUrl,
            OutboundError::Cancelled => OutboundErrorKind::Cancelled,
            OutboundError::Transport { .. } => OutboundErrorKind::Transport,
            OutboundError::Build(_) => OutboundErrorKind::Build,
        }
    }

    /// True when this error is `kind` or a member of it.
    ///
    /// `SignedNoRedirect.is(RedirectBlocked)` and
    /// `HostUnresolvable.is(Blocked)` both hold.
    pub fn is(&self, kind: OutboundErrorKind) -> bool {
        let mut current = Some(self.kind());
        while let Some(k) = current {
            if k == kind {
                return true;
            }
            current = k.parent();
        }
        false
    }

    /// SSRF category: the target host was refused or could not be vetted.
    pub fn is_ssrf(&self) -> bool {
        self.is(OutboundErrorKind::Blocked)
    }

    pub fn is_redirect_policy(&self) -> bool {
        self.is(OutboundErrorKind::RedirectBlocked)
    }

    /// Typed classification, consulted before any message matching.
    pub fn reason_code(&self) -> Option<ReasonCode> {
        if self.is_ssrf() {
            Some(ReasonCode::SsrfBlocked)
        } else {
            None
        }
    }

    /// Rebuild a policy error seen through a borrowed error chain, e.g. one
    /// raised by the dial guard and wrapped by the transport.
    pub(crate) fn clone_policy(&self) -> Option<OutboundError> {
        match self {
            OutboundError::Blocked { host, ip, reason } => {
                Some(OutboundError::Blocked { host: host.clone(), ip: *ip, reason: *reason })
            }
            OutboundError::HostUnresolvable { host, source } => {
                Some(OutboundError::HostUnresolvable {
                    host: host.clone(),
                    source: io::Error::new(source.kind(), source.to_string()),
                })
            }
            _ => None,
        }
    }
}

/// Find the first [`OutboundError`] in an error's `source()` chain.
pub fn find_outbound_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a OutboundError> {
    let mut current: Option<&'a (dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<OutboundError>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}
