use crate::outbound::find_outbound_error;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Why a peer interaction failed. A closed vocabulary: every failure maps to
/// exactly one code, and anything unrecognised is [`ReasonCode::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    SignatureRequired,
    SignatureInvalid,
    DigestMismatch,
    KeyidMismatch,
    KeyNotFound,
    TokenExchangeFailed,
    TokenExpired,
    DiscoveryFailed,
    DiscoveryTimeout,
    PeerCapabilityMissing,
    NetworkError,
    PeerUnreachable,
    SsrfBlocked,
    TlsError,
    ProtocolMismatch,
    UnsupportedVersion,
    Unknown,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 17] = [
        ReasonCode::SignatureRequired,
        ReasonCode::SignatureInvalid,
        ReasonCode::DigestMismatch,
        ReasonCode::KeyidMismatch,
        ReasonCode::KeyNotFound,
        ReasonCode::TokenExchangeFailed,
        ReasonCode::TokenExpired,
        ReasonCode::DiscoveryFailed,
        ReasonCode::DiscoveryTimeout,
        ReasonCode::PeerCapabilityMissing,
        ReasonCode::NetworkError,
        ReasonCode::PeerUnreachable,
        ReasonCode::SsrfBlocked,
        ReasonCode::TlsError,
        ReasonCode::ProtocolMismatch,
        ReasonCode::UnsupportedVersion,
        ReasonCode::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::SignatureRequired => "signature_required",
            ReasonCode::SignatureInvalid => "signature_invalid",
            ReasonCode::DigestMismatch => "digest_mismatch",
            ReasonCode::KeyidMismatch => "keyid_mismatch",
            ReasonCode::KeyNotFound => "key_not_found",
            ReasonCode::TokenExchangeFailed => "token_exchange_failed",
            ReasonCode::TokenExpired => "token_expired",
            ReasonCode::DiscoveryFailed => "discovery_failed",
            ReasonCode::DiscoveryTimeout => "discovery_timeout",
            ReasonCode::PeerCapabilityMissing => "peer_capability_missing",
            ReasonCode::NetworkError => "network_error",
            ReasonCode::PeerUnreachable => "peer_unreachable",
            ReasonCode::SsrfBlocked => "ssrf_blocked",
            ReasonCode::TlsError => "tls_error",
            ReasonCode::ProtocolMismatch => "protocol_mismatch",
            ReasonCode::UnsupportedVersion => "unsupported_version",
            ReasonCode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasonCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReasonCode::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| format!("unknown reason code: {s}"))
    }
}

/// A failure tagged with its reason at the point where it happened
///
/// Raising this directly is preferred over relying on message matching.
#[derive(Debug)]
pub struct ClassifiedError {
    pub reason: ReasonCode,
    pub message: String,
    pub cause: Option<BoxError>,
}

impl ClassifiedError {
    pub fn new(reason: ReasonCode, message: impl Into<String>) -> Self {
        Self { reason, message: message.into(), cause: None }
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl StdError for ClassifiedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

/// Message fragments for errors that carry no typed reason. First match
/// wins, matching is case-insensitive over the whole rendered chain.
const MESSAGE_RULES: &[(&str, ReasonCode)] = &[
    ("missing signature", ReasonCode::SignatureRequired),
    ("signature required", ReasonCode::SignatureRequired),
    ("signature verification failed", ReasonCode::SignatureInvalid),
    ("invalid signature", ReasonCode::SignatureInvalid),
    ("content-digest mismatch", ReasonCode::DigestMismatch),
    ("keyid mismatch", ReasonCode::KeyidMismatch),
    ("public key not found", ReasonCode::KeyNotFound),
    ("token exchange failed", ReasonCode::TokenExchangeFailed),
    ("token expired", ReasonCode::TokenExpired),
    ("discovery failed", ReasonCode::DiscoveryFailed),
    ("discovery timeout", ReasonCode::DiscoveryTimeout),
    ("capability not found", ReasonCode::PeerCapabilityMissing),
    ("connection refused", ReasonCode::NetworkError),
    ("no such host", ReasonCode::NetworkError),
    ("peer unreachable", ReasonCode::PeerUnreachable),
    ("ssrf blocked", ReasonCode::SsrfBlocked),
    ("private ip blocked", ReasonCode::SsrfBlocked),
    ("tls handshake", ReasonCode::TlsError),
    ("certificate verify failed", ReasonCode::TlsError),
    ("protocol mismatch", ReasonCode::ProtocolMismatch),
    ("unsupported version", ReasonCode::UnsupportedVersion),
];

/// Classify a failure. `None` means there was no failure.
pub fn classify_error(err: Option<&(dyn StdError + 'static)>) -> Option<ReasonCode> {
    err.map(classify)
}

/// Classify a failure into exactly one [`ReasonCode`].
///
/// A [`ClassifiedError`] anywhere in the `source()` chain wins, however it
/// was wrapped. SSRF refusals from the outbound client are read from their
/// type next. Only then is the rendered message matched against
/// `MESSAGE_RULES`, which is tied to upstream wording and can drift.
pub fn classify(err: &(dyn StdError + 'static)) -> ReasonCode {
    if let Some(classified) = find_classified(err) {
        return classified.reason;
    }
    if let Some(code) = find_outbound_error(err).and_then(|e| e.reason_code()) {
        return code;
    }
    classify_message(&render_chain(err))
}

pub fn classify_message(message: &str) -> ReasonCode {
    let message = message.to_lowercase();
    MESSAGE_RULES
        .iter()
        .find(|(needle, _)| message.contains(needle))
        .map(|(_, code)| *code)
        .unwrap_or(ReasonCode::Unknown)
}

pub fn find_classified<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a ClassifiedError> {
    let mut current: Option<&'a (dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<ClassifiedError>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}

/// `outer: inner: innermost`, so wrapped causes take part in matching.
fn render_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        rendered.push_str(": ");
        rendered.push_str(&e.to_string());
        current = e.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("creating share with {peer}")]
    struct ShareError {
        peer: String,
        #[source]
        source: BoxError,
    }

    #[test]
    fn test_nil_is_no_failure() {
        assert_eq!(classify_error(None), None);
    }

    #[test]
    fn test_plain_message_fallback() {
        let err = io::Error::other("connection refused");
        assert_eq!(classify(&err), ReasonCode::NetworkError);
        let dyn_err: &(dyn StdError + 'static) = &err;
        assert_eq!(classify_error(Some(dyn_err)), Some(ReasonCode::NetworkError));
    }

    #[test]
    fn test_message_match_is_case_insensitive() {
        assert_eq!(classify_message("Invalid Signature on request"), ReasonCode::SignatureInvalid);
        assert_eq!(classify_message("TLS HANDSHAKE eof"), ReasonCode::TlsError);
    }

    #[test]
    fn test_rule_order_first_match_wins() {
        assert_eq!(
            classify_message("missing signature, token expired"),
            ReasonCode::SignatureRequired
        );
    }

    #[test]
    fn test_unrecognised_is_unknown() {
        let err = io::Error::other("the peer sent a teapot");
        assert_eq!(classify(&err), ReasonCode::Unknown);
    }

    #[test]
    fn test_wrapped_classified_error_keeps_reason() {
        let inner = ClassifiedError::new(ReasonCode::TokenExpired, "refresh token rejected");
        let err = ShareError { peer: "cloud.example.org".into(), source: Box::new(inner) };
        assert_eq!(classify(&err), ReasonCode::TokenExpired);
    }

    #[test]
    fn test_typed_reason_beats_message_text() {
        let err = ClassifiedError::new(ReasonCode::KeyNotFound, "connection refused while fetching key");
        assert_eq!(classify(&err), ReasonCode::KeyNotFound);
    }

    #[test]
    fn test_message_in_source_chain_is_matched() {
        let err = ShareError {
            peer: "cloud.example.org".into(),
            source: Box::new(io::Error::other("content-digest mismatch")),
        };
        assert_eq!(classify(&err), ReasonCode::DigestMismatch);
    }

    #[test]
    fn test_classified_error_rendering() {
        let err = ClassifiedError::new(ReasonCode::DiscoveryFailed, "no ocm endpoint");
        assert_eq!(err.to_string(), "discovery_failed: no ocm endpoint");
        assert!(err.source().is_none());

        let err = err.with_cause(io::Error::other("404"));
        assert_eq!(err.to_string(), "discovery_failed: no ocm endpoint: 404");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_reason_code_round_trip_names() {
        for code in ReasonCode::ALL {
            assert_eq!(code.as_str().parse::<ReasonCode>(), Ok(code));
        }
        assert!("".parse::<ReasonCode>().is_err());
    }
}
