use super::reason::ReasonCode;
use serde::Deserialize;

pub const ACCEPT_PLAIN_TOKEN: &str = "accept_plain_token";
pub const SEND_TOKEN_IN_BODY: &str = "send_token_in_body";
pub const SKIP_DIGEST_VALIDATION: &str = "skip_digest_validation";
pub const ALLOW_UNSIGNED_DISCOVERY: &str = "allow_unsigned_discovery";
pub const ALLOW_KEYID_MISMATCH: &str = "allow_keyid_mismatch";

/// A named workaround and the failures it may be tried for
///
/// Only a declaration: what the quirk does is up to the quirk callback the
/// caller hands to the orchestrator, dispatched on `name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quirk {
    pub name: &'static str,
    pub applies_to: &'static [ReasonCode],
}

impl Quirk {
    pub fn applies_to(&self, reason: ReasonCode) -> bool {
        self.applies_to.contains(&reason)
    }
}

/// Built-in catalog. Every entry declares at least one reason and none
/// declares `unknown`.
pub const CATALOG: &[Quirk] = &[
    Quirk { name: ACCEPT_PLAIN_TOKEN, applies_to: &[ReasonCode::SignatureRequired] },
    Quirk { name: SEND_TOKEN_IN_BODY, applies_to: &[ReasonCode::TokenExchangeFailed] },
    Quirk { name: SKIP_DIGEST_VALIDATION, applies_to: &[ReasonCode::DigestMismatch] },
    Quirk {
        name: ALLOW_UNSIGNED_DISCOVERY,
        applies_to: &[ReasonCode::DiscoveryFailed, ReasonCode::DiscoveryTimeout],
    },
    Quirk { name: ALLOW_KEYID_MISMATCH, applies_to: &[ReasonCode::KeyidMismatch] },
];

pub fn lookup_quirk(name: &str) -> Option<Quirk> {
    CATALOG.iter().find(|q| q.name == name).copied()
}

/// Relaxations read by inbound handlers for peers on this profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileFlags {
    /// Accept inbound requests from this peer without a message signature
    #[serde(default)]
    pub allow_unsigned_inbound: bool,
    /// Send outbound requests to this peer without signing them
    #[serde(default)]
    pub allow_unsigned_outbound: bool,
    /// Accept a signing key whose host differs from the declared sender
    #[serde(default)]
    pub allow_mismatched_host: bool,
    /// Permit plain `http` endpoints advertised by this peer
    #[serde(default)]
    pub allow_http: bool,
    /// Accept shares without the must-exchange-token requirement
    #[serde(default)]
    pub relax_must_exchange_token: bool,
}

impl ProfileFlags {
    pub fn all() -> Self {
        Self {
            allow_unsigned_inbound: true,
            allow_unsigned_outbound: true,
            allow_mismatched_host: true,
            allow_http: true,
            relax_must_exchange_token: true,
        }
    }
}

/// A named, ordered set of quirks plus behaviour flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatProfile {
    pub name: String,
    pub quirks: Vec<Quirk>,
    pub flags: ProfileFlags,
}

pub const STRICT_PROFILE: &str = "strict";

impl CompatProfile {
    /// The default for every unmapped peer: no quirks, no relaxations.
    pub fn strict() -> Self {
        Self { name: STRICT_PROFILE.to_string(), quirks: Vec::new(), flags: ProfileFlags::default() }
    }

    pub fn is_strict(&self) -> bool {
        self.quirks.is_empty() && self.flags == ProfileFlags::default()
    }

    /// First quirk, in declaration order, that covers `reason`.
    pub fn quirk_for(&self, reason: ReasonCode) -> Option<&Quirk> {
        self.quirks.iter().find(|q| q.applies_to(reason))
    }

    pub fn has_quirk(&self, name: &str) -> bool {
        self.quirks.iter().any(|q| q.name == name)
    }
}

fn catalog_subset(names: &[&str]) -> Vec<Quirk> {
    names.iter().filter_map(|name| lookup_quirk(name)).collect()
}

/// Profiles shipped with the server, besides the implicit strict one.
pub fn builtin_profiles() -> Vec<CompatProfile> {
    vec![
        CompatProfile {
            name: "nextcloud".to_string(),
            quirks: catalog_subset(&[
                ACCEPT_PLAIN_TOKEN,
                SEND_TOKEN_IN_BODY,
                ALLOW_UNSIGNED_DISCOVERY,
            ]),
            flags: ProfileFlags { relax_must_exchange_token: true, ..ProfileFlags::default() },
        },
        CompatProfile {
            name: "owncloud".to_string(),
            quirks: catalog_subset(&[
                ACCEPT_PLAIN_TOKEN,
                SKIP_DIGEST_VALIDATION,
                ALLOW_KEYID_MISMATCH,
            ]),
            flags: ProfileFlags { allow_mismatched_host: true, ..ProfileFlags::default() },
        },
        CompatProfile { name: "dev".to_string(), quirks: CATALOG.to_vec(), flags: ProfileFlags::all() },
    ]
}
