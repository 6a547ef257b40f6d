use crate::compat::ProfileFlags;
use serde::Deserialize;
use std::collections::BTreeMap;

/// One host pattern to profile assignment
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ProfileMapping {
    /// Exact host or glob, e.g. "*.nextcloud.com"
    pub pattern: String,
    /// A built-in profile ("nextcloud", "owncloud", "dev"), "strict", or a
    /// name from `custom_profiles`
    #[serde(alias = "profile")]
    pub profile_name: String,
}

/// A profile defined in configuration
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct CustomProfileConfig {
    /// Quirk names from the catalog, tried in this order
    #[serde(default)]
    pub quirks: Vec<String>,
    /// Behaviour flags, written inline next to `quirks`
    #[serde(flatten)]
    pub flags: ProfileFlags,
}

/// Peer compatibility profiles
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PeerProfilesConfig {
    /// Tried in order, first match wins. Unmatched peers are strict.
    #[serde(default)]
    pub mappings: Vec<ProfileMapping>,
    #[serde(default)]
    pub custom_profiles: BTreeMap<String, CustomProfileConfig>,
}
