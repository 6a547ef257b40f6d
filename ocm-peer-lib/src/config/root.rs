use serde::Deserialize;

use super::outbound::ClientConfig;
use super::profiles::PeerProfilesConfig;
use super::telemetry::LoggingConfig;

/// Main configuration structure
///
/// Every section is optional, an empty file yields the defaults.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Outbound client settings
    #[serde(default)]
    pub outbound: ClientConfig,
    /// Host pattern to compatibility profile mappings and custom profiles
    #[serde(default)]
    pub peer_profiles: PeerProfilesConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}
