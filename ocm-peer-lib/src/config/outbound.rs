use serde::Deserialize;
use std::path::PathBuf;

/// SSRF protection mode for outbound requests
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SsrfMode {
    /// Refuse private, loopback, link-local, multicast and unspecified
    /// targets, both before sending and when dialing
    #[default]
    Strict,
    /// No address checks. Redirect rules still apply.
    /// Only for local development against peers on a private network
    Off,
}

/// Outbound client configuration
///
/// Read once when the client is built and never changed afterwards.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// SSRF protection mode: "strict" or "off"
    /// Default: "strict"
    #[serde(default)]
    pub ssrf_mode: SsrfMode,
    /// Whole-request timeout in milliseconds, body included
    /// Default: 30000 (30 seconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// TCP connect timeout in milliseconds
    /// Default: 10000 (10 seconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Redirect hops followed for unsigned requests
    /// 0 is treated as 1. Signed requests never follow redirects.
    /// Default: 1
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Largest response body accepted by `get_json`, in bytes
    /// Default: 10485760 (10 MiB)
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,
    /// Accept any TLS certificate from peers
    /// Development only, logged as a warning at startup
    /// Default: false
    #[serde(default)]
    pub insecure_skip_verify: bool,
    /// Extra trust anchors: a PEM bundle file (optional)
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    /// Extra trust anchors: every `*.pem` and `*.crt` in this directory (optional)
    #[serde(default)]
    pub ca_dir: Option<PathBuf>,
    /// User-Agent sent to peers
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ssrf_mode: SsrfMode::default(),
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_redirects: default_max_redirects(),
            max_response_bytes: default_max_response_bytes(),
            insecure_skip_verify: false,
            ca_file: None,
            ca_dir: None,
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_max_redirects() -> usize {
    1
}

fn default_max_response_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_user_agent() -> String {
    concat!("ocm-peer/", env!("CARGO_PKG_VERSION")).to_string()
}
