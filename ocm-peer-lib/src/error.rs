use crate::compat::ProfileError;
use crate::outbound::OutboundError;
use thiserror::Error;

/// Errors surfaced while setting up or running the federation core
#[derive(Error, Debug)]
pub enum FederationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Outbound error: {0}")]
    Outbound(#[from] OutboundError),

    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

pub type Result<T> = std::result::Result<T, FederationError>;
