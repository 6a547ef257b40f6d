#![forbid(unsafe_code)]

pub mod compat;
pub mod config;
pub mod error;
pub mod outbound;
pub mod security;
pub mod telemetry;

pub use compat::{
    classify, classify_error, ClassifiedError, CompatProfile, ExecuteResult, Orchestrator,
    ProfileRegistry, ReasonCode,
};
pub use config::{load_from_path, ClientConfig, Config, PeerProfilesConfig, SsrfMode};
pub use error::{FederationError, Result};
pub use outbound::{JsonResponse, OutboundError, OutboundErrorKind, RequestIntent, SafeClient};
