pub mod orchestrator;
pub mod pattern;
pub mod quirk;
pub mod reason;
pub mod registry;

pub use orchestrator::{ExecuteResult, Orchestrator};
pub use pattern::HostPattern;
pub use quirk::{CompatProfile, ProfileFlags, Quirk, CATALOG, STRICT_PROFILE};
pub use reason::{
    classify, classify_error, classify_message, find_classified, BoxError, ClassifiedError,
    ReasonCode,
};
pub use registry::{ProfileError, ProfileRegistry};
