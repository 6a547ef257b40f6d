mod loader;
mod outbound;
mod profiles;
mod root;
mod telemetry;
mod validator;

pub use loader::{load_from_path, parse};
pub use outbound::{ClientConfig, SsrfMode};
pub use profiles::{CustomProfileConfig, PeerProfilesConfig, ProfileMapping};
pub use root::Config;
pub use telemetry::LoggingConfig;
pub use validator::validate;
