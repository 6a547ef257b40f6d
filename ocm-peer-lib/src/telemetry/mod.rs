pub mod metrics;
pub mod metrics_handler;
pub mod tracing;

pub use metrics::{init_metrics, Metrics};
pub use metrics_handler::encode_metrics;
pub use self::tracing::init_tracing;
