use prometheus::{Encoder, TextEncoder};

use crate::error::{FederationError, Result};

/// Render the registry in the Prometheus text exposition format.
pub fn encode_metrics(registry: &prometheus::Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| FederationError::Telemetry(format!("Failed to encode metrics: {e}")))?;

    String::from_utf8(buffer)
        .map_err(|e| FederationError::Telemetry(format!("Metrics are not valid UTF-8: {e}")))
}
