use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;

pub mod labels {
    pub const REASON: &str = "reason";
    pub const KIND: &str = "kind";
    pub const SIGNED: &str = "signed";
    pub const OUTCOME: &str = "outcome";
    pub const QUIRK: &str = "quirk";
    pub const VERSION: &str = "version";
    pub const RUST_VERSION: &str = "rust_version";
}

pub mod values {
    pub const OUTCOME_STRICT_OK: &str = "strict_ok";
    pub const OUTCOME_QUIRK_OK: &str = "quirk_ok";
    pub const OUTCOME_QUIRK_FAILED: &str = "quirk_failed";
    pub const OUTCOME_NO_QUIRK: &str = "no_quirk";
}

#[derive(Clone)]
pub struct Metrics {
    pub outbound_requests_total: Counter<u64>,
    pub outbound_blocked_total: Counter<u64>,

    // Redirect policy
    pub redirects_followed_total: Counter<u64>,
    pub redirects_refused_total: Counter<u64>,

    pub response_too_large_total: Counter<u64>,

    // Compatibility orchestration
    pub compat_executions_total: Counter<u64>,
    pub compat_quirks_applied_total: Counter<u64>,

    pub build_info: Gauge<u64>,
}

impl Metrics {
    pub fn new(meter: Meter) -> Self {
        Self {
            outbound_requests_total: meter
                .u64_counter("ocm_peer_outbound_requests_total")
                .with_description("Total number of requests sent to federation peers")
                .build(),
            outbound_blocked_total: meter
                .u64_counter("ocm_peer_outbound_blocked_total")
                .with_description("Total number of outbound requests refused by the SSRF check")
                .build(),

            redirects_followed_total: meter
                .u64_counter("ocm_peer_redirects_followed_total")
                .with_description("Total number of same-host redirects followed")
                .build(),
            redirects_refused_total: meter
                .u64_counter("ocm_peer_redirects_refused_total")
                .with_description("Total number of redirects refused by policy, by kind")
                .build(),

            response_too_large_total: meter
                .u64_counter("ocm_peer_response_too_large_total")
                .with_description("Total number of peer responses rejected for exceeding the size cap")
                .build(),

            compat_executions_total: meter
                .u64_counter("ocm_peer_compat_executions_total")
                .with_description("Total number of orchestrated peer operations, by outcome")
                .build(),
            compat_quirks_applied_total: meter
                .u64_counter("ocm_peer_compat_quirks_applied_total")
                .with_description("Total number of compatibility quirk attempts, by quirk and reason")
                .build(),

            build_info: meter
                .u64_gauge("ocm_peer_build_info")
                .with_description("Build information (version, rust version)")
                .build(),
        }
    }

    pub fn set_build_info(&self) {
        let version = env!("CARGO_PKG_VERSION");
        let rust_version = env!("CARGO_PKG_RUST_VERSION");

        self.build_info.record(
            1,
            &[
                KeyValue::new(labels::VERSION, version),
                KeyValue::new(labels::RUST_VERSION, rust_version),
            ],
        );
    }

    pub fn record_outbound_request(&self, signed: bool) {
        self.outbound_requests_total
            .add(1, &[KeyValue::new(labels::SIGNED, signed)]);
    }

    pub fn record_outbound_blocked(&self, reason: &str) {
        self.outbound_blocked_total
            .add(1, &[KeyValue::new(labels::REASON, reason.to_string())]);
    }

    pub fn record_redirect_followed(&self) {
        self.redirects_followed_total.add(1, &[]);
    }

    pub fn record_redirect_refused(&self, kind: &str) {
        self.redirects_refused_total
            .add(1, &[KeyValue::new(labels::KIND, kind.to_string())]);
    }

    pub fn record_response_too_large(&self) {
        self.response_too_large_total.add(1, &[]);
    }

    pub fn record_compat_execution(&self, outcome: &str) {
        self.compat_executions_total
            .add(1, &[KeyValue::new(labels::OUTCOME, outcome.to_string())]);
    }

    pub fn record_quirk_applied(&self, quirk: &str, reason: &str) {
        self.compat_quirks_applied_total.add(
            1,
            &[
                KeyValue::new(labels::QUIRK, quirk.to_string()),
                KeyValue::new(labels::REASON, reason.to_string()),
            ],
        );
    }
}

/// Build the meter provider with a Prometheus exporter and install it
/// globally. Call once from the process entry point.
pub fn init_metrics() -> Result<(Arc<Metrics>, Registry), Box<dyn std::error::Error + Send + Sync>>
{
    let registry = Registry::default();

    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()?;

    let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

    global::set_meter_provider(meter_provider);

    let meter = global::meter("ocm-peer");
    let metrics = Arc::new(Metrics::new(meter));

    metrics.set_build_info();

    Ok((metrics, registry))
}
