use super::reason::{classify, BoxError, ReasonCode};
use super::registry::ProfileRegistry;
use crate::telemetry::metrics::values;
use crate::telemetry::Metrics;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of [`Orchestrator::execute`]
#[derive(Debug)]
pub struct ExecuteResult {
    pub success: bool,
    /// Reason the strict attempt failed, kept even when a quirk recovered
    /// the call. After a failed quirk attempt, the reason of that failure.
    pub reason_code: Option<ReasonCode>,
    /// Quirk that was attempted, if any
    pub quirk_applied: Option<String>,
    pub error: Option<BoxError>,
}

impl ExecuteResult {
    fn strict_ok() -> Self {
        Self { success: true, reason_code: None, quirk_applied: None, error: None }
    }

    pub fn into_result(self) -> Result<(), BoxError> {
        match self.error {
            Some(err) if !self.success => Err(err),
            _ => Ok(()),
        }
    }
}

/// Runs a peer operation strictly first, then retries it once with a
/// compatibility quirk when the peer's profile declares one for the
/// classified failure.
///
/// Never runs the two attempts concurrently and never tries a second quirk.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<ProfileRegistry>,
    metrics: Option<Arc<Metrics>>,
}

impl Orchestrator {
    pub fn new(registry: Arc<ProfileRegistry>) -> Self {
        Self { registry, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &ProfileRegistry {
        &self.registry
    }

    /// Execute `strict_op`, and on a quirk-eligible failure `quirk_op` with
    /// the selected quirk name.
    pub async fn execute<S, SF, Q, QF>(
        &self,
        cancel: &CancellationToken,
        peer_host: &str,
        strict_op: S,
        quirk_op: Q,
    ) -> ExecuteResult
    where
        S: FnOnce(CancellationToken) -> SF,
        SF: Future<Output = Result<(), BoxError>>,
        Q: FnOnce(CancellationToken, String) -> QF,
        QF: Future<Output = Result<(), BoxError>>,
    {
        let strict_err = match strict_op(cancel.clone()).await {
            Ok(()) => {
                self.record(values::OUTCOME_STRICT_OK);
                return ExecuteResult::strict_ok();
            }
            Err(err) => err,
        };

        let reason = classify(strict_err.as_ref());
        let profile = self.registry.resolve(peer_host);
        debug!(
            peer = %peer_host,
            %reason,
            profile = %profile.name,
            error = %strict_err,
            "strict peer operation failed"
        );

        let Some(quirk) = profile.quirk_for(reason) else {
            self.record(values::OUTCOME_NO_QUIRK);
            return ExecuteResult {
                success: false,
                reason_code: Some(reason),
                quirk_applied: None,
                error: Some(strict_err),
            };
        };

        let quirk_name = quirk.name.to_string();
        if let Some(ref m) = self.metrics {
            m.record_quirk_applied(&quirk_name, reason.as_str());
        }

        match quirk_op(cancel.clone(), quirk_name.clone()).await {
            Ok(()) => {
                info!(
                    peer = %peer_host,
                    %reason,
                    quirk = %quirk_name,
                    profile = %profile.name,
                    "peer operation succeeded with compatibility quirk"
                );
                self.record(values::OUTCOME_QUIRK_OK);
                ExecuteResult {
                    success: true,
                    reason_code: Some(reason),
                    quirk_applied: Some(quirk_name),
                    error: None,
                }
            }
            Err(quirk_err) => {
                let quirk_reason = classify(quirk_err.as_ref());
                warn!(
                    peer = %peer_host,
                    strict_reason = %reason,
                    reason = %quirk_reason,
                    quirk = %quirk_name,
                    error = %quirk_err,
                    "peer operation failed with compatibility quirk"
                );
                self.record(values::OUTCOME_QUIRK_FAILED);
                ExecuteResult {
                    success: false,
                    reason_code: Some(quirk_reason),
                    quirk_applied: Some(quirk_name),
                    error: Some(quirk_err),
                }
            }
        }
    }

    /// Whether `quirk_name` would be tried for `peer_host` after a failure
    /// classified as `reason`. Mirrors the selection in [`Self::execute`]:
    /// only the first quirk covering `reason` is eligible.
    pub fn can_apply_quirk(&self, peer_host: &str, reason: ReasonCode, quirk_name: &str) -> bool {
        self.registry
            .resolve(peer_host)
            .quirk_for(reason)
            .is_some_and(|quirk| quirk.name == quirk_name)
    }

    fn record(&self, outcome: &str) {
        if let Some(ref m) = self.metrics {
            m.record_compat_execution(outcome);
        }
    }
}
