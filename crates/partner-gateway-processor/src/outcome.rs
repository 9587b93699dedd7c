//! The `message-results`/`message-exceptions` outcome sink.

use partner_gateway_core::TenantId;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeResult {
    Success,
    Failed,
}

/// One row of the `message-results` append-only index.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub tenant_id: TenantId,
    pub route_id: String,
    pub result: OutcomeResult,
    pub attempts: usize,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub timestamp_millis: u64,
    pub worker_name: String,
}

/// One row of the `message-exceptions` index, emitted only on final failure.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionRecord {
    pub tenant_id: TenantId,
    pub route_id: String,
    pub error_kind: String,
    pub error_message: String,
    pub timestamp_millis: u64,
}

/// Writes outcomes and exceptions. Implementations are best-effort: the
/// processor logs and discards a sink write failure rather than failing
/// the pipeline over it.
pub trait OutcomeSink: Send + Sync {
    fn record_outcome(&self, outcome: &Outcome);
    fn record_exception(&self, exception: &ExceptionRecord);
}

/// Logs both indices at `info`/`warn` instead of writing to a real store.
/// Suitable as the default sink and for tests; production wiring supplies
/// a sink backed by the real `message-results`/`message-exceptions`
/// indices.
pub struct LoggingOutcomeSink;

impl OutcomeSink for LoggingOutcomeSink {
    fn record_outcome(&self, outcome: &Outcome) {
        tracing::info!(
            tenant = %outcome.tenant_id,
            route = %outcome.route_id,
            result = ?outcome.result,
            attempts = outcome.attempts,
            "message outcome recorded"
        );
    }

    fn record_exception(&self, exception: &ExceptionRecord) {
        tracing::warn!(
            tenant = %exception.tenant_id,
            route = %exception.route_id,
            kind = %exception.error_kind,
            message = %exception.error_message,
            "message exception recorded"
        );
    }
}
