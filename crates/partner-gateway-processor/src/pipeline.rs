//! Composes the pool, breaker, and credential registries into the
//! per-message pipeline.

use crate::outcome::{ExceptionRecord, Outcome, OutcomeResult, OutcomeSink};
use crate::stage::{Stage, StageContext};
use crate::stages::{DecryptHeadersStage, EnsureTokenStage, ForwardStage, ValidateStage};
use http::HeaderMap;
use partner_gateway_breaker::BreakerRegistry;
use partner_gateway_config::TenantConfig;
use partner_gateway_core::{GatewayError, TenantId};
use partner_gateway_credentials::CredentialCache;
use partner_gateway_pool::PoolRegistry;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// One inbound message, as handed off by the Route Manager's ingest loop.
pub struct IngestRecord {
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Runs the 5-stage pipeline for one tenant. Shared across every message
/// for that tenant; holds no per-message state itself.
pub struct TenantProcessor {
    runtime: tokio::runtime::Handle,
    http_client: reqwest::Client,
    credentials: Arc<CredentialCache>,
    stages: Arc<Vec<Box<dyn Stage>>>,
    outcome_sink: Arc<dyn OutcomeSink>,
}

impl TenantProcessor {
    pub fn new(
        runtime: tokio::runtime::Handle,
        credentials: Arc<CredentialCache>,
        outcome_sink: Arc<dyn OutcomeSink>,
    ) -> Self {
        Self::with_decrypt_hook(
            runtime,
            credentials,
            outcome_sink,
            DecryptHeadersStage::identity(),
        )
    }

    pub fn with_decrypt_hook(
        runtime: tokio::runtime::Handle,
        credentials: Arc<CredentialCache>,
        outcome_sink: Arc<dyn OutcomeSink>,
        decrypt: DecryptHeadersStage,
    ) -> Self {
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(ValidateStage),
            Box::new(decrypt),
            Box::new(EnsureTokenStage),
            Box::new(ForwardStage),
        ];
        Self {
            runtime,
            http_client: reqwest::Client::new(),
            credentials,
            stages: Arc::new(stages),
            outcome_sink,
        }
    }

    /// Runs every stage for `record`, gated by `tenant`'s breaker and
    /// scheduled on `tenant`'s pool. The breaker/pool composition mirrors
    /// `BreakerRegistry::execute`: rejection short-circuits before the
    /// pipeline ever reaches a worker thread.
    pub fn process(
        &self,
        tenant: &TenantId,
        config: &TenantConfig,
        breakers: &BreakerRegistry,
        pool: &PoolRegistry,
        record: IngestRecord,
    ) -> impl std::future::Future<Output = Result<(), GatewayError>> + Send + 'static {
        let runtime = self.runtime.clone();
        let http_client = self.http_client.clone();
        let credentials = Arc::clone(&self.credentials);
        let outcome_sink = Arc::clone(&self.outcome_sink);
        let stages = Arc::clone(&self.stages);
        let route_id = tenant.route_id();
        let tenant_owned = tenant.clone();
        let config_owned = config.clone();

        let task = move || -> Result<(), GatewayError> {
            let mut ctx = StageContext {
                tenant: tenant_owned.clone(),
                config: config_owned,
                headers: record.headers,
                body: record.body,
                token: None,
                attempts: 0,
                final_status: None,
                runtime,
                http_client,
                credentials,
            };

            let result = run_stages(&stages, &mut ctx);

            let now_millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);

            match &result {
                Ok(()) => {
                    outcome_sink.record_outcome(&Outcome {
                        tenant_id: tenant_owned.clone(),
                        route_id: route_id.clone(),
                        result: OutcomeResult::Success,
                        attempts: ctx.attempts,
                        error_kind: None,
                        error_message: None,
                        timestamp_millis: now_millis,
                        worker_name: current_thread_name(),
                    });
                }
                Err(e) => {
                    outcome_sink.record_outcome(&Outcome {
                        tenant_id: tenant_owned.clone(),
                        route_id: route_id.clone(),
                        result: OutcomeResult::Failed,
                        attempts: ctx.attempts,
                        error_kind: Some(error_kind(e).to_string()),
                        error_message: Some(e.to_string()),
                        timestamp_millis: now_millis,
                        worker_name: current_thread_name(),
                    });
                    outcome_sink.record_exception(&ExceptionRecord {
                        tenant_id: tenant_owned.clone(),
                        route_id: route_id.clone(),
                        error_kind: error_kind(e).to_string(),
                        error_message: e.to_string(),
                        timestamp_millis: now_millis,
                    });
                }
            }

            result
        };

        breakers.execute(tenant, &config.breaker, pool, &config.pool, task)
    }
}

fn run_stages(stages: &[Box<dyn Stage>], ctx: &mut StageContext) -> Result<(), GatewayError> {
    for stage in stages {
        stage.run(ctx).map_err(|e| {
            tracing::warn!(stage = stage.name(), tenant = %ctx.tenant, error = %e, "pipeline stage failed");
            e
        })?;
    }
    Ok(())
}

fn error_kind(error: &GatewayError) -> &'static str {
    match error {
        GatewayError::InvalidRequest { .. } => "InvalidRequest",
        GatewayError::NotFound { .. } => "NotFound",
        GatewayError::BreakerOpen { .. } => "BreakerOpen",
        GatewayError::ShuttingDown { .. } => "ShuttingDown",
        GatewayError::Transient { .. } => "Transient",
        GatewayError::Auth { .. } => "Auth",
        GatewayError::Internal { .. } => "Internal",
    }
}

fn current_thread_name() -> String {
    std::thread::current()
        .name()
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::LoggingOutcomeSink;
    use http::HeaderValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        outcomes: AtomicUsize,
        exceptions: AtomicUsize,
    }

    impl OutcomeSink for CountingSink {
        fn record_outcome(&self, _outcome: &Outcome) {
            self.outcomes.fetch_add(1, Ordering::SeqCst);
        }

        fn record_exception(&self, _exception: &ExceptionRecord) {
            self.exceptions.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn missing_business_unit_header_fails_validation_before_any_network_call() {
        let tenant = TenantId::new("acme").unwrap();
        let config = TenantConfig::default_profile(tenant.clone());
        let breakers = BreakerRegistry::new();
        let pool = PoolRegistry::new();
        let sink = Arc::new(CountingSink {
            outcomes: AtomicUsize::new(0),
            exceptions: AtomicUsize::new(0),
        });

        let processor = TenantProcessor::new(
            tokio::runtime::Handle::current(),
            Arc::new(CredentialCache::new()),
            sink.clone(),
        );

        let record = IngestRecord {
            headers: HeaderMap::new(),
            body: Vec::new(),
        };

        let result = processor
            .process(&tenant, &config, &breakers, &pool, record)
            .await;

        assert!(matches!(result, Err(GatewayError::InvalidRequest { .. })));
        assert_eq!(sink.outcomes.load(Ordering::SeqCst), 1);
        assert_eq!(sink.exceptions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn matching_header_passes_validation_and_reaches_token_stage() {
        let tenant = TenantId::new("acme").unwrap();
        let config = TenantConfig::default_profile(tenant.clone());
        let breakers = BreakerRegistry::new();
        let pool = PoolRegistry::new();
        let sink: Arc<dyn OutcomeSink> = Arc::new(LoggingOutcomeSink);

        let processor = TenantProcessor::new(
            tokio::runtime::Handle::current(),
            Arc::new(CredentialCache::new()),
            sink,
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            crate::stage::BUSINESS_UNIT_HEADER,
            HeaderValue::from_static("acme"),
        );
        let record = IngestRecord {
            headers,
            body: b"payload".to_vec(),
        };

        // No auth/forward endpoint is configured, so this fails downstream
        // of validation rather than succeeding — proving validation itself
        // passed.
        let result = processor
            .process(&tenant, &config, &breakers, &pool, record)
            .await;
        assert!(!matches!(result, Err(GatewayError::InvalidRequest { .. })));
    }
}
