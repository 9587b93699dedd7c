//! `TenantConfig` and its sub-structs: the per-tenant configuration document
//! the gateway reconciles against.

use partner_gateway_core::{GatewayError, TenantId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pool-registry-facing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolParams {
    pub core_workers: usize,
    pub max_workers: usize,
    pub queue_capacity: usize,
    #[serde(with = "duration_millis")]
    pub idle_keep_alive: Duration,
}

/// Breaker-registry-facing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerParams {
    pub failure_rate_threshold_pct: f64,
    pub min_calls_before_eval: usize,
    #[serde(with = "duration_millis")]
    pub open_state_duration: Duration,
    pub sliding_window_size: usize,
    pub half_open_probe_count: usize,
}

/// Forward-stage retry parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryParams {
    pub max_attempts: usize,
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_fraction: f64,
}

/// Request body shape for the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthContentType {
    Json,
    Form,
}

/// Response body shape of the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthReturnType {
    Json,
    Xml,
}

/// The client-credentials exchange body for a tenant's auth endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthBody {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scope: Option<String>,
    pub content_type: AuthContentType,
    pub return_type: AuthReturnType,
    /// Dotted JSON path (`"data.access_token"`) or XPath-like locator for XML.
    pub token_key_path: String,
    pub header_name: String,
    pub header_prefix: String,
}

/// Auth-stage parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthParams {
    #[serde(with = "duration_millis")]
    pub token_lifetime: Duration,
    pub auth_endpoint: String,
    pub auth_method: String,
    pub auth_body: AuthBody,
}

/// Forward-stage parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardParams {
    pub api_endpoint: String,
    #[serde(with = "duration_millis")]
    pub api_timeout: Duration,
    pub max_concurrent_calls: usize,
}

/// An immutable tenant configuration, identified by `(tenantId, version)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConfig {
    pub tenant_id: TenantId,
    pub version: u64,
    pub pool: PoolParams,
    pub breaker: BreakerParams,
    pub retry: RetryParams,
    pub auth: AuthParams,
    pub forward: ForwardParams,
    /// Informational only; does not affect scheduling.
    #[serde(default)]
    pub priority: Option<String>,
}

impl TenantConfig {
    /// Bit-exact derived queue name: `"partner.<tenantId>.queue"`.
    pub fn queue_name(&self) -> String {
        self.tenant_id.queue_name()
    }

    /// Validates every range constraint on the document. Used both by the
    /// config-store adapter on load and by the Control API's bulk-update
    /// endpoint so a malformed tenant never reaches the registries.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let tenant = &self.tenant_id;
        let fail = |message: String| {
            Err(GatewayError::InvalidRequest {
                message: format!("tenant {tenant}: {message}"),
            })
        };

        if self.pool.max_workers < self.pool.core_workers {
            return fail("maxWorkers must be >= coreWorkers".into());
        }
        if self.pool.queue_capacity == 0 {
            return fail("queueCapacity must be > 0".into());
        }
        if self.pool.core_workers == 0 {
            return fail("coreWorkers must be > 0".into());
        }
        if !(0.0 < self.breaker.failure_rate_threshold_pct
            && self.breaker.failure_rate_threshold_pct <= 100.0)
        {
            return fail("failureRateThresholdPct must be in (0, 100]".into());
        }
        if self.breaker.min_calls_before_eval == 0 {
            return fail("minCallsBeforeEval must be > 0".into());
        }
        if self.breaker.sliding_window_size == 0 {
            return fail("slidingWindowSize must be > 0".into());
        }
        if self.breaker.half_open_probe_count == 0 {
            return fail("halfOpenProbeCount must be > 0".into());
        }
        if self.retry.max_attempts == 0 {
            return fail("maxAttempts must be >= 1".into());
        }
        if self.retry.backoff_multiplier < 1.0 {
            return fail("backoffMultiplier must be >= 1".into());
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_fraction) {
            return fail("jitterFraction must be in [0, 1]".into());
        }
        if self.forward.max_concurrent_calls == 0 {
            return fail("maxConcurrentCalls must be > 0".into());
        }
        Ok(())
    }

    /// The `DEFAULT` fallback profile used by the Pool Registry when a
    /// tenant is not yet known to the config store.
    pub fn default_profile(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            version: 0,
            pool: PoolParams {
                core_workers: 2,
                max_workers: 4,
                queue_capacity: 100,
                idle_keep_alive: Duration::from_secs(60),
            },
            breaker: BreakerParams {
                failure_rate_threshold_pct: 50.0,
                min_calls_before_eval: 10,
                open_state_duration: Duration::from_secs(30),
                sliding_window_size: 20,
                half_open_probe_count: 3,
            },
            retry: RetryParams {
                max_attempts: 3,
                initial_delay: Duration::from_millis(200),
                backoff_multiplier: 2.0,
                jitter_fraction: 0.1,
            },
            auth: AuthParams {
                token_lifetime: Duration::from_secs(3600),
                auth_endpoint: String::new(),
                auth_method: "POST".into(),
                auth_body: AuthBody {
                    grant_type: "client_credentials".into(),
                    client_id: String::new(),
                    client_secret: String::new(),
                    scope: None,
                    content_type: AuthContentType::Json,
                    return_type: AuthReturnType::Json,
                    token_key_path: "access_token".into(),
                    header_name: "Authorization".into(),
                    header_prefix: "Bearer ".into(),
                },
            },
            forward: ForwardParams {
                api_endpoint: String::new(),
                api_timeout: Duration::from_secs(10),
                max_concurrent_calls: 4,
            },
            priority: None,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
