//! The gateway's closed error taxonomy.
//!
//! A closed `thiserror` enum rather than an error open over some inner
//! application error: the set of failure kinds a forwarding pipeline can hit
//! is fixed and enumerable, so one enum covers the whole pipeline and
//! carries the context (tenant id, retry count, ...) the Control API needs
//! to shape a response without re-deriving it.

use crate::tenant::TenantId;

/// Semantic error taxonomy for the gateway, independent of the HTTP status
/// it maps to at the Control API boundary (see `partner-gateway-api`).
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Missing/blank tenant id, malformed change notification, or a
    /// `TenantConfig` with a field outside its documented range.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The tenant is not known to the config store.
    #[error("tenant {tenant} not found")]
    NotFound { tenant: TenantId },

    /// The call was refused by the tenant's circuit breaker. Never retried
    /// by the caller automatically.
    #[error("circuit breaker open for tenant {tenant}")]
    BreakerOpen { tenant: TenantId },

    /// Submission to a pool that is draining or has been removed.
    #[error("pool for tenant {tenant} is shutting down")]
    ShuttingDown { tenant: TenantId },

    /// Connect error, 5xx/408/429, or timeout. Retryable per the tenant's
    /// retry policy.
    #[error("transient failure calling tenant {tenant}: {message}")]
    Transient { tenant: TenantId, message: String },

    /// 401/403 from the tenant endpoint or the auth endpoint. Triggers
    /// credential invalidation and one bonus retry that does not count
    /// against `maxAttempts`.
    #[error("auth failure for tenant {tenant}: {message}")]
    Auth { tenant: TenantId, message: String },

    /// Unexpected failure; surfaced to the exception sink.
    #[error("internal error processing tenant {tenant}: {message}")]
    Internal { tenant: TenantId, message: String },
}

impl GatewayError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// The tenant this error is about, if any (`InvalidRequest` may be
    /// tenant-less, e.g. a malformed webhook body).
    pub fn tenant(&self) -> Option<&TenantId> {
        match self {
            GatewayError::InvalidRequest { .. } => None,
            GatewayError::NotFound { tenant }
            | GatewayError::BreakerOpen { tenant }
            | GatewayError::ShuttingDown { tenant }
            | GatewayError::Transient { tenant, .. }
            | GatewayError::Auth { tenant, .. }
            | GatewayError::Internal { tenant, .. } => Some(tenant),
        }
    }

    /// Whether this outcome should be retried per §4.E's forward-stage
    /// policy. `Auth` is handled separately (one bonus retry after
    /// invalidating the credential, not counted against `maxAttempts`).
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transient { .. })
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, GatewayError::Auth { .. })
    }
}

/// Convenience alias used throughout the gateway crates.
pub type Result<T> = std::result::Result<T, GatewayError>;
