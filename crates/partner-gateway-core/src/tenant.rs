//! The tenant identifier used as the primary key across every registry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, non-empty, case-sensitive identifier for a tenant (partner).
///
/// `TenantId` is passed explicitly to every registry and processor call
/// rather than stashed in thread-local or task-local storage, so a task can
/// always be traced back to the tenant it belongs to from its arguments
/// alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Builds a `TenantId`, rejecting empty or all-whitespace values.
    pub fn new(id: impl Into<String>) -> Result<Self, TenantIdError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(TenantIdError::Empty);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bit-exact broker queue name: `"partner.<tenantId>.queue"`.
    pub fn queue_name(&self) -> String {
        format!("partner.{}.queue", self.0)
    }

    /// Bit-exact route id: `"Partner:<tenantId>:Main"`.
    pub fn route_id(&self) -> String {
        format!("Partner:{}:Main", self.0)
    }

    /// Worker thread name prefix for this tenant: `"Partner-<tenantId>-Worker-"`.
    pub fn worker_name_prefix(&self) -> String {
        format!("Partner-{}-Worker-", self.0)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Error constructing a [`TenantId`].
#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum TenantIdError {
    #[error("tenant id must not be empty or blank")]
    Empty,
}
