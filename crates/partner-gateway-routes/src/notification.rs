//! The change-notification shape the Control API hands to the Route Manager.

use partner_gateway_core::TenantId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

/// `{tenantId, changeType, version?}`, minus the webhook-only
/// `timestamp`/`source`/`metadata` fields the Control API accepts but the
/// Route Manager itself has no use for.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub tenant_id: TenantId,
    pub change_type: ChangeType,
    pub version: Option<u64>,
}
