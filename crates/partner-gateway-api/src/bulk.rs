//! `PUT /api/config/partners/bulk`: apply a batch of
//! tenant config documents, reporting a per-tenant success/error map while
//! still returning overall 200 — one invalid tenant in the batch must not
//! fail the others.

use crate::state::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use partner_gateway_config::TenantConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub struct BulkUpdateRequest {
    pub partners: Vec<TenantConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PartnerResult {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// `PUT /api/config/partners/bulk`.
pub async fn bulk_update(
    State(state): State<AppState>,
    Json(body): Json<BulkUpdateRequest>,
) -> impl IntoResponse {
    let mut results: BTreeMap<String, PartnerResult> = BTreeMap::new();

    for config in body.partners {
        let tenant_id = config.tenant_id.as_str().to_string();
        match state.routes.config_store().upsert(config).await {
            Ok(()) => {
                results.insert(tenant_id, PartnerResult { success: true, message: None });
            }
            Err(e) => {
                results.insert(
                    tenant_id,
                    PartnerResult {
                        success: false,
                        message: Some(e.to_string()),
                    },
                );
            }
        }
    }

    let overall_success = results.values().all(|r| r.success);
    Json(serde_json::json!({
        "success": overall_success,
        "results": results,
    }))
}
