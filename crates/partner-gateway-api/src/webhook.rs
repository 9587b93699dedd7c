//! `/api/v1/partner-config/*` — the change-notification webhook and the
//! manual/bulk reconciliation endpoints.

use crate::envelope::SuccessEnvelope;
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use partner_gateway_core::{GatewayError, TenantId};
use partner_gateway_routes::{ChangeNotification, ChangeType};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigChangedBody {
    pub partner_id: String,
    pub change_type: String,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

fn parse_change_type(raw: &str) -> Result<ChangeType, GatewayError> {
    match raw.to_ascii_uppercase().as_str() {
        "CREATED" => Ok(ChangeType::Created),
        "UPDATED" => Ok(ChangeType::Updated),
        "DELETED" => Ok(ChangeType::Deleted),
        other => Err(GatewayError::invalid(format!(
            "unrecognized changeType {other:?}; expected CREATED, UPDATED, or DELETED"
        ))),
    }
}

/// `POST /webhook/config-changed`.
pub async fn config_changed(
    State(state): State<AppState>,
    Json(body): Json<ConfigChangedBody>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant =
        TenantId::new(body.partner_id.clone()).map_err(|_| GatewayError::invalid("missing or blank partnerId"))?;
    let change_type = parse_change_type(&body.change_type)?;

    state
        .routes
        .on_notification(ChangeNotification {
            tenant_id: tenant.clone(),
            change_type,
            version: body.version,
        })
        .await?;

    Ok(Json(SuccessEnvelope::for_partner(
        "reconciliation applied",
        tenant.as_str(),
    )))
}

/// `POST /{partnerId}/refresh`.
pub async fn refresh_partner(
    State(state): State<AppState>,
    Path(partner_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant =
        TenantId::new(partner_id).map_err(|_| GatewayError::invalid("missing or blank partnerId"))?;
    state.routes.refresh(&tenant).await?;
    Ok(Json(SuccessEnvelope::for_partner(
        "partner reconciled",
        tenant.as_str(),
    )))
}

/// `POST /refresh-all`.
pub async fn refresh_all(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    state.routes.refresh_all().await?;
    Ok(Json(SuccessEnvelope::new("all tenants reconciled")))
}

/// `GET /routes/status`.
pub async fn routes_status(State(state): State<AppState>) -> impl IntoResponse {
    let routes: BTreeMap<String, String> = state
        .routes
        .routes_status()
        .await
        .into_iter()
        .map(|(tenant, route_id)| (tenant.as_str().to_string(), route_id))
        .collect();

    Json(serde_json::json!({
        "activeRouteCount": routes.len(),
        "activeRoutes": routes,
    }))
}

/// `GET /{partnerId}`.
pub async fn get_partner_config(
    State(state): State<AppState>,
    Path(partner_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant =
        TenantId::new(partner_id).map_err(|_| GatewayError::invalid("missing or blank partnerId"))?;
    let config = state.routes.config_store().fetch(&tenant).await?;
    let has_active_route = state.routes.has_active_route(&tenant).await;

    Ok(Json(serde_json::json!({
        "config": config,
        "hasActiveRoute": has_active_route,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_type_parses_case_insensitively() {
        assert_eq!(parse_change_type("created").unwrap(), ChangeType::Created);
        assert_eq!(parse_change_type("DELETED").unwrap(), ChangeType::Deleted);
        assert!(parse_change_type("bogus").is_err());
    }
}
