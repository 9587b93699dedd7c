//! `/api/monitoring/*` — read-only pool/breaker/partner views plus the
//! administrative forced-breaker-state endpoints.

use crate::envelope::SuccessEnvelope;
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use partner_gateway_breaker::BreakerPhase;
use partner_gateway_config::TenantConfig;
use partner_gateway_core::{GatewayError, TenantId};
use std::collections::BTreeSet;

/// `GET /health`.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let pools = state.routes.pool().all();
    let breakers = state.routes.breakers().all();

    let pool_count = pools.len();
    let healthy_pools = pools.values().filter(|p| !p.shutting_down).count();
    let open_breakers = breakers
        .values()
        .filter(|b| b.state == BreakerPhase::Open)
        .count();
    let cached_credentials = state.routes.credentials().cached_tenant_count();

    Json(serde_json::json!({
        "poolCount": pool_count,
        "healthyPools": healthy_pools,
        "openBreakers": open_breakers,
        "cachedCredentials": cached_credentials,
    }))
}

/// `GET /threadpools`.
pub async fn all_threadpools(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.routes.pool().all())
}

/// `GET /threadpools/{id}`.
pub async fn one_threadpool(
    State(state): State<AppState>,
    Path(partner_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = parse_tenant(partner_id)?;
    let stats = state
        .routes
        .pool()
        .stats(&tenant)
        .ok_or_else(|| GatewayError::NotFound { tenant })?;
    Ok(Json(stats))
}

/// `GET /circuitbreakers`.
pub async fn all_circuitbreakers(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.routes.breakers().all())
}

/// `GET /circuitbreakers/{id}`.
pub async fn one_circuitbreaker(
    State(state): State<AppState>,
    Path(partner_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = parse_tenant(partner_id)?;
    let stats = state
        .routes
        .breakers()
        .stats(&tenant)
        .ok_or_else(|| GatewayError::NotFound { tenant })?;
    Ok(Json(stats))
}

/// `GET /partners`: every tenant known to any registry or the active-route
/// table, combined into one view each.
pub async fn all_partners(State(state): State<AppState>) -> impl IntoResponse {
    let pools = state.routes.pool().all();
    let breakers = state.routes.breakers().all();
    let routes = state.routes.routes_status().await;

    let mut tenants: BTreeSet<TenantId> = BTreeSet::new();
    tenants.extend(pools.keys().cloned());
    tenants.extend(breakers.keys().cloned());
    tenants.extend(routes.keys().cloned());

    let mut out = serde_json::Map::new();
    for tenant in tenants {
        out.insert(
            tenant.as_str().to_string(),
            partner_view(&tenant, &pools, &breakers, &routes),
        );
    }
    Json(serde_json::Value::Object(out))
}

/// `GET /partners/{id}`.
pub async fn one_partner(
    State(state): State<AppState>,
    Path(partner_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = parse_tenant(partner_id)?;
    let pools = state.routes.pool().all();
    let breakers = state.routes.breakers().all();
    let routes = state.routes.routes_status().await;

    if !pools.contains_key(&tenant) && !breakers.contains_key(&tenant) && !routes.contains_key(&tenant) {
        return Err(GatewayError::NotFound { tenant }.into());
    }
    Ok(Json(partner_view(&tenant, &pools, &breakers, &routes)))
}

fn partner_view(
    tenant: &TenantId,
    pools: &std::collections::BTreeMap<TenantId, partner_gateway_pool::PoolState>,
    breakers: &std::collections::BTreeMap<TenantId, partner_gateway_breaker::BreakerState>,
    routes: &std::collections::BTreeMap<TenantId, String>,
) -> serde_json::Value {
    serde_json::json!({
        "pool": pools.get(tenant),
        "breaker": breakers.get(tenant),
        "routeId": routes.get(tenant),
        "hasActiveRoute": routes.contains_key(tenant),
    })
}

/// `POST /circuitbreakers/{id}/force-open`.
pub async fn force_open(
    State(state): State<AppState>,
    Path(partner_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = parse_tenant(partner_id)?;
    let cfg = breaker_params_for(&state, &tenant).await;
    state.routes.breakers().force_open(&tenant, &cfg);
    Ok(Json(SuccessEnvelope::for_partner(
        "breaker forced open",
        tenant.as_str(),
    )))
}

/// `POST /circuitbreakers/{id}/force-closed`.
pub async fn force_closed(
    State(state): State<AppState>,
    Path(partner_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = parse_tenant(partner_id)?;
    let cfg = breaker_params_for(&state, &tenant).await;
    state.routes.breakers().force_closed(&tenant, &cfg);
    Ok(Json(SuccessEnvelope::for_partner(
        "breaker forced closed",
        tenant.as_str(),
    )))
}

fn parse_tenant(raw: String) -> Result<TenantId, GatewayError> {
    TenantId::new(raw).map_err(|_| GatewayError::invalid("missing or blank partnerId"))
}

/// Administrative breaker transitions need `BreakerParams` (e.g.
/// `halfOpenProbeCount` to reset on the next natural transition); fall back
/// to the `DEFAULT` profile for a tenant not yet in the config store rather
/// than failing the request, matching the Pool Registry's own fallback.
async fn breaker_params_for(
    state: &AppState,
    tenant: &TenantId,
) -> partner_gateway_config::BreakerParams {
    match state.routes.config_store().fetch(tenant).await {
        Ok(cfg) => cfg.breaker,
        Err(_) => TenantConfig::default_profile(tenant.clone()).breaker,
    }
}
