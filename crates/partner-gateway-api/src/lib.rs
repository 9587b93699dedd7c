//! The Control API: a thin HTTP dispatcher onto the Route Manager, Pool
//! Registry, and Breaker Registry. Its only logic is input validation,
//! route-manager invocation, and uniform response shaping — everything
//! else lives in the crates it composes.
//!
//! Built on `axum` + `tower-http`.

pub mod bulk;
pub mod envelope;
pub mod error;
pub mod monitoring;
pub mod state;
pub mod webhook;

pub use state::AppState;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Builds the full router: `/api/v1/partner-config/*`, `/api/monitoring/*`,
/// and `/api/config/*`.
pub fn router(state: AppState) -> Router {
    let partner_config = Router::new()
        .route("/webhook/config-changed", post(webhook::config_changed))
        .route("/refresh-all", post(webhook::refresh_all))
        .route("/routes/status", get(webhook::routes_status))
        .route("/:partner_id/refresh", post(webhook::refresh_partner))
        .route("/:partner_id", get(webhook::get_partner_config));

    let monitoring = Router::new()
        .route("/health", get(monitoring::health))
        .route("/threadpools", get(monitoring::all_threadpools))
        .route("/threadpools/:partner_id", get(monitoring::one_threadpool))
        .route("/circuitbreakers", get(monitoring::all_circuitbreakers))
        .route(
            "/circuitbreakers/:partner_id",
            get(monitoring::one_circuitbreaker),
        )
        .route(
            "/circuitbreakers/:partner_id/force-open",
            post(monitoring::force_open),
        )
        .route(
            "/circuitbreakers/:partner_id/force-closed",
            post(monitoring::force_closed),
        )
        .route("/partners", get(monitoring::all_partners))
        .route("/partners/:partner_id", get(monitoring::one_partner));

    let config_admin = Router::new().route("/partners/bulk", put(bulk::bulk_update));

    Router::new()
        .nest("/api/v1/partner-config", partner_config)
        .nest("/api/monitoring", monitoring)
        .nest("/api/config", config_admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use partner_gateway_breaker::BreakerRegistry;
    use partner_gateway_config::InMemoryConfigStore;
    use partner_gateway_credentials::CredentialCache;
    use partner_gateway_pool::PoolRegistry;
    use partner_gateway_processor::{LoggingOutcomeSink, TenantProcessor};
    use partner_gateway_routes::{ChannelConsumer, RouteManager};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config_store = Arc::new(InMemoryConfigStore::new());
        let pool = Arc::new(PoolRegistry::new());
        let breakers = Arc::new(BreakerRegistry::new());
        let credentials = Arc::new(CredentialCache::new());
        let processor = Arc::new(TenantProcessor::new(
            tokio::runtime::Handle::current(),
            Arc::clone(&credentials),
            Arc::new(LoggingOutcomeSink),
        ));
        let consumer = Arc::new(ChannelConsumer::new());
        let manager = Arc::new(RouteManager::new(
            config_store,
            pool,
            breakers,
            credentials,
            processor,
            consumer,
        ));
        AppState::new(manager)
    }

    #[tokio::test]
    async fn webhook_with_blank_partner_id_is_bad_request() {
        let app = router(test_state());
        let body = serde_json::json!({"partnerId": "", "changeType": "CREATED"});
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/partner-config/webhook/config-changed")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_with_unknown_change_type_is_bad_request() {
        let app = router(test_state());
        let body = serde_json::json!({"partnerId": "acme", "changeType": "BOGUS"});
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/partner-config/webhook/config-changed")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_partner_config_lookup_is_404() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/partner-config/ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn routes_status_starts_empty() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/partner-config/routes/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_reports_zero_pools_when_idle() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/monitoring/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn bulk_update_partially_succeeds_and_returns_200() {
        let app = router(test_state());
        let body = serde_json::json!({
            "partners": [
                {
                    "tenantId": "good",
                    "version": 1,
                    "pool": {"coreWorkers": 1, "maxWorkers": 2, "queueCapacity": 10, "idleKeepAlive": 1000},
                    "breaker": {"failureRateThresholdPct": 50.0, "minCallsBeforeEval": 5, "openStateDuration": 1000, "slidingWindowSize": 10, "halfOpenProbeCount": 2},
                    "retry": {"maxAttempts": 3, "initialDelay": 100, "backoffMultiplier": 2.0, "jitterFraction": 0.1},
                    "auth": {"tokenLifetime": 3600000, "authEndpoint": "http://auth", "authMethod": "POST", "authBody": {"grantType": "client_credentials", "clientId": "id", "clientSecret": "secret", "contentType": "json", "returnType": "json", "tokenKeyPath": "access_token", "headerName": "Authorization", "headerPrefix": "Bearer "}},
                    "forward": {"apiEndpoint": "http://tenant", "apiTimeout": 5000, "maxConcurrentCalls": 4}
                },
                {
                    "tenantId": "bad",
                    "version": 1,
                    "pool": {"coreWorkers": 0, "maxWorkers": 2, "queueCapacity": 10, "idleKeepAlive": 1000},
                    "breaker": {"failureRateThresholdPct": 50.0, "minCallsBeforeEval": 5, "openStateDuration": 1000, "slidingWindowSize": 10, "halfOpenProbeCount": 2},
                    "retry": {"maxAttempts": 3, "initialDelay": 100, "backoffMultiplier": 2.0, "jitterFraction": 0.1},
                    "auth": {"tokenLifetime": 3600000, "authEndpoint": "http://auth", "authMethod": "POST", "authBody": {"grantType": "client_credentials", "clientId": "id", "clientSecret": "secret", "contentType": "json", "returnType": "json", "tokenKeyPath": "access_token", "headerName": "Authorization", "headerPrefix": "Bearer "}},
                    "forward": {"apiEndpoint": "http://tenant", "apiTimeout": 5000, "maxConcurrentCalls": 4}
                }
            ]
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/config/partners/bulk")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
