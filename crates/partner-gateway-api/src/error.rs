//! Maps the gateway's closed error taxonomy onto the uniform Control API
//! response envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use partner_gateway_core::GatewayError;
use serde_json::json;

use crate::envelope::now_millis;

pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, partner_id) = match &self.0 {
            GatewayError::InvalidRequest { message } => {
                (StatusCode::BAD_REQUEST, message.clone(), None)
            }
            GatewayError::NotFound { tenant } => (
                StatusCode::NOT_FOUND,
                self.0.to_string(),
                Some(tenant.as_str().to_string()),
            ),
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                other.to_string(),
                other.tenant().map(|t| t.as_str().to_string()),
            ),
        };

        (
            status,
            Json(json!({
                "success": false,
                "message": message,
                "partnerId": partner_id,
                "timestamp": now_millis(),
            })),
        )
            .into_response()
    }
}
