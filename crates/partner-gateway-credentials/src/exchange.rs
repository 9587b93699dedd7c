//! The outbound token exchange: `authBody.contentType` selects the request
//! shape, `returnType` selects the response parser.

use partner_gateway_config::{AuthContentType, AuthParams, AuthReturnType};
use partner_gateway_core::{GatewayError, TenantId};
use reqwest::Client;
use std::time::Duration;

/// Performs the token request and extracts the bearer token at
/// `tokenKeyPath`. Does not cache or schedule anything — that is
/// [`crate::cache::CredentialCache`]'s job; this is the single HTTP call
/// the single-flight leader makes.
pub async fn exchange_token(
    client: &Client,
    tenant: &TenantId,
    auth: &AuthParams,
) -> Result<String, GatewayError> {
    let method: reqwest::Method = auth
        .auth_method
        .parse()
        .unwrap_or(reqwest::Method::POST);

    let mut builder = client
        .request(method, &auth.auth_endpoint)
        .timeout(Duration::from_secs(30));

    builder = match auth.auth_body.content_type {
        AuthContentType::Json => {
            let mut body = serde_json::json!({
                "grant_type": auth.auth_body.grant_type,
                "client_id": auth.auth_body.client_id,
                "client_secret": auth.auth_body.client_secret,
            });
            if let Some(scope) = &auth.auth_body.scope {
                body["scope"] = serde_json::Value::String(scope.clone());
            }
            builder.json(&body)
        }
        AuthContentType::Form => {
            let mut form: Vec<(&str, &str)> = vec![
                ("grant_type", &auth.auth_body.grant_type),
                ("client_id", &auth.auth_body.client_id),
                ("client_secret", &auth.auth_body.client_secret),
            ];
            if let Some(scope) = &auth.auth_body.scope {
                form.push(("scope", scope));
            }
            builder.form(&form)
        }
    };

    let response = builder.send().await.map_err(|e| GatewayError::Transient {
        tenant: tenant.clone(),
        message: format!("auth endpoint request failed: {e}"),
    })?;

    let status = response.status();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(GatewayError::Auth {
            tenant: tenant.clone(),
            message: format!("auth endpoint returned {status}"),
        });
    }
    if !status.is_success() {
        return Err(GatewayError::Transient {
            tenant: tenant.clone(),
            message: format!("auth endpoint returned {status}"),
        });
    }

    let body = response.text().await.map_err(|e| GatewayError::Transient {
        tenant: tenant.clone(),
        message: format!("failed to read auth response body: {e}"),
    })?;

    match auth.auth_body.return_type {
        AuthReturnType::Json => extract_json_token(tenant, &body, &auth.auth_body.token_key_path),
        AuthReturnType::Xml => extract_xml_token(tenant, &body, &auth.auth_body.token_key_path),
    }
}

/// Walks a dotted path (`"data.access_token"`) through a JSON document.
fn extract_json_token(
    tenant: &TenantId,
    body: &str,
    token_key_path: &str,
) -> Result<String, GatewayError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| GatewayError::Internal {
            tenant: tenant.clone(),
            message: format!("auth response is not valid JSON: {e}"),
        })?;

    let mut cursor = &value;
    for segment in token_key_path.split('.') {
        cursor = cursor.get(segment).ok_or_else(|| GatewayError::Internal {
            tenant: tenant.clone(),
            message: format!("token path {token_key_path:?} not found in auth response"),
        })?;
    }

    cursor
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| GatewayError::Internal {
            tenant: tenant.clone(),
            message: format!("token path {token_key_path:?} is not a string"),
        })
}

/// Walks a dotted tag-name path (`"response.access_token"`) through
/// successive descendant elements of a minimal, read-only XML DOM.
fn extract_xml_token(
    tenant: &TenantId,
    body: &str,
    token_key_path: &str,
) -> Result<String, GatewayError> {
    let doc = roxmltree::Document::parse(body).map_err(|e| GatewayError::Internal {
        tenant: tenant.clone(),
        message: format!("auth response is not valid XML: {e}"),
    })?;

    let mut node = doc.root_element();
    let mut segments = token_key_path.split('.');

    let first = segments.next().unwrap_or_default();
    if node.tag_name().name() != first {
        return Err(GatewayError::Internal {
            tenant: tenant.clone(),
            message: format!("token path {token_key_path:?}: root element mismatch"),
        });
    }

    for segment in segments {
        node = node
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == segment)
            .ok_or_else(|| GatewayError::Internal {
                tenant: tenant.clone(),
                message: format!("token path {token_key_path:?} not found in auth response"),
            })?;
    }

    node.text()
        .map(str::to_owned)
        .ok_or_else(|| GatewayError::Internal {
            tenant: tenant.clone(),
            message: format!("token path {token_key_path:?} has no text content"),
        })
}
