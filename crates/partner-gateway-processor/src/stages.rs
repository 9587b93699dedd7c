//! Concrete pipeline stages.

use crate::retry::delay_for;
use crate::stage::{Stage, StageContext, BUSINESS_UNIT_HEADER};
use http::HeaderMap;
use partner_gateway_core::GatewayError;
use std::sync::Arc;

/// Stage 1: the ingest record must carry a tenant id header matching the
/// tenant this pipeline instance was built for.
pub struct ValidateStage;

impl Stage for ValidateStage {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn run(&self, ctx: &mut StageContext) -> Result<(), GatewayError> {
        let header_value = ctx
            .headers
            .get(BUSINESS_UNIT_HEADER)
            .and_then(|v| v.to_str().ok());

        match header_value {
            Some(value) if value == ctx.tenant.as_str() => Ok(()),
            Some(other) => Err(GatewayError::invalid(format!(
                "{BUSINESS_UNIT_HEADER} header {other:?} does not match route tenant {}",
                ctx.tenant
            ))),
            None => Err(GatewayError::invalid(format!(
                "missing {BUSINESS_UNIT_HEADER} header"
            ))),
        }
    }
}

type DecryptHook = Arc<dyn Fn(&HeaderMap) -> Result<HeaderMap, GatewayError> + Send + Sync>;

/// Stage 2: pluggable header decryption; identity by default.
pub struct DecryptHeadersStage {
    hook: DecryptHook,
}

impl DecryptHeadersStage {
    pub fn identity() -> Self {
        Self {
            hook: Arc::new(|headers: &HeaderMap| Ok(headers.clone())),
        }
    }

    pub fn with_hook(hook: DecryptHook) -> Self {
        Self { hook }
    }
}

impl Stage for DecryptHeadersStage {
    fn name(&self) -> &'static str {
        "decrypt_headers"
    }

    fn run(&self, ctx: &mut StageContext) -> Result<(), GatewayError> {
        ctx.headers = (self.hook)(&ctx.headers)?;
        Ok(())
    }
}

/// Stage 3: ensure a non-expired bearer credential, refreshing (at most
/// once per tenant concurrently) if needed.
pub struct EnsureTokenStage;

impl Stage for EnsureTokenStage {
    fn name(&self) -> &'static str {
        "ensure_token"
    }

    fn run(&self, ctx: &mut StageContext) -> Result<(), GatewayError> {
        let credential = ctx
            .runtime
            .block_on(ctx.credentials.ensure_valid(&ctx.tenant, &ctx.config.auth))?;
        ctx.token = Some(credential.access_token);
        Ok(())
    }
}

/// Stage 4: POST the inbound payload to `apiEndpoint`, retrying retryable
/// failures with exponential backoff and jitter, and granting one
/// uncounted bonus retry after a 401-class response once the credential
/// has been invalidated and refreshed.
pub struct ForwardStage;

impl ForwardStage {
    async fn send_once(ctx: &StageContext) -> Result<u16, GatewayError> {
        let auth_body = &ctx.config.auth.auth_body;
        let token = ctx.token.as_deref().unwrap_or_default();

        let response = ctx
            .http_client
            .post(&ctx.config.forward.api_endpoint)
            .timeout(ctx.config.forward.api_timeout)
            .header(
                auth_body.header_name.as_str(),
                format!("{}{}", auth_body.header_prefix, token),
            )
            .body(ctx.body.clone())
            .send()
            .await
            .map_err(|e| GatewayError::Transient {
                tenant: ctx.tenant.clone(),
                message: format!("forward call failed: {e}"),
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(GatewayError::Auth {
                tenant: ctx.tenant.clone(),
                message: format!("tenant endpoint returned {status}"),
            });
        }
        if status.is_success() {
            return Ok(status.as_u16());
        }
        let code = status.as_u16();
        if code == 408 || code == 429 || status.is_server_error() {
            return Err(GatewayError::Transient {
                tenant: ctx.tenant.clone(),
                message: format!("tenant endpoint returned {status}"),
            });
        }
        Err(GatewayError::Internal {
            tenant: ctx.tenant.clone(),
            message: format!("tenant endpoint returned {status}"),
        })
    }
}

impl Stage for ForwardStage {
    fn name(&self) -> &'static str {
        "forward"
    }

    fn run(&self, ctx: &mut StageContext) -> Result<(), GatewayError> {
        let retry = ctx.config.retry.clone();
        let mut attempt = 0usize;
        let mut bonus_used = false;

        loop {
            attempt += 1;
            ctx.attempts = attempt;

            match ctx.runtime.block_on(Self::send_once(ctx)) {
                Ok(status) => {
                    ctx.final_status = Some(status);
                    return Ok(());
                }
                Err(GatewayError::Auth { .. }) if !bonus_used => {
                    bonus_used = true;
                    ctx.credentials.invalidate(&ctx.tenant);
                    let credential = ctx
                        .runtime
                        .block_on(ctx.credentials.ensure_valid(&ctx.tenant, &ctx.config.auth))?;
                    ctx.token = Some(credential.access_token);
                    attempt -= 1; // bonus retry: not counted against maxAttempts
                }
                Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                    let delay = delay_for(&retry, attempt + 1);
                    ctx.runtime.block_on(tokio::time::sleep(delay));
                }
                Err(e) => {
                    ctx.final_status = None;
                    return Err(e);
                }
            }
        }
    }
}
