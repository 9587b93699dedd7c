//! The per-message pipeline represented as a first-class ordered list of
//! stages.

use http::HeaderMap;
use partner_gateway_config::TenantConfig;
use partner_gateway_core::{GatewayError, TenantId};
use partner_gateway_credentials::CredentialCache;
use std::sync::Arc;

/// Mutable state threaded through the pipeline for one message.
pub struct StageContext {
    pub tenant: TenantId,
    pub config: TenantConfig,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub token: Option<String>,
    pub attempts: usize,
    pub final_status: Option<u16>,
    pub runtime: tokio::runtime::Handle,
    pub http_client: reqwest::Client,
    pub credentials: Arc<CredentialCache>,
}

/// One step of the pipeline. Implementations run synchronously on the
/// tenant's pool worker thread; stages needing network I/O bridge onto it
/// via `ctx.runtime.block_on(..)` since pool workers are plain OS threads,
/// not async tasks (see `partner-gateway-pool::pool`).
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(&self, ctx: &mut StageContext) -> Result<(), GatewayError>;
}

pub const BUSINESS_UNIT_HEADER: &str = "CBUSINESSUNIT";
