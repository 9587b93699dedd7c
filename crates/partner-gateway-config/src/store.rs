//! The Tenant Config Store interface and its two
//! implementations: an in-memory store for tests and local development, and
//! an HTTP adapter for the real document index.

use crate::model::TenantConfig;
use async_trait::async_trait;
use parking_lot::RwLock;
use partner_gateway_core::{GatewayError, TenantId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Returns current `TenantConfig` by id; supports full reload.
///
/// This is the only interface the rest of the gateway has onto tenant
/// configuration — no component reaches into a concrete store
/// implementation directly; every consumer takes `Arc<dyn ConfigStore>`
/// through its constructor.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn fetch(&self, tenant: &TenantId) -> Result<TenantConfig, GatewayError>;

    /// Loads every document currently in the store. Used by the periodic
    /// full reload and by `refresh-all`.
    async fn reload_all(&self) -> Result<HashMap<TenantId, TenantConfig>, GatewayError>;

    /// Writes a document. Most deployments manage the document index out of
    /// band; the default implementation reports that the store is
    /// read-only so only adapters that actually support writes (the
    /// in-memory store, and the Control API's bulk-update endpoint against
    /// it) need to override this.
    async fn upsert(&self, config: TenantConfig) -> Result<(), GatewayError> {
        Err(GatewayError::Internal {
            tenant: config.tenant_id,
            message: "this config store does not support writes".into(),
        })
    }
}

/// In-memory config store backed by a `parking_lot::RwLock`, used in tests
/// and for local/dev deployments that don't run a real document index.
#[derive(Default)]
pub struct InMemoryConfigStore {
    documents: RwLock<HashMap<TenantId, TenantConfig>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, config: TenantConfig) {
        self.documents
            .write()
            .insert(config.tenant_id.clone(), config);
    }

    pub fn remove(&self, tenant: &TenantId) {
        self.documents.write().remove(tenant);
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn fetch(&self, tenant: &TenantId) -> Result<TenantConfig, GatewayError> {
        self.documents
            .read()
            .get(tenant)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                tenant: tenant.clone(),
            })
    }

    async fn reload_all(&self) -> Result<HashMap<TenantId, TenantConfig>, GatewayError> {
        Ok(self.documents.read().clone())
    }

    async fn upsert(&self, config: TenantConfig) -> Result<(), GatewayError> {
        config.validate()?;
        self.insert(config);
        Ok(())
    }
}

/// HTTP adapter over the tenant config document index. The wire format past
/// `GET {base}/{tenantId}` and `GET {base}` is the document index's own
/// concern, not part of this crate's contract.
pub struct HttpConfigStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpConfigStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(5))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client construction"),
        }
    }
}

#[async_trait]
impl ConfigStore for HttpConfigStore {
    async fn fetch(&self, tenant: &TenantId) -> Result<TenantConfig, GatewayError> {
        let url = format!("{}/{}", self.base_url, tenant.as_str());
        let response = self.client.get(&url).send().await.map_err(|e| {
            GatewayError::Transient {
                tenant: tenant.clone(),
                message: format!("config store request failed: {e}"),
            }
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound {
                tenant: tenant.clone(),
            });
        }
        if !response.status().is_success() {
            return Err(GatewayError::Internal {
                tenant: tenant.clone(),
                message: format!("config store returned {}", response.status()),
            });
        }

        let config: TenantConfig = response.json().await.map_err(|e| GatewayError::Internal {
            tenant: tenant.clone(),
            message: format!("malformed config document: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    async fn reload_all(&self) -> Result<HashMap<TenantId, TenantConfig>, GatewayError> {
        let response =
            self.client
                .get(&self.base_url)
                .send()
                .await
                .map_err(|e| GatewayError::Internal {
                    tenant: TenantId::new("<reload-all>").expect("non-empty literal"),
                    message: format!("config store reload failed: {e}"),
                })?;

        let configs: Vec<TenantConfig> =
            response.json().await.map_err(|e| GatewayError::Internal {
                tenant: TenantId::new("<reload-all>").expect("non-empty literal"),
                message: format!("malformed config document list: {e}"),
            })?;

        let mut out = HashMap::with_capacity(configs.len());
        for config in configs {
            config.validate()?;
            out.insert(config.tenant_id.clone(), config);
        }
        Ok(out)
    }
}

/// Convenience alias for the trait object used by every downstream crate.
pub type SharedConfigStore = Arc<dyn ConfigStore>;
