//! The Route Manager: maintains the set of active per-tenant ingest loops
//! and reconciles them against the config store.
//!
//! Owns a `routes: RwLock<BTreeMap<TenantId, RouteSlot>>`, started/stopped
//! as routes change, mirroring a router that keys its active-route and
//! consumer tables the same way. Reconciliation for a single tenant is
//! serialized on that tenant's own `tokio::sync::Mutex` slot rather than one
//! lock over the whole table, so concurrent tenants never block each other.

use crate::consumer::{Consumer, MessageHandler};
use crate::notification::{ChangeNotification, ChangeType};
use crate::route::ActiveRoute;
use partner_gateway_breaker::BreakerRegistry;
use partner_gateway_config::{ConfigStore, TenantConfig};
use partner_gateway_core::{GatewayError, TenantId};
use partner_gateway_credentials::CredentialCache;
use partner_gateway_pool::PoolRegistry;
use partner_gateway_processor::TenantProcessor;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, RwLock};

/// The default bound on configuration staleness between event-driven
/// reconciliations.
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(300);

/// The drain window used when replacing a route whose `configVersion`
/// changed.
const REPLACE_DRAIN_GRACE: Duration = Duration::from_millis(200);

type RouteSlot = Arc<AsyncMutex<Option<ActiveRoute>>>;

/// Owns the active-route table and composes the config store, pool
/// registry, breaker registry, credential cache, and tenant processor into
/// running ingest loops.
pub struct RouteManager {
    config_store: Arc<dyn ConfigStore>,
    pool: Arc<PoolRegistry>,
    breakers: Arc<BreakerRegistry>,
    credentials: Arc<CredentialCache>,
    processor: Arc<TenantProcessor>,
    consumer: Arc<dyn Consumer>,
    routes: RwLock<BTreeMap<TenantId, RouteSlot>>,
}

impl RouteManager {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        pool: Arc<PoolRegistry>,
        breakers: Arc<BreakerRegistry>,
        credentials: Arc<CredentialCache>,
        processor: Arc<TenantProcessor>,
        consumer: Arc<dyn Consumer>,
    ) -> Self {
        Self {
            config_store,
            pool,
            breakers,
            credentials,
            processor,
            consumer,
            routes: RwLock::new(BTreeMap::new()),
        }
    }

    async fn slot_for(&self, tenant: &TenantId) -> RouteSlot {
        if let Some(slot) = self.routes.read().await.get(tenant) {
            return Arc::clone(slot);
        }
        let mut routes = self.routes.write().await;
        Arc::clone(
            routes
                .entry(tenant.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(None))),
        )
    }

    /// Dispatches one webhook notification. `DELETED` stops the route
    /// directly without consulting the config store (the tenant may already
    /// be gone from it); `CREATED`/`UPDATED` reconcile from the current
    /// config document. Both paths funnel through the same per-tenant
    /// reconciliation so event notifications and the periodic reload can
    /// never disagree about what "reconciled" means.
    pub async fn on_notification(
        &self,
        notification: ChangeNotification,
    ) -> Result<(), GatewayError> {
        match notification.change_type {
            ChangeType::Deleted => self.remove_route(&notification.tenant_id).await,
            ChangeType::Created | ChangeType::Updated => {
                self.reconcile_tenant(&notification.tenant_id).await
            }
        }
    }

    /// Reconciles one tenant against its current config-store document.
    /// Idempotent: applying the same `(tenantId, configVersion)` twice is a
    /// no-op.
    pub async fn reconcile_tenant(&self, tenant: &TenantId) -> Result<(), GatewayError> {
        let slot = self.slot_for(tenant).await;
        let mut guard = slot.lock().await;

        match self.config_store.fetch(tenant).await {
            Ok(config) => self.ensure_active(tenant, config, &mut guard).await,
            Err(GatewayError::NotFound { .. }) => {
                self.stop_locked(tenant, &mut guard);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Reloads every document from the config store and reconciles the
    /// whole tenant set, removing routes for tenants absent from the
    /// reloaded set. This is the safety net behind event notifications.
    pub async fn reconcile_all(&self) -> Result<(), GatewayError> {
        let documents = self.config_store.reload_all().await?;

        for (tenant, config) in &documents {
            let slot = self.slot_for(tenant).await;
            let mut guard = slot.lock().await;
            self.ensure_active(tenant, config.clone(), &mut guard)
                .await?;
        }

        let known: Vec<TenantId> = self.routes.read().await.keys().cloned().collect();
        for tenant in known {
            if documents.contains_key(&tenant) {
                continue;
            }
            let slot = self.slot_for(&tenant).await;
            let mut guard = slot.lock().await;
            self.stop_locked(&tenant, &mut guard);
        }
        Ok(())
    }

    /// Manual per-tenant reconciliation, as exposed by the Control API's
    /// `POST /{partnerId}/refresh`.
    pub async fn refresh(&self, tenant: &TenantId) -> Result<(), GatewayError> {
        self.reconcile_tenant(tenant).await
    }

    /// `POST /refresh-all`.
    pub async fn refresh_all(&self) -> Result<(), GatewayError> {
        self.reconcile_all().await
    }

    async fn remove_route(&self, tenant: &TenantId) -> Result<(), GatewayError> {
        let slot = self.slot_for(tenant).await;
        let mut guard = slot.lock().await;
        self.stop_locked(tenant, &mut guard);
        Ok(())
    }

    /// Creates the route if absent, replaces it if `configVersion` changed,
    /// or no-ops if the installed version already matches.
    async fn ensure_active(
        &self,
        tenant: &TenantId,
        config: TenantConfig,
        guard: &mut Option<ActiveRoute>,
    ) -> Result<(), GatewayError> {
        if let Some(existing) = guard.as_ref() {
            if existing.config_version == config.version {
                return Ok(());
            }
            tracing::info!(
                tenant = %tenant,
                from_version = existing.config_version,
                to_version = config.version,
                "replacing route for config version change"
            );
            self.stop_locked(tenant, guard);
            tokio::time::sleep(REPLACE_DRAIN_GRACE).await;
        } else {
            tracing::info!(tenant = %tenant, version = config.version, "creating route");
        }

        let route_id = tenant.route_id();
        let queue_name = config.queue_name();
        let handler = self.build_handler(tenant.clone(), config.clone());
        let consumer_handle = self.consumer.start(queue_name, handler);

        *guard = Some(ActiveRoute {
            route_id,
            config_version: config.version,
            consumer_handle,
        });
        Ok(())
    }

    fn stop_locked(&self, tenant: &TenantId, guard: &mut Option<ActiveRoute>) {
        if let Some(route) = guard.take() {
            tracing::info!(tenant = %tenant, route_id = %route.route_id, "stopping route");
            route.consumer_handle.stop();
            // Breaker and credential state outlive the route's own
            // lifecycle table, to absorb in-flight settlement; the pool is
            // left running too so queued messages still drain rather than
            // being abandoned mid-flight.
        }
    }

    /// Builds the non-blocking handoff the `Consumer` invokes per message:
    /// hand straight to a spawned task that runs the tenant's pipeline
    /// through its breaker and pool, since the consumer callback must not
    /// block.
    fn build_handler(&self, tenant: TenantId, config: TenantConfig) -> MessageHandler {
        let pool = Arc::clone(&self.pool);
        let breakers = Arc::clone(&self.breakers);
        let processor = Arc::clone(&self.processor);

        Arc::new(move |record| {
            let tenant = tenant.clone();
            let config = config.clone();
            let pool = Arc::clone(&pool);
            let breakers = Arc::clone(&breakers);
            let processor = Arc::clone(&processor);

            tokio::spawn(async move {
                if let Err(e) = processor
                    .process(&tenant, &config, &breakers, &pool, record)
                    .await
                {
                    tracing::debug!(tenant = %tenant, error = %e, "ingest message finished with error");
                }
            });
        })
    }

    /// `GET /routes/status`: `{activeRouteCount, activeRoutes}`.
    pub async fn routes_status(&self) -> BTreeMap<TenantId, String> {
        let mut out = BTreeMap::new();
        let routes = self.routes.read().await;
        for (tenant, slot) in routes.iter() {
            if let Some(route) = slot.lock().await.as_ref() {
                out.insert(tenant.clone(), route.route_id.clone());
            }
        }
        out
    }

    pub async fn has_active_route(&self, tenant: &TenantId) -> bool {
        match self.routes.read().await.get(tenant) {
            Some(slot) => slot.lock().await.is_some(),
            None => false,
        }
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    pub fn pool(&self) -> &PoolRegistry {
        &self.pool
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    pub fn config_store(&self) -> &dyn ConfigStore {
        self.config_store.as_ref()
    }

    /// Spawns the periodic full reload. The returned handle is never awaited
    /// by callers in normal operation; it runs for the lifetime of the
    /// process.
    pub fn spawn_periodic_reload(
        self: &Arc<Self>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it, event notifications seed the initial set
            loop {
                ticker.tick().await;
                if let Err(e) = manager.reconcile_all().await {
                    tracing::warn!(error = %e, "periodic config reload failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::ChannelConsumer;
    use partner_gateway_config::InMemoryConfigStore;
    use partner_gateway_processor::{IngestRecord, LoggingOutcomeSink};
    use std::sync::Arc as StdArc;

    fn test_config(tenant: &TenantId, version: u64) -> TenantConfig {
        let mut cfg = TenantConfig::default_profile(tenant.clone());
        cfg.version = version;
        cfg
    }

    fn new_manager(
        store: StdArc<InMemoryConfigStore>,
        consumer: StdArc<ChannelConsumer>,
    ) -> StdArc<RouteManager> {
        let pool = StdArc::new(PoolRegistry::new());
        let breakers = StdArc::new(BreakerRegistry::new());
        let credentials = StdArc::new(CredentialCache::new());
        let processor = StdArc::new(TenantProcessor::new(
            tokio::runtime::Handle::current(),
            StdArc::clone(&credentials),
            StdArc::new(LoggingOutcomeSink),
        ));
        StdArc::new(RouteManager::new(
            store, pool, breakers, credentials, processor, consumer,
        ))
    }

    #[tokio::test]
    async fn created_notification_installs_a_route_observable_in_status() {
        let store = StdArc::new(InMemoryConfigStore::new());
        let consumer = StdArc::new(ChannelConsumer::new());
        let tenant = TenantId::new("X").unwrap();
        store.insert(test_config(&tenant, 1));

        let manager = new_manager(store, consumer);
        manager
            .on_notification(ChangeNotification {
                tenant_id: tenant.clone(),
                change_type: ChangeType::Created,
                version: Some(1),
            })
            .await
            .unwrap();

        let status = manager.routes_status().await;
        assert_eq!(status.get(&tenant).unwrap(), "Partner:X:Main");
    }

    #[tokio::test]
    async fn deleted_notification_removes_the_route() {
        let store = StdArc::new(InMemoryConfigStore::new());
        let consumer = StdArc::new(ChannelConsumer::new());
        let tenant = TenantId::new("X").unwrap();
        store.insert(test_config(&tenant, 1));

        let manager = new_manager(store, consumer);
        manager
            .on_notification(ChangeNotification {
                tenant_id: tenant.clone(),
                change_type: ChangeType::Created,
                version: Some(1),
            })
            .await
            .unwrap();
        manager
            .on_notification(ChangeNotification {
                tenant_id: tenant.clone(),
                change_type: ChangeType::Deleted,
                version: None,
            })
            .await
            .unwrap();

        assert!(manager.routes_status().await.get(&tenant).is_none());
    }

    #[tokio::test]
    async fn reapplying_the_same_version_is_a_no_op() {
        let store = StdArc::new(InMemoryConfigStore::new());
        let consumer = StdArc::new(ChannelConsumer::new());
        let tenant = TenantId::new("X").unwrap();
        store.insert(test_config(&tenant, 1));

        let manager = new_manager(store, consumer);
        manager.reconcile_tenant(&tenant).await.unwrap();
        let first_route_id = manager
            .routes_status()
            .await
            .get(&tenant)
            .cloned()
            .unwrap();

        manager.reconcile_tenant(&tenant).await.unwrap();
        let second_route_id = manager
            .routes_status()
            .await
            .get(&tenant)
            .cloned()
            .unwrap();

        assert_eq!(first_route_id, second_route_id);
    }

    #[tokio::test]
    async fn version_change_replaces_the_route() {
        let store = StdArc::new(InMemoryConfigStore::new());
        let consumer = StdArc::new(ChannelConsumer::new());
        let tenant = TenantId::new("X").unwrap();
        store.insert(test_config(&tenant, 1));

        let manager = new_manager(store.clone(), consumer);
        manager.reconcile_tenant(&tenant).await.unwrap();

        store.insert(test_config(&tenant, 2));
        manager.reconcile_tenant(&tenant).await.unwrap();

        assert!(manager.has_active_route(&tenant).await);
    }

    #[tokio::test]
    async fn reconcile_all_removes_routes_absent_from_reload() {
        let store = StdArc::new(InMemoryConfigStore::new());
        let consumer = StdArc::new(ChannelConsumer::new());
        let tenant = TenantId::new("X").unwrap();
        store.insert(test_config(&tenant, 1));

        let manager = new_manager(store.clone(), consumer);
        manager.reconcile_all().await.unwrap();
        assert!(manager.has_active_route(&tenant).await);

        store.remove(&tenant);
        manager.reconcile_all().await.unwrap();
        assert!(!manager.has_active_route(&tenant).await);
    }

    #[tokio::test]
    async fn published_message_reaches_the_tenant_pipeline() {
        let store = StdArc::new(InMemoryConfigStore::new());
        let consumer = StdArc::new(ChannelConsumer::new());
        let tenant = TenantId::new("X").unwrap();
        store.insert(test_config(&tenant, 1));

        let manager = new_manager(store.clone(), StdArc::clone(&consumer));
        manager.reconcile_tenant(&tenant).await.unwrap();

        let mut headers = http::HeaderMap::new();
        headers.insert(
            partner_gateway_processor::stage::BUSINESS_UNIT_HEADER,
            http::HeaderValue::from_static("X"),
        );
        let published = consumer
            .publish(
                &tenant.queue_name(),
                IngestRecord {
                    headers,
                    body: b"hello".to_vec(),
                },
            )
            .await;
        assert!(published);

        // Pipeline runs on a spawned task; give it a tick to at least start
        // without asserting its outcome (no real tenant endpoint here).
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
