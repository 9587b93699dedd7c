//! Owns one bounded worker pool per tenant.

use crate::pool::TenantPool;
use crate::state::PoolState;
use parking_lot::RwLock;
use partner_gateway_config::PoolParams;
use partner_gateway_core::{GatewayError, TenantId};
use std::collections::BTreeMap;
use std::time::Duration;

/// Registry of per-tenant worker pools.
///
/// Each tenant slot is independent in threads, queue, and failure
/// accounting — one tenant cannot consume another's capacity. Global
/// operations acquire a read lock on the map, then walk tenant ids in
/// sorted order so `shutdownAll` is deterministic and lock ordering across
/// concurrent global operations never deadlocks.
#[derive(Default)]
pub struct PoolRegistry {
    pools: RwLock<BTreeMap<TenantId, TenantPool>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `task` on `tenant`'s pool, creating it on demand from
    /// `pool_params` if this is the first task ever submitted for the
    /// tenant. Callers without a known config pass
    /// `TenantConfig::default_profile(tenant).pool`.
    pub fn submit<T, F>(
        &self,
        tenant: &TenantId,
        pool_params: &PoolParams,
        task: F,
    ) -> impl std::future::Future<Output = Result<T, GatewayError>> + Send + 'static
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, GatewayError> + Send + 'static,
    {
        let pool = self.get_or_create(tenant, pool_params);
        pool.submit(task)
    }

    fn get_or_create(&self, tenant: &TenantId, pool_params: &PoolParams) -> TenantPool {
        if let Some(pool) = self.pools.read().get(tenant) {
            return pool.clone();
        }
        let mut pools = self.pools.write();
        pools
            .entry(tenant.clone())
            .or_insert_with(|| TenantPool::new(tenant.clone(), pool_params.clone()))
            .clone()
    }

    pub fn stats(&self, tenant: &TenantId) -> Option<PoolState> {
        self.pools.read().get(tenant).map(|p| p.stats())
    }

    pub fn all(&self) -> BTreeMap<TenantId, PoolState> {
        self.pools
            .read()
            .iter()
            .map(|(id, pool)| (id.clone(), pool.stats()))
            .collect()
    }

    /// Drains `tenant`'s queue up to `grace`, then cancels what remains.
    /// The pool entry stays registered (and its breaker/credential data
    /// untouched) until [`PoolRegistry::remove`] is called explicitly.
    pub fn shutdown(&self, tenant: &TenantId, grace: Duration) {
        if let Some(pool) = self.pools.read().get(tenant) {
            pool.shutdown(grace);
        }
    }

    /// Applies [`shutdown`](Self::shutdown) to every pool, in tenant-id
    /// sorted order, so tests can observe a deterministic sequence.
    pub fn shutdown_all(&self, grace: Duration) {
        let tenants: Vec<TenantId> = self.pools.read().keys().cloned().collect();
        for tenant in tenants {
            self.shutdown(&tenant, grace);
        }
    }

    /// Garbage-collects a tenant's pool after it has been drained.
    pub fn remove(&self, tenant: &TenantId) {
        self.pools.write().remove(tenant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn params() -> PoolParams {
        PoolParams {
            core_workers: 1,
            max_workers: 2,
            queue_capacity: 8,
            idle_keep_alive: StdDuration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn isolation_one_failing_tenant_does_not_affect_another() {
        let registry = PoolRegistry::new();
        let tenant_a = TenantId::new("A").unwrap();
        let tenant_b = TenantId::new("B").unwrap();

        let mut a_futures = Vec::new();
        for _ in 0..20 {
            a_futures.push(registry.submit(&tenant_a, &params(), || {
                std::thread::sleep(StdDuration::from_millis(5));
                Ok::<_, GatewayError>(())
            }));
        }

        let mut b_futures = Vec::new();
        for _ in 0..20 {
            b_futures.push(registry.submit(&tenant_b, &params(), || {
                Err::<(), _>(GatewayError::Internal {
                    tenant: TenantId::new("B").unwrap(),
                    message: "boom".into(),
                })
            }));
        }

        for f in a_futures {
            assert!(f.await.is_ok());
        }
        for f in b_futures {
            assert!(f.await.is_err());
        }

        assert_eq!(registry.stats(&tenant_a).unwrap().completed_count, 20);
        assert_eq!(registry.stats(&tenant_b).unwrap().completed_count, 20);
    }

    #[tokio::test]
    async fn unknown_tenant_has_no_stats_until_first_submission() {
        let registry = PoolRegistry::new();
        let tenant = TenantId::new("ghost").unwrap();
        assert!(registry.stats(&tenant).is_none());

        registry
            .submit(&tenant, &params(), || Ok::<_, GatewayError>(()))
            .await
            .unwrap();
        assert!(registry.stats(&tenant).is_some());
    }

    #[tokio::test]
    async fn remove_drops_the_pool_entry() {
        let registry = PoolRegistry::new();
        let tenant = TenantId::new("acme").unwrap();
        registry
            .submit(&tenant, &params(), || Ok::<_, GatewayError>(()))
            .await
            .unwrap();
        registry.shutdown(&tenant, StdDuration::from_millis(20));
        registry.remove(&tenant);
        assert!(registry.stats(&tenant).is_none());
    }
}
