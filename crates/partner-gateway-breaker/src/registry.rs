//! Owns one circuit breaker per tenant, composing with the Pool Registry
//! so admission control happens before a call ever reaches a worker thread.

use crate::circuit::Circuit;
use crate::state::BreakerState;
use parking_lot::{Mutex, RwLock};
use partner_gateway_config::{BreakerParams, PoolParams};
use partner_gateway_core::{GatewayError, TenantId};
use partner_gateway_pool::PoolRegistry;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

#[derive(Default)]
pub struct BreakerRegistry {
    breakers: RwLock<BTreeMap<TenantId, Arc<Mutex<Circuit>>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_create(&self, tenant: &TenantId) -> Arc<Mutex<Circuit>> {
        if let Some(circuit) = self.breakers.read().get(tenant) {
            return Arc::clone(circuit);
        }
        let mut breakers = self.breakers.write();
        Arc::clone(
            breakers
                .entry(tenant.clone())
                .or_insert_with(|| Arc::new(Mutex::new(Circuit::new()))),
        )
    }

    /// Gates `task` through `tenant`'s breaker, then — if permitted —
    /// submits it to `pool` for the same tenant. Rejection short-circuits
    /// before any pool submission; the pool never even sees the task.
    pub fn execute<T, F>(
        &self,
        tenant: &TenantId,
        breaker_cfg: &BreakerParams,
        pool: &PoolRegistry,
        pool_cfg: &PoolParams,
        task: F,
    ) -> Pin<Box<dyn Future<Output = Result<T, GatewayError>> + Send>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, GatewayError> + Send + 'static,
    {
        let circuit = self.get_or_create(tenant);
        let permitted = circuit.lock().try_acquire(breaker_cfg);

        if !permitted {
            let tenant = tenant.clone();
            return Box::pin(async move { Err(GatewayError::BreakerOpen { tenant }) });
        }

        let breaker_cfg = breaker_cfg.clone();
        let wrapped = move || {
            let result = task();
            match &result {
                Ok(_) => circuit.lock().record_success(&breaker_cfg),
                Err(_) => circuit.lock().record_failure(&breaker_cfg),
            }
            result
        };

        Box::pin(pool.submit(tenant, pool_cfg, wrapped))
    }

    pub fn stats(&self, tenant: &TenantId) -> Option<BreakerState> {
        self.breakers
            .read()
            .get(tenant)
            .map(|circuit| circuit.lock().snapshot())
    }

    pub fn all(&self) -> BTreeMap<TenantId, BreakerState> {
        self.breakers
            .read()
            .iter()
            .map(|(id, circuit)| (id.clone(), circuit.lock().snapshot()))
            .collect()
    }

    pub fn is_healthy(&self, tenant: &TenantId) -> bool {
        self.stats(tenant)
            .map(|s| matches!(s.state, crate::state::BreakerPhase::Closed))
            .unwrap_or(true)
    }

    pub fn force_open(&self, tenant: &TenantId, cfg: &BreakerParams) {
        self.get_or_create(tenant).lock().force_open(cfg);
    }

    pub fn force_closed(&self, tenant: &TenantId, cfg: &BreakerParams) {
        self.get_or_create(tenant).lock().force_closed(cfg);
    }

    pub fn force_half_open(&self, tenant: &TenantId, cfg: &BreakerParams) {
        self.get_or_create(tenant).lock().force_half_open(cfg);
    }

    pub fn remove(&self, tenant: &TenantId) {
        self.breakers.write().remove(tenant);
    }
}
