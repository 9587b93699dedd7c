//! Single-flight per-tenant credential refresh.
//!
//! One refresh in flight per tenant: a concurrent caller either becomes the
//! leader (does the exchange) or a follower (awaits the leader's result) via
//! a lock-and-check over the tenant's slot. A `tokio::sync::broadcast`
//! channel of capacity 1 hands the leader's result to every waiter.

use crate::exchange::exchange_token;
use crate::model::Credential;
use parking_lot::{Mutex, RwLock};
use partner_gateway_config::AuthParams;
use partner_gateway_core::{GatewayError, TenantId};
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

#[derive(Default)]
struct Slot {
    credential: Option<Credential>,
    inflight: Option<broadcast::Sender<Result<Credential, GatewayError>>>,
}

pub struct CredentialCache {
    client: Client,
    slots: RwLock<BTreeMap<TenantId, Arc<Mutex<Slot>>>>,
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialCache {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            slots: RwLock::new(BTreeMap::new()),
        }
    }

    fn get_or_create(&self, tenant: &TenantId) -> Arc<Mutex<Slot>> {
        if let Some(slot) = self.slots.read().get(tenant) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        Arc::clone(
            slots
                .entry(tenant.clone())
                .or_insert_with(|| Arc::new(Mutex::new(Slot::default()))),
        )
    }

    /// Returns a credential guaranteed non-expired at return time. At most
    /// one refresh per tenant is ever in flight; concurrent callers join
    /// the leader's attempt instead of issuing their own.
    pub async fn ensure_valid(
        &self,
        tenant: &TenantId,
        auth: &AuthParams,
    ) -> Result<Credential, GatewayError> {
        let slot = self.get_or_create(tenant);

        loop {
            enum Action {
                Cached(Credential),
                Join(broadcast::Receiver<Result<Credential, GatewayError>>),
                Lead(broadcast::Sender<Result<Credential, GatewayError>>),
            }

            let action = {
                let mut guard = slot.lock();
                if let Some(cred) = &guard.credential {
                    if cred.is_valid_at(Instant::now()) {
                        Action::Cached(cred.clone())
                    } else if let Some(sender) = &guard.inflight {
                        Action::Join(sender.subscribe())
                    } else {
                        let (tx, _rx) = broadcast::channel(1);
                        guard.inflight = Some(tx.clone());
                        Action::Lead(tx)
                    }
                } else if let Some(sender) = &guard.inflight {
                    Action::Join(sender.subscribe())
                } else {
                    let (tx, _rx) = broadcast::channel(1);
                    guard.inflight = Some(tx.clone());
                    Action::Lead(tx)
                }
            };

            match action {
                Action::Cached(cred) => return Ok(cred),
                Action::Join(mut rx) => match rx.recv().await {
                    Ok(result) => return result,
                    // Leader dropped the sender without completing, or we
                    // lagged past its single message: retry, possibly as
                    // the new leader.
                    Err(_) => continue,
                },
                Action::Lead(tx) => {
                    let result = exchange_token(&self.client, tenant, auth)
                        .await
                        .map(|access_token| Credential {
                            access_token,
                            refresh_token: None,
                            issued_at: Instant::now(),
                            expires_at: Instant::now() + auth.token_lifetime,
                        });

                    {
                        let mut guard = slot.lock();
                        guard.inflight = None;
                        if let Ok(cred) = &result {
                            guard.credential = Some(cred.clone());
                        }
                    }
                    let _ = tx.send(result.clone());
                    return result;
                }
            }
        }
    }

    /// Drops the cached credential; called on observed 401-class responses.
    pub fn invalidate(&self, tenant: &TenantId) {
        if let Some(slot) = self.slots.read().get(tenant) {
            slot.lock().credential = None;
        }
    }

    pub fn remove(&self, tenant: &TenantId) {
        self.slots.write().remove(tenant);
    }

    /// Number of tenants with a slot in the cache (cached or mid-refresh),
    /// for the Control API's health rollup.
    pub fn cached_tenant_count(&self) -> usize {
        self.slots.read().len()
    }
}
