//! The broker-facing consumer abstraction.
//!
//! One trait object per queue, owned by the route manager, started and
//! stopped as routes are reconciled.
//!
//! Two topologies are both expressible through the same trait:
//! [`ChannelConsumer`] models a durable per-tenant queue directly;
//! [`PreDispatchConsumer`] models a single shared `message.processing.queue`
//! by demultiplexing on the `CBUSINESSUNIT` header and handing off to
//! whichever per-tenant handler is currently registered. See DESIGN.md for
//! which is primary.

use http::HeaderMap;
use partner_gateway_core::TenantId;
use partner_gateway_processor::IngestRecord;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

pub type MessageHandler = Arc<dyn Fn(IngestRecord) + Send + Sync>;

/// A running ingest loop. Dropping it does not stop the loop; call
/// [`ConsumerHandle::stop`] explicitly so reconciliation controls the
/// drain window.
pub struct ConsumerHandle {
    task: Option<JoinHandle<()>>,
    on_stop: Option<Box<dyn FnOnce() + Send>>,
}

impl ConsumerHandle {
    fn from_task(task: JoinHandle<()>) -> Self {
        Self {
            task: Some(task),
            on_stop: None,
        }
    }

    /// A handle with no dedicated background task of its own — stopping it
    /// just runs `on_stop` (e.g. deregistering a handler from a consumer
    /// that owns one shared loop across every tenant).
    fn from_on_stop(on_stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            task: None,
            on_stop: Some(Box::new(on_stop)),
        }
    }

    pub fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(on_stop) = self.on_stop.take() {
            on_stop();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }
}

/// Something the Route Manager can start/stop per tenant queue.
pub trait Consumer: Send + Sync {
    /// Begins consuming `queue_name`, invoking `handler` once per message
    /// until the returned handle is stopped. `handler` must not block —
    /// processing is expected to hand off to the tenant's pool
    /// immediately (see `partner-gateway-processor::TenantProcessor`).
    fn start(&self, queue_name: String, handler: MessageHandler) -> ConsumerHandle;
}

/// An in-memory, per-tenant-queue consumer. Each `queue_name` gets its own
/// `tokio::mpsc` channel; `publish` is the test/demo-facing way to enqueue
/// a message as if the broker had delivered it.
#[derive(Default, Clone)]
pub struct ChannelConsumer {
    senders: Arc<AsyncMutex<HashMap<String, mpsc::UnboundedSender<IngestRecord>>>>,
}

impl ChannelConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, queue_name: &str, record: IngestRecord) -> bool {
        let senders = self.senders.lock().await;
        match senders.get(queue_name) {
            Some(tx) => tx.send(record).is_ok(),
            None => false,
        }
    }
}

impl Consumer for ChannelConsumer {
    fn start(&self, queue_name: String, handler: MessageHandler) -> ConsumerHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<IngestRecord>();
        let senders = Arc::clone(&self.senders);
        let queue_name_for_insert = queue_name.clone();

        // The channel must exist before any publisher can reach it, so
        // register synchronously via try_lock (uncontended: this consumer
        // is only mutated by the Route Manager's own serialized start/stop).
        if let Ok(mut guard) = senders.try_lock() {
            guard.insert(queue_name_for_insert, tx);
        }

        let task = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                handler(record);
            }
        });

        ConsumerHandle::from_task(task)
    }
}

/// Demultiplexes the shared pre-dispatch queue by `CBUSINESSUNIT`, routing
/// each message to whichever per-tenant handler is currently registered.
/// Unlike [`ChannelConsumer`], there is one ingest loop for the whole
/// process rather than one per tenant — `start` registers (or replaces) the
/// handler for its `queue_name` and lazily spawns that shared loop on first
/// use; `stop` just deregisters. Messages for a tenant with no registered
/// handler are dropped with a warning — the broker, not this process,
/// buffers them.
#[derive(Default, Clone)]
pub struct PreDispatchConsumer {
    handlers: Arc<AsyncMutex<HashMap<String, MessageHandler>>>,
    inbound: Arc<AsyncMutex<Option<mpsc::UnboundedSender<IngestRecord>>>>,
}

impl PreDispatchConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes one message onto the shared `message.processing.queue`,
    /// as if the broker's pre-dispatch consumer had delivered it straight
    /// from `message.processing.exchange`. Demultiplexed by `CBUSINESSUNIT`
    /// onto whichever per-tenant handler is currently registered.
    pub async fn publish(&self, record: IngestRecord) -> bool {
        match self.inbound.lock().await.as_ref() {
            Some(tx) => tx.send(record).is_ok(),
            None => false,
        }
    }

    async fn dispatch(handlers: &AsyncMutex<HashMap<String, MessageHandler>>, record: IngestRecord) {
        let tenant_header = record
            .headers
            .get(partner_gateway_processor::stage::BUSINESS_UNIT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let Some(tenant_header) = tenant_header else {
            tracing::warn!("pre-dispatch message missing CBUSINESSUNIT header, dropping");
            return;
        };

        let Ok(tenant) = TenantId::new(tenant_header) else {
            tracing::warn!("pre-dispatch message has a blank CBUSINESSUNIT header, dropping");
            return;
        };
        let queue_name = tenant.queue_name();

        let handlers = handlers.lock().await;
        match handlers.get(&queue_name) {
            Some(handler) => handler(record),
            None => tracing::warn!(tenant = %tenant, "no active route for pre-dispatch message"),
        }
    }
}

impl Consumer for PreDispatchConsumer {
    fn start(&self, queue_name: String, handler: MessageHandler) -> ConsumerHandle {
        // Registration is uncontended in practice (only the Route Manager's
        // own serialized per-tenant reconciliation calls `start`/`stop`),
        // so a synchronous try_lock is enough — mirrors `ChannelConsumer`.
        if let Ok(mut guard) = self.handlers.try_lock() {
            guard.insert(queue_name.clone(), handler);
        }

        // Lazily spawn the one shared dispatcher loop the first time any
        // tenant registers; later calls just add another handler entry.
        if let Ok(mut inbound) = self.inbound.try_lock() {
            if inbound.is_none() {
                let (tx, mut rx) = mpsc::unbounded_channel::<IngestRecord>();
                *inbound = Some(tx);
                let handlers = Arc::clone(&self.handlers);
                tokio::spawn(async move {
                    while let Some(record) = rx.recv().await {
                        Self::dispatch(&handlers, record).await;
                    }
                });
            }
        }

        let handlers = Arc::clone(&self.handlers);
        ConsumerHandle::from_on_stop(move || {
            tokio::spawn(async move {
                handlers.lock().await.remove(&queue_name);
            });
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn header_map(tenant: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            partner_gateway_processor::stage::BUSINESS_UNIT_HEADER,
            http::HeaderValue::from_str(tenant).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn pre_dispatch_routes_by_business_unit_header_to_registered_handler() {
        let consumer = PreDispatchConsumer::new();
        let tenant = TenantId::new("acme").unwrap();
        let delivered = Arc::new(AtomicUsize::new(0));
        let delivered_clone = Arc::clone(&delivered);

        let handle = consumer.start(
            tenant.queue_name(),
            Arc::new(move |_record| {
                delivered_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let published = consumer
            .publish(IngestRecord {
                headers: header_map("acme"),
                body: b"hello".to_vec(),
            })
            .await;
        assert!(published);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 1);

        handle.stop();
    }

    #[tokio::test]
    async fn pre_dispatch_drops_messages_for_an_unregistered_tenant() {
        let consumer = PreDispatchConsumer::new();
        let tenant = TenantId::new("acme").unwrap();
        let handle = consumer.start(tenant.queue_name(), Arc::new(|_record| {}));

        let published = consumer
            .publish(IngestRecord {
                headers: header_map("someone-else"),
                body: b"hello".to_vec(),
            })
            .await;
        assert!(published); // accepted onto the shared queue, just unroutable

        handle.stop();
    }

    #[tokio::test]
    async fn stopping_a_pre_dispatch_route_deregisters_its_handler() {
        let consumer = PreDispatchConsumer::new();
        let tenant = TenantId::new("acme").unwrap();
        let delivered = Arc::new(AtomicUsize::new(0));
        let delivered_clone = Arc::clone(&delivered);

        let handle = consumer.start(
            tenant.queue_name(),
            Arc::new(move |_record| {
                delivered_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;

        consumer
            .publish(IngestRecord {
                headers: header_map("acme"),
                body: b"hello".to_vec(),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
    }
}
