//! A single tenant's bounded worker pool.
//!
//! Workers are real OS threads, named `"Partner-<tenantId>-Worker-<n>"` so
//! the name is observable for operational diagnostics — an async task has
//! no OS-level name to assert against.
//! The bounded queue is a `crossbeam_channel`, which (unlike
//! `std::sync::mpsc`) lets many worker threads share one `Receiver` and
//! exposes `try_send`, giving back the un-sent item on failure so the
//! caller-runs fallback can execute it without cloning.

use crate::state::PoolState;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use partner_gateway_config::PoolParams;
use partner_gateway_core::{GatewayError, TenantId};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// A unit of work queued on a tenant's pool. `run(true)` executes the task
/// and reports its result; `run(false)` reports `ErrShuttingDown` without
/// running the task, used to cancel jobs still queued when a shutdown's
/// grace period elapses.
type Job = Box<dyn FnOnce(bool) + Send + 'static>;

struct Counters {
    active_workers: usize,
}

struct PoolShared {
    tenant: TenantId,
    sender: Sender<Job>,
    receiver: Receiver<Job>,
    config: PoolParams,
    counters: Mutex<Counters>,
    busy: AtomicUsize,
    completed: AtomicU64,
    shutting_down: AtomicBool,
    next_worker_id: AtomicUsize,
}

/// A bounded, tenant-scoped worker pool.
#[derive(Clone)]
pub struct TenantPool {
    shared: Arc<PoolShared>,
}

impl TenantPool {
    pub fn new(tenant: TenantId, config: PoolParams) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(config.queue_capacity);
        Self {
            shared: Arc::new(PoolShared {
                tenant,
                sender,
                receiver,
                config,
                counters: Mutex::new(Counters { active_workers: 0 }),
                busy: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
                shutting_down: AtomicBool::new(false),
                next_worker_id: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &PoolParams {
        &self.shared.config
    }

    /// Schedules `task` and returns a future resolving with its outcome.
    ///
    /// Mirrors a Java `ThreadPoolExecutor`: grow to `coreWorkers` first,
    /// then queue, then grow to `maxWorkers`, then — if the queue is still
    /// full and the pool is already at `maxWorkers` — run `task` on the
    /// calling context as deliberate backpressure.
    pub fn submit<T, F>(
        &self,
        task: F,
    ) -> impl std::future::Future<Output = Result<T, GatewayError>> + Send + 'static
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, GatewayError> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let tenant = shared.tenant.clone();

        let (tx, rx) = oneshot::channel::<Result<T, GatewayError>>();

        if shared.shutting_down.load(Ordering::Acquire) {
            let _ = tx.send(Err(GatewayError::ShuttingDown { tenant }));
            return Self::await_result(rx);
        }

        let job_tenant = tenant.clone();
        let mut job: Job = Box::new(move |proceed| {
            let result = if proceed {
                task()
            } else {
                Err(GatewayError::ShuttingDown {
                    tenant: job_tenant.clone(),
                })
            };
            let _ = tx.send(result);
        });

        // Step 1: ramp up to coreWorkers.
        {
            let mut counters = shared.counters.lock();
            if counters.active_workers < shared.config.core_workers {
                counters.active_workers += 1;
                drop(counters);
                Self::spawn_worker(Arc::clone(&shared), job, true);
                return Self::await_result(rx);
            }
        }

        // Step 2: the queue has room.
        match shared.sender.try_send(job) {
            Ok(()) => return Self::await_result(rx),
            Err(TrySendError::Full(returned)) => job = returned,
            Err(TrySendError::Disconnected(returned)) => job = returned,
        }

        // Step 3: grow to maxWorkers, handing the overflow task directly
        // to the new worker rather than re-queueing it.
        {
            let mut counters = shared.counters.lock();
            if counters.active_workers < shared.config.max_workers {
                counters.active_workers += 1;
                drop(counters);
                Self::spawn_worker(Arc::clone(&shared), job, false);
                return Self::await_result(rx);
            }
        }

        // Step 4: caller-runs fallback. Deliberate backpressure: the
        // submitter's own context pays for the task instead of dropping it.
        //
        // The caller may itself be a tokio task (the route manager's ingest
        // handler runs on a spawned task), and stages bridge back to async
        // I/O with `Handle::block_on`. Blocking a multi-thread runtime
        // worker with a nested `block_on` on that same runtime panics, so
        // run the job through `block_in_place` whenever one is present —
        // it hands this worker's other tasks off to its siblings for the
        // duration. `block_in_place` itself panics on a current-thread
        // runtime, so that case (and the plain-OS-thread case, which has no
        // current runtime at all) just runs the job inline.
        shared.busy.fetch_add(1, Ordering::AcqRel);
        let on_multi_thread_runtime = tokio::runtime::Handle::try_current()
            .map(|h| h.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread)
            .unwrap_or(false);
        if on_multi_thread_runtime {
            tokio::task::block_in_place(|| job(true));
        } else {
            job(true);
        }
        shared.busy.fetch_sub(1, Ordering::AcqRel);
        shared.completed.fetch_add(1, Ordering::Relaxed);
        Self::await_result(rx)
    }

    fn await_result<T: Send + 'static>(
        rx: oneshot::Receiver<Result<T, GatewayError>>,
    ) -> impl std::future::Future<Output = Result<T, GatewayError>> + Send + 'static {
        async move {
            rx.await.unwrap_or(Err(GatewayError::Internal {
                tenant: TenantId::new("<unknown>").expect("non-empty literal"),
                message: "worker dropped the result channel".into(),
            }))
        }
    }

    fn spawn_worker(shared: Arc<PoolShared>, first_job: Job, is_core: bool) {
        let worker_id = shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}{}", shared.tenant.worker_name_prefix(), worker_id);

        let result = thread::Builder::new().name(name).spawn(move || {
            Self::run_job(&shared, first_job);

            let idle_timeout = shared.config.idle_keep_alive;
            loop {
                if shared.shutting_down.load(Ordering::Acquire) && !is_core {
                    break;
                }
                match shared.receiver.recv_timeout(idle_timeout) {
                    Ok(job) => Self::run_job(&shared, job),
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                        if !is_core || shared.shutting_down.load(Ordering::Acquire) {
                            break;
                        }
                        // core workers keep waiting indefinitely (in practice,
                        // re-loop on each idle tick) until shutdown requests exit.
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }
            }
            shared.counters.lock().active_workers -= 1;
        });

        if let Err(e) = result {
            tracing::error!(tenant = %shared.tenant, error = %e, "failed to spawn pool worker thread");
            shared.counters.lock().active_workers -= 1;
        }
    }

    fn run_job(shared: &Arc<PoolShared>, job: Job) {
        shared.busy.fetch_add(1, Ordering::AcqRel);
        job(true);
        shared.busy.fetch_sub(1, Ordering::AcqRel);
        shared.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> PoolState {
        let active_workers = self.shared.counters.lock().active_workers;
        PoolState {
            active_count: self.shared.busy.load(Ordering::Relaxed),
            pool_size: active_workers,
            queue_depth: self.shared.receiver.len(),
            completed_count: self.shared.completed.load(Ordering::Relaxed),
            shutting_down: self.shared.shutting_down.load(Ordering::Relaxed),
        }
    }

    /// Drains queued tasks up to `grace`, then cancels whatever remains.
    pub fn shutdown(&self, grace: Duration) {
        self.shared.shutting_down.store(true, Ordering::Release);
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if self.shared.receiver.is_empty() && self.shared.busy.load(Ordering::Relaxed) == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        while let Ok(job) = self.shared.receiver.try_recv() {
            job(false);
        }
    }
}
