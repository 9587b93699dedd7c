//! Process entry point: wires the Tenant Config Store, the four registries,
//! the Route Manager, and the Control API into one running gateway.
//!
//! Everything past `main` is composition: no component here holds logic of
//! its own, only the wiring between the crates that do.

use clap::{Parser, ValueEnum};
use partner_gateway_breaker::BreakerRegistry;
use partner_gateway_config::{ConfigStore, HttpConfigStore, InMemoryConfigStore};
use partner_gateway_credentials::CredentialCache;
use partner_gateway_pool::PoolRegistry;
use partner_gateway_processor::{LoggingOutcomeSink, TenantProcessor};
use partner_gateway_routes::{ChannelConsumer, Consumer, PreDispatchConsumer, RouteManager};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Which broker topology the source system is wired into: a durable queue
/// per tenant, or one shared pre-dispatch queue demultiplexed by
/// `CBUSINESSUNIT`. See DESIGN.md for which one a given deployment runs.
#[derive(Copy, Clone, Debug, ValueEnum)]
enum ConsumerTopology {
    PerTenantQueue,
    PreDispatch,
}

/// Multi-tenant message-forwarding middleware: per-tenant execution
/// isolation, failure containment, credential refresh, and dynamic routing.
#[derive(Parser, Debug)]
#[command(name = "partner-gateway", version)]
struct Cli {
    /// Address the Control API listens on.
    #[arg(long, env = "PARTNER_GATEWAY_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Base URL of the tenant config document index. When absent, an
    /// in-memory store is used (suitable for local development and the
    /// demo topology described in DESIGN.md; production deployments set
    /// this).
    #[arg(long, env = "PARTNER_GATEWAY_CONFIG_STORE_URL")]
    config_store_url: Option<String>,

    /// Bound on configuration staleness between event-driven
    /// reconciliations.
    #[arg(long, env = "PARTNER_GATEWAY_RELOAD_INTERVAL_SECS", default_value_t = 300)]
    reload_interval_secs: u64,

    /// Which broker topology to consume from.
    #[arg(
        long,
        env = "PARTNER_GATEWAY_CONSUMER_TOPOLOGY",
        value_enum,
        default_value = "per-tenant-queue"
    )]
    consumer_topology: ConsumerTopology,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config_store: Arc<dyn ConfigStore> = match &cli.config_store_url {
        Some(url) => {
            tracing::info!(url, "using HTTP tenant config store");
            Arc::new(HttpConfigStore::new(url.clone()))
        }
        None => {
            tracing::warn!("no --config-store-url given; running with an empty in-memory config store");
            Arc::new(InMemoryConfigStore::new())
        }
    };

    let pool = Arc::new(PoolRegistry::new());
    let breakers = Arc::new(BreakerRegistry::new());
    let credentials = Arc::new(CredentialCache::new());
    let processor = Arc::new(TenantProcessor::new(
        tokio::runtime::Handle::current(),
        Arc::clone(&credentials),
        Arc::new(LoggingOutcomeSink),
    ));
    let consumer: Arc<dyn Consumer> = match cli.consumer_topology {
        ConsumerTopology::PerTenantQueue => {
            tracing::info!("consuming per-tenant queues");
            Arc::new(ChannelConsumer::new())
        }
        ConsumerTopology::PreDispatch => {
            tracing::info!("consuming the shared pre-dispatch queue, demultiplexed by CBUSINESSUNIT");
            Arc::new(PreDispatchConsumer::new())
        }
    };

    let route_manager = Arc::new(RouteManager::new(
        config_store,
        pool,
        breakers,
        credentials,
        processor,
        consumer,
    ));

    if let Err(e) = route_manager.reconcile_all().await {
        tracing::warn!(error = %e, "initial reconciliation against the config store failed");
    }
    route_manager.spawn_periodic_reload(Duration::from_secs(cli.reload_interval_secs));

    let app = partner_gateway_api::router(partner_gateway_api::AppState::new(Arc::clone(
        &route_manager,
    )));

    let listener = TcpListener::bind(cli.bind)
        .await
        .expect("failed to bind Control API address");
    tracing::info!(addr = %cli.bind, "Control API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Control API server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}
