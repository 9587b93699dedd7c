//! Per-tenant ingest loop lifecycle and reconciliation against the config
//! store.

pub mod consumer;
pub mod manager;
pub mod notification;
pub mod route;

pub use consumer::{ChannelConsumer, Consumer, ConsumerHandle, MessageHandler, PreDispatchConsumer};
pub use manager::{RouteManager, DEFAULT_RELOAD_INTERVAL};
pub use notification::{ChangeNotification, ChangeType};
pub use route::ActiveRoute;
