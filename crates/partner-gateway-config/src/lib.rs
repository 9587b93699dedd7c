//! Tenant configuration model and the Tenant Config Store interface.

pub mod model;
pub mod store;

pub use model::{
    AuthBody, AuthContentType, AuthParams, AuthReturnType, BreakerParams, ForwardParams,
    PoolParams, RetryParams, TenantConfig,
};
pub use store::{ConfigStore, HttpConfigStore, InMemoryConfigStore, SharedConfigStore};
