//! Per-tenant bounded worker pools with caller-runs backpressure.

pub mod pool;
pub mod registry;
pub mod state;

pub use pool::TenantPool;
pub use registry::PoolRegistry;
pub use state::PoolState;
