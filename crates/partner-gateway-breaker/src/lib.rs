//! Per-tenant circuit breakers gating calls before pool submission.

mod circuit;
pub mod registry;
pub mod state;

pub use registry::BreakerRegistry;
pub use state::{BreakerPhase, BreakerState, WindowTotals};
