//! The per-tenant message pipeline: validate → decrypt
//! headers → ensure token → forward (with retry) → record outcome.

pub mod outcome;
pub mod pipeline;
pub mod retry;
pub mod stage;
pub mod stages;

pub use outcome::{ExceptionRecord, LoggingOutcomeSink, Outcome, OutcomeResult, OutcomeSink};
pub use pipeline::{IngestRecord, TenantProcessor};
pub use stage::{Stage, StageContext};
pub use stages::{DecryptHeadersStage, EnsureTokenStage, ForwardStage, ValidateStage};
