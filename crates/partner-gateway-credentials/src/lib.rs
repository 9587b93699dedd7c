//! Per-tenant bearer credentials with single-flight refresh.

pub mod cache;
pub mod exchange;
pub mod model;

pub use cache::CredentialCache;
pub use model::Credential;
