//! Publisher configuration service.
//!
//! Published nodes live in one writer group job document per endpoint. Every
//! mutating call resolves the endpoint, then reconciles the document through
//! an optimistic fetch-mutate-store cycle (`update_job_with_retry`).
mod config_service;
mod endpoint_registry;
mod job_reconcile;

pub use config_service::*;
pub use endpoint_registry::*;
pub use job_reconcile::*;
