//! Job document persistence.
//!
//! Documents are written with compare-and-swap on a store-owned version;
//! callers never hold a lock across a fetch-mutate-store cycle and instead
//! rerun the cycle when the version moved underneath them.
mod job_store;
mod job_update;
mod memory_store;

pub use job_store::*;
pub use job_update::*;
pub use memory_store::*;

#[cfg(test)]
mod memory_store_test;
