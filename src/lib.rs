//! Industrial telemetry publishing pipeline.
//!
//! Field device notifications flow trigger → source → batching engine →
//! encoder → sink. A `PublisherConfigService` mutates the persisted writer
//! group jobs under optimistic concurrency, and `WriterGroupHost` rebuilds the
//! affected pipelines from the updated job snapshots.

mod config;
mod constants;
mod encoder;
mod engine;
mod errors;
mod group;
mod metrics;
mod models;
mod publisher;
mod sink;
mod source;
mod storage;
mod trigger;
mod utils;

pub use config::*;
pub use encoder::*;
pub use engine::*;
pub use errors::*;
pub use group::*;
pub use metrics::*;
pub use models::*;
pub use publisher::*;
pub use sink::*;
pub use source::*;
pub use storage::*;
pub use trigger::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
