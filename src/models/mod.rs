//! Data model shared by the configuration service and the runtime pipeline.
//!
//! Job documents persist `WriterGroupJobModel`s; writer groups are rebuilt
//! from snapshots of those documents and exchange
//! `SubscriptionNotificationModel`s and `NetworkMessageModel`s at runtime.
mod connection;
mod content_mask;
mod diagnostics;
mod job;
mod notification;
mod published_item;
mod variant;
mod writer_group;

pub use connection::*;
pub use content_mask::*;
pub use diagnostics::*;
pub use job::*;
pub use notification::*;
pub use published_item::*;
pub use variant::*;
pub use writer_group::*;
