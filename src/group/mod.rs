//! Writer group runtime: one source, engine, encoder and sink built from a
//! job snapshot, and the host running many of them side by side.
mod builder;
mod host;
mod writer_group;

pub use builder::*;
pub use host::*;
pub use writer_group::*;

#[cfg(test)]
mod writer_group_test;
