//! Batching & encoding engine: dual size/time batching in front of the
//! encoder, with diagnostics over the whole pipeline of a writer group.
mod batch_buffer;
mod batch_timer;
mod data_flow_engine;
mod diagnostics;
mod settings;

pub use batch_buffer::*;
pub use batch_timer::*;
pub use data_flow_engine::*;
pub use diagnostics::*;
pub use settings::*;
