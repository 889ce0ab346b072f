mod capturing_transport;
mod fake_source;
mod fake_subscription_client;
mod recording_sink;

pub use capturing_transport::*;
pub use fake_source::*;
pub use fake_subscription_client::*;
pub use recording_sink::*;
