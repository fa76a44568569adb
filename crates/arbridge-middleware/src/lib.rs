//! `arbridge-middleware` – outbound plumbing.
//!
//! Carries finished messages away from the publish scheduler without caring
//! what they mean.
//!
//! # Modules
//!
//! - [`sink`] – [`PublishSink`]: the `publish(topic, message)` seam the
//!   scheduler talks to.
//! - [`bus`] – [`EventBus`]: headless, topic-partitioned publish/subscribe
//!   bus built on Tokio broadcast channels; the default sink.
//! - [`rosbridge_relay`] – [`RosbridgeRelay`]: WebSocket server that replays
//!   bus traffic to rosbridge clients as JSON `publish` frames.

pub mod bus;
pub mod rosbridge_relay;
pub mod sink;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use rosbridge_relay::RosbridgeRelay;
pub use sink::PublishSink;
