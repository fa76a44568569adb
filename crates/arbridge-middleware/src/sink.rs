//! The publish sink seam.
//!
//! The bridge never speaks a wire protocol directly.  The publish scheduler
//! hands each outbound message to a [`PublishSink`]; what happens next
//! (in-process fan-out, a ROS client library, a test recorder) is the sink's
//! business.
//!
//! [`EventBus`] is the stock sink: it wraps each message in an
//! [`Event`] and broadcasts it on the matching [`Topic`] lane.

use async_trait::async_trait;
use arbridge_types::{BridgeError, Event, OutboundMessage};
use tracing::trace;

use crate::bus::{EventBus, Topic};

/// Every outbound transport implements this trait.
///
/// # Contract
///
/// * `publish` must not block indefinitely; the scheduler awaits it inline.
/// * An `Err` is reported by the scheduler and the message is dropped.  The
///   scheduler never retries.
#[async_trait]
pub trait PublishSink: Send + Sync {
    async fn publish(&self, topic: Topic, message: OutboundMessage) -> Result<(), BridgeError>;
}

#[async_trait]
impl PublishSink for EventBus {
    async fn publish(&self, topic: Topic, message: OutboundMessage) -> Result<(), BridgeError> {
        let name = self.topic_name(topic);
        let receivers = self.publish_to(topic, Event::new(name.clone(), message))?;
        trace!(topic = %name, receivers, "event published");
        Ok(())
    }
}
