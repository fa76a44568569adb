//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! Traffic is partitioned into one [`Topic`] lane per outbound message kind.
//! Every event is additionally mirrored onto a global channel for consumers
//! that want the whole stream (e.g. the WebSocket relay).
//!
//! | Topic | Default name | Payload |
//! |---|---|---|
//! | [`Topic::Odometry`] | `android/odom` | calibrated pose |
//! | [`Topic::Imu`] | `android/imu` | acceleration, angular velocity, orientation |
//! | [`Topic::NavSatFix`] | `android/fix` | latitude, longitude, fused altitude |

use arbridge_types::{BridgeError, Event};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Default topic namespace.
pub const DEFAULT_TOPIC_PREFIX: &str = "android";

/// Enumeration of all routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Odometry,
    Imu,
    NavSatFix,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Odometry, Topic::Imu, Topic::NavSatFix];

    /// Last path segment of the topic name.
    pub fn suffix(self) -> &'static str {
        match self {
            Topic::Odometry => "odom",
            Topic::Imu => "imu",
            Topic::NavSatFix => "fix",
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    prefix: String,
    // Mirror of every topic
    global: broadcast::Sender<Event>,
    // Per-topic channels
    odometry: broadcast::Sender<Event>,
    imu: broadcast::Sender<Event>,
    nav_sat_fix: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every channel independently.
    pub fn new(capacity: usize) -> Self {
        let (global, _) = broadcast::channel(capacity);
        let (odometry, _) = broadcast::channel(capacity);
        let (imu, _) = broadcast::channel(capacity);
        let (nav_sat_fix, _) = broadcast::channel(capacity);
        Self {
            prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            global,
            odometry,
            imu,
            nav_sat_fix,
        }
    }

    /// Override the topic namespace (builder-style).  Leading and trailing
    /// slashes are stripped.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    /// Fully-qualified name of `topic`, e.g. `"android/odom"`.
    pub fn topic_name(&self, topic: Topic) -> String {
        if self.prefix.is_empty() {
            topic.suffix().to_string()
        } else {
            format!("{}/{}", self.prefix, topic.suffix())
        }
    }

    /// Publish `event` to the given [`Topic`] channel and the global mirror.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// Returns `Ok(0)` when nobody is listening (this is a normal condition,
    /// not an error).
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, BridgeError> {
        // A broadcast send only fails when there are no receivers.
        let on_topic = self.topic_sender(topic).send(event.clone()).unwrap_or(0);
        let on_global = self.global.send(event).unwrap_or(0);
        Ok(on_topic + on_global)
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Subscribe to every event regardless of topic.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.global.subscribe()
    }

    /// Number of subscribers currently attached to `topic` (global mirror
    /// excluded).
    pub fn receiver_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Odometry => &self.odometry,
            Topic::Imu => &self.imu,
            Topic::NavSatFix => &self.nav_sat_fix,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Wait for the next event, skipping over lag notifications.
    ///
    /// Returns `None` when the bus is closed.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "topic receiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive of an already-buffered event.
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}
