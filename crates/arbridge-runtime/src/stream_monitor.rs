//! [`StreamMonitor`] – input stream liveness.
//!
//! Every ingestion entry point records a heartbeat for its [`Stream`].  The
//! publish loop polls [`StreamMonitor::poll_transitions`] once per tick and
//! logs each change exactly once: a warning when a stream that was delivering
//! goes quiet for longer than the timeout, an info line when it comes back.
//!
//! A stream that has never delivered is [`StreamHealth::Waiting`] and never
//! reported; plenty of devices have no barometer.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Default silence after which a stream is considered stale.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5);

/// Monitored input streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Inertial,
    Pressure,
    Location,
    Pose,
}

impl Stream {
    pub const ALL: [Stream; 4] = [
        Stream::Inertial,
        Stream::Pressure,
        Stream::Location,
        Stream::Pose,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stream::Inertial => "inertial",
            Stream::Pressure => "pressure",
            Stream::Location => "location",
            Stream::Pose => "pose",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Liveness of a single stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamHealth {
    /// No sample received yet.
    Waiting,
    Live,
    Stale,
}

#[derive(Default)]
struct StreamEntry {
    last_sample: Option<Instant>,
    stale_reported: bool,
}

/// Heartbeat tracker for the four input streams.
pub struct StreamMonitor {
    stale_after: Duration,
    streams: HashMap<Stream, StreamEntry>,
}

impl StreamMonitor {
    pub fn new(stale_after: Duration) -> Self {
        let streams = Stream::ALL
            .iter()
            .map(|s| (*s, StreamEntry::default()))
            .collect();
        Self {
            stale_after,
            streams,
        }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Record that `stream` just delivered a sample.
    pub fn heartbeat(&mut self, stream: Stream) {
        self.heartbeat_at(stream, Instant::now());
    }

    fn heartbeat_at(&mut self, stream: Stream, at: Instant) {
        self.streams.entry(stream).or_default().last_sample = Some(at);
    }

    pub fn health(&self, stream: Stream) -> StreamHealth {
        self.health_at(stream, Instant::now())
    }

    fn health_at(&self, stream: Stream, now: Instant) -> StreamHealth {
        match self.streams.get(&stream).and_then(|e| e.last_sample) {
            None => StreamHealth::Waiting,
            Some(t) if now.saturating_duration_since(t) > self.stale_after => StreamHealth::Stale,
            Some(_) => StreamHealth::Live,
        }
    }

    /// Streams whose health changed since the previous poll, paired with the
    /// new health (`Stale` or `Live`).
    pub fn poll_transitions(&mut self) -> Vec<(Stream, StreamHealth)> {
        self.poll_transitions_at(Instant::now())
    }

    fn poll_transitions_at(&mut self, now: Instant) -> Vec<(Stream, StreamHealth)> {
        let mut changed = Vec::new();
        for stream in Stream::ALL {
            let health = self.health_at(stream, now);
            let entry = self.streams.entry(stream).or_default();
            match health {
                StreamHealth::Stale if !entry.stale_reported => {
                    entry.stale_reported = true;
                    changed.push((stream, StreamHealth::Stale));
                }
                StreamHealth::Live if entry.stale_reported => {
                    entry.stale_reported = false;
                    changed.push((stream, StreamHealth::Live));
                }
                _ => {}
            }
        }
        changed
    }

    /// Forget every heartbeat.
    pub fn clear(&mut self) {
        for entry in self.streams.values_mut() {
            *entry = StreamEntry::default();
        }
    }
}

impl Default for StreamMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_streams_are_waiting_and_silent() {
        let mut mon = StreamMonitor::new(Duration::from_millis(10));
        for s in Stream::ALL {
            assert_eq!(mon.health(s), StreamHealth::Waiting);
        }
        let later = Instant::now() + Duration::from_secs(60);
        assert!(mon.poll_transitions_at(later).is_empty());
    }

    #[test]
    fn fresh_heartbeat_is_live() {
        let mut mon = StreamMonitor::new(Duration::from_secs(5));
        mon.heartbeat(Stream::Pose);
        assert_eq!(mon.health(Stream::Pose), StreamHealth::Live);
        assert_eq!(mon.health(Stream::Inertial), StreamHealth::Waiting);
    }

    #[test]
    fn stale_is_reported_once_then_recovery_once() {
        let mut mon = StreamMonitor::new(Duration::from_secs(1));
        let t0 = Instant::now();
        mon.heartbeat_at(Stream::Location, t0);

        assert!(mon.poll_transitions_at(t0 + Duration::from_millis(500)).is_empty());

        let stale = mon.poll_transitions_at(t0 + Duration::from_secs(2));
        assert_eq!(stale, vec![(Stream::Location, StreamHealth::Stale)]);
        assert!(mon.poll_transitions_at(t0 + Duration::from_secs(3)).is_empty());

        let t1 = t0 + Duration::from_secs(4);
        mon.heartbeat_at(Stream::Location, t1);
        let live = mon.poll_transitions_at(t1);
        assert_eq!(live, vec![(Stream::Location, StreamHealth::Live)]);
        assert!(mon.poll_transitions_at(t1).is_empty());
    }

    #[test]
    fn streams_are_tracked_independently() {
        let mut mon = StreamMonitor::new(Duration::from_secs(1));
        let t0 = Instant::now();
        mon.heartbeat_at(Stream::Inertial, t0);
        mon.heartbeat_at(Stream::Pose, t0 + Duration::from_secs(2));

        let changed = mon.poll_transitions_at(t0 + Duration::from_millis(2500));
        assert_eq!(changed, vec![(Stream::Inertial, StreamHealth::Stale)]);
    }

    #[test]
    fn clear_returns_to_waiting() {
        let mut mon = StreamMonitor::default();
        assert_eq!(mon.stale_after(), DEFAULT_STALE_AFTER);
        mon.heartbeat(Stream::Pressure);
        mon.clear();
        assert_eq!(mon.health(Stream::Pressure), StreamHealth::Waiting);
    }

    #[test]
    fn stream_names() {
        assert_eq!(Stream::Inertial.to_string(), "inertial");
        assert_eq!(Stream::Pose.name(), "pose");
    }
}
