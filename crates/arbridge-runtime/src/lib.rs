//! # arbridge-runtime
//!
//! Ties sensor ingestion to the publish sink.
//!
//! - [`aggregator`] – [`SensorAggregator`] validates and fuses incoming
//!   readings into three dirty-tracked channels.
//! - [`scheduler`] – [`PublishScheduler`] drains dirty channels at a fixed
//!   rate and hands messages to a [`PublishSink`](arbridge_middleware::PublishSink).
//! - [`channel`] – the [`PublishChannel`] primitive both sides share.
//! - [`stream_monitor`] – per-stream liveness logged from the publish loop.
//! - [`telemetry`] – tracing subscriber and optional OTLP export.

pub mod aggregator;
pub mod channel;
pub mod scheduler;
pub mod stream_monitor;
pub mod telemetry;

pub use aggregator::{FusionConfig, SensorAggregator};
pub use channel::PublishChannel;
pub use scheduler::{
    FrameConfig, PublishScheduler, SchedulerConfig, SchedulerStats, ShutdownHandle, TickReport,
};
pub use stream_monitor::{Stream, StreamHealth, StreamMonitor};
