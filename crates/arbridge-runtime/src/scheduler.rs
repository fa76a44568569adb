//! [`PublishScheduler`] – fixed-rate drain of the sensor channels.
//!
//! Every tick the scheduler checks the three channels of a
//! [`SensorAggregator`] in a fixed order (odometry, IMU, fix).  Each dirty
//! channel is copied and cleared in one step, converted into its outbound
//! message, stamped with the emission time and handed to the
//! [`PublishSink`].  Clean channels produce nothing, so a silent sensor
//! never causes a duplicate publish.
//!
//! A failing sink is reported in the tick's [`TickReport`] and logged; the
//! sample is not retried.  A panic inside a tick is caught and logged and the
//! loop carries on with the next tick.  Shutdown is observed between ticks,
//! so a tick that has started always completes.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use arbridge_middleware::{PublishSink, Topic};
use arbridge_perception::{LocationSample, OdometrySample, OrientationSample, Quaternion, Vec3};
use arbridge_types::{
    BridgeError, Header, ImuMsg, NavSatFixMsg, OdometryMsg, OutboundMessage, PoseMsg,
    PoseWithCovarianceMsg, QuaternionMsg, Vector3Msg,
};
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::aggregator::SensorAggregator;
use crate::stream_monitor::StreamHealth;

/// Default publish rate (Hz).
pub const DEFAULT_PUBLISH_RATE_HZ: f64 = 50.0;

/// Frame identifiers written into outbound headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Header frame of odometry messages.
    pub odom_frame: String,
    /// `child_frame_id` of odometry messages.
    pub child_frame: String,
    /// Header frame of IMU and fix messages.
    pub sensor_frame: String,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            odom_frame: "odom".to_string(),
            child_frame: "android".to_string(),
            sensor_frame: "android".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub period: Duration,
    pub frames: FrameConfig,
}

impl SchedulerConfig {
    /// Build a config publishing at `rate_hz`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Config`] for a rate that is not finite and positive.
    pub fn from_rate_hz(rate_hz: f64, frames: FrameConfig) -> Result<Self, BridgeError> {
        if !rate_hz.is_finite() || rate_hz <= 0.0 {
            return Err(BridgeError::Config(format!(
                "publish rate must be finite and positive, got {rate_hz}"
            )));
        }
        let period = Duration::try_from_secs_f64(1.0 / rate_hz)
            .map_err(|e| BridgeError::Config(format!("publish rate {rate_hz}: {e}")))?;
        if period.is_zero() {
            return Err(BridgeError::Config(format!("publish rate {rate_hz} Hz is too high")));
        }
        Ok(Self { period, frames })
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(20),
            frames: FrameConfig::default(),
        }
    }
}

/// Outcome of a single tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    /// Topics handed to the sink successfully, in publish order.
    pub published: Vec<Topic>,
    pub failures: Vec<(Topic, BridgeError)>,
}

impl TickReport {
    /// `true` when no channel was dirty.
    pub fn is_idle(&self) -> bool {
        self.published.is_empty() && self.failures.is_empty()
    }
}

/// Totals accumulated by [`PublishScheduler::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub published: u64,
    pub failures: u64,
    pub panics: u64,
}

impl SchedulerStats {
    fn record(&mut self, report: &TickReport) {
        self.published += report.published.len() as u64;
        self.failures += report.failures.len() as u64;
    }
}

/// Cloneable handle that stops every loop subscribed to it.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PublishScheduler {
    aggregator: Arc<SensorAggregator>,
    sink: Arc<dyn PublishSink>,
    config: SchedulerConfig,
}

impl PublishScheduler {
    pub fn new(
        aggregator: Arc<SensorAggregator>,
        sink: Arc<dyn PublishSink>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            aggregator,
            sink,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run one publish pass.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let frames = &self.config.frames;

        let odometry = self.aggregator.odometry().take_dirty();
        self.emit(Topic::Odometry, odometry.map(|s| odometry_message(&s, frames)), &mut report)
            .await;
        let imu = self.aggregator.orientation().take_dirty();
        self.emit(Topic::Imu, imu.map(|s| imu_message(&s, frames)), &mut report)
            .await;
        let fix = self.aggregator.location().take_dirty();
        self.emit(Topic::NavSatFix, fix.map(|s| nav_sat_fix_message(&s, frames)), &mut report)
            .await;

        report
    }

    async fn emit(&self, topic: Topic, message: Option<OutboundMessage>, report: &mut TickReport) {
        let Some(message) = message else {
            trace!(topic = ?topic, "channel clean");
            return;
        };
        match self.sink.publish(topic, message).await {
            Ok(()) => report.published.push(topic),
            Err(e) => {
                warn!(topic = ?topic, error = %e, "publish failed; sample dropped");
                report.failures.push((topic, e));
            }
        }
    }

    /// Tick at the configured period until `shutdown` turns `true` or its
    /// sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        let mut interval = tokio::time::interval(self.config.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_ms = self.config.period.as_millis() as u64, "publish loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    stats.ticks += 1;
                    match AssertUnwindSafe(self.tick()).catch_unwind().await {
                        Ok(report) => {
                            if !report.is_idle() {
                                debug!(published = ?report.published, failed = report.failures.len(), "tick");
                            }
                            stats.record(&report);
                        }
                        Err(panic) => {
                            stats.panics += 1;
                            error!(reason = panic_message(panic.as_ref()), "publish tick panicked");
                        }
                    }
                    self.log_stream_transitions();
                }
            }
        }

        info!(
            ticks = stats.ticks,
            published = stats.published,
            failures = stats.failures,
            panics = stats.panics,
            "publish loop stopped"
        );
        stats
    }

    fn log_stream_transitions(&self) {
        for (stream, health) in self.aggregator.poll_stream_transitions() {
            match health {
                StreamHealth::Stale => warn!(%stream, "sensor stream went quiet"),
                StreamHealth::Live => info!(%stream, "sensor stream recovered"),
                StreamHealth::Waiting => {}
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Message builders
// ────────────────────────────────────────────────────────────────────────────

fn vector_msg(v: Vec3) -> Vector3Msg {
    Vector3Msg {
        x: v.x as f64,
        y: v.y as f64,
        z: v.z as f64,
    }
}

fn quaternion_msg(q: Quaternion) -> QuaternionMsg {
    QuaternionMsg {
        x: q.x as f64,
        y: q.y as f64,
        z: q.z as f64,
        w: q.w as f64,
    }
}

pub fn odometry_message(sample: &OdometrySample, frames: &FrameConfig) -> OutboundMessage {
    OutboundMessage::Odometry(OdometryMsg {
        header: Header::now(frames.odom_frame.clone()),
        child_frame_id: frames.child_frame.clone(),
        pose: PoseWithCovarianceMsg {
            pose: PoseMsg {
                position: vector_msg(sample.translation),
                orientation: quaternion_msg(sample.rotation),
            },
            covariance: Vec::new(),
        },
    })
}

pub fn imu_message(sample: &OrientationSample, frames: &FrameConfig) -> OutboundMessage {
    OutboundMessage::Imu(ImuMsg {
        header: Header::now(frames.sensor_frame.clone()),
        orientation: quaternion_msg(sample.orientation),
        angular_velocity: vector_msg(sample.angular_velocity),
        linear_acceleration: vector_msg(sample.linear_acceleration),
    })
}

/// Horizontal accuracy is spread on the covariance diagonal as a variance;
/// an unknown accuracy yields an all-zero matrix of unknown type.
pub fn nav_sat_fix_message(sample: &LocationSample, frames: &FrameConfig) -> OutboundMessage {
    let (position_covariance, position_covariance_type) = if sample.accuracy > 0.0 {
        let var = (sample.accuracy as f64).powi(2);
        (
            [var, 0.0, 0.0, 0.0, var, 0.0, 0.0, 0.0, var],
            NavSatFixMsg::COVARIANCE_TYPE_APPROXIMATED,
        )
    } else {
        ([0.0; 9], NavSatFixMsg::COVARIANCE_TYPE_UNKNOWN)
    };
    OutboundMessage::NavSatFix(NavSatFixMsg {
        header: Header::now(frames.sensor_frame.clone()),
        latitude: sample.latitude,
        longitude: sample.longitude,
        altitude: sample.altitude,
        position_covariance,
        position_covariance_type,
    })
}
