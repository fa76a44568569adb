//! [`SensorAggregator`] – ingestion side of the bridge.
//!
//! Platform callbacks (inertial sensors, barometer, satellite fixes and the
//! pose tracker) call into the aggregator from whatever thread they run on.
//! Each reading is validated, fused into one of three [`PublishChannel`]s and
//! the channel is marked dirty.  Nothing is published here; the
//! [`PublishScheduler`](crate::scheduler::PublishScheduler) drains the
//! channels on its own clock.
//!
//! | Channel | Written by | Published as |
//! |---|---|---|
//! | orientation | accelerometer, gyroscope, rotation vector | `Imu` |
//! | location | barometer, satellite fix | `NavSatFix` |
//! | odometry | pose tracker (after calibration) | `Odometry` |
//!
//! A rejected reading leaves its channel untouched and does not mark it
//! dirty.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arbridge_perception::fusion::{barometric_altitude, validate_fix, validate_pressure};
use arbridge_perception::{
    AltitudeSource, Calibration, CalibrationState, DeclinationCorrection, LocationSample,
    OdometrySample, OrientationFusion, OrientationSample, Pose, Vec3,
};
use arbridge_types::{BridgeError, InertialKind, LocationFix, TrackingState};
use chrono::Utc;
use tracing::{debug, info, trace, warn};

use crate::channel::PublishChannel;
use crate::stream_monitor::{DEFAULT_STALE_AFTER, Stream, StreamHealth, StreamMonitor};

/// Standard sea-level pressure reference (hPa).
pub const DEFAULT_SEA_LEVEL_PRESSURE_HPA: f32 = 1020.0;

/// Location published before any fix or barometer reading arrives.
pub const DEFAULT_LATITUDE: f64 = 42.2932;
pub const DEFAULT_LONGITUDE: f64 = -71.2637;
pub const DEFAULT_ALTITUDE: f64 = 88.0;

/// Fusion parameters fixed for the lifetime of an aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionConfig {
    pub sea_level_pressure_hpa: f32,
    pub default_location: LocationSample,
    pub declination_correction: DeclinationCorrection,
    pub stale_after: Duration,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            sea_level_pressure_hpa: DEFAULT_SEA_LEVEL_PRESSURE_HPA,
            default_location: LocationSample::fallback(
                DEFAULT_LATITUDE,
                DEFAULT_LONGITUDE,
                DEFAULT_ALTITUDE,
            ),
            declination_correction: DeclinationCorrection::Disabled,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

impl FusionConfig {
    /// Reject parameters that would make every fused value meaningless.
    pub fn validate(&self) -> Result<(), BridgeError> {
        validate_pressure(self.sea_level_pressure_hpa)
            .map_err(|e| BridgeError::Config(format!("sea level pressure: {e}")))?;
        validate_fix(&LocationFix {
            latitude: self.default_location.latitude,
            longitude: self.default_location.longitude,
            altitude: self.default_location.altitude,
            accuracy: self.default_location.accuracy,
        })
        .map_err(|e| BridgeError::Config(format!("default location: {e}")))?;
        if self.stale_after.is_zero() {
            return Err(BridgeError::Config(
                "stale stream timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared state between the sensor callbacks and the publish scheduler.
///
/// All methods take `&self`; wrap the aggregator in an `Arc` and hand clones
/// to every producer.
pub struct SensorAggregator {
    config: FusionConfig,
    fusion: OrientationFusion,
    orientation: PublishChannel<OrientationSample>,
    location: PublishChannel<LocationSample>,
    odometry: PublishChannel<OdometrySample>,
    calibration: Mutex<Calibration>,
    monitor: Mutex<StreamMonitor>,
}

impl SensorAggregator {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            fusion: OrientationFusion::new(config.declination_correction),
            orientation: PublishChannel::default(),
            location: PublishChannel::new(config.default_location),
            odometry: PublishChannel::default(),
            calibration: Mutex::new(Calibration::new()),
            monitor: Mutex::new(StreamMonitor::new(config.stale_after)),
            config,
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    // ── Ingestion ───────────────────────────────────────────────────────────

    /// Route an inertial reading to its handler.
    ///
    /// Linear acceleration and angular velocity must carry exactly three
    /// values; rotation vectors three to five.
    pub fn on_inertial_sample(&self, kind: InertialKind, values: &[f32]) -> Result<(), BridgeError> {
        self.heartbeat(Stream::Inertial);
        let result = match kind {
            InertialKind::LinearAcceleration => self.on_linear_acceleration(values),
            InertialKind::Gyroscope => self.on_angular_velocity(values),
            InertialKind::RotationVector => self.on_rotation_vector(values),
        };
        if let Err(e) = &result {
            warn!(kind = ?kind, error = %e, "inertial sample rejected");
        }
        result
    }

    fn on_linear_acceleration(&self, values: &[f32]) -> Result<(), BridgeError> {
        let v = exact_vec3("linear_acceleration", values)?;
        self.orientation.update(|s| s.linear_acceleration = v);
        Ok(())
    }

    fn on_angular_velocity(&self, values: &[f32]) -> Result<(), BridgeError> {
        let v = exact_vec3("gyroscope", values)?;
        self.orientation.update(|s| s.angular_velocity = v);
        Ok(())
    }

    fn on_rotation_vector(&self, values: &[f32]) -> Result<(), BridgeError> {
        let location = self.location.snapshot();
        let q = self.fusion.orientation(values, &location, Utc::now())?;
        self.orientation.update(|s| s.orientation = q);
        Ok(())
    }

    /// Fuse a barometer reading into the location altitude.
    ///
    /// Returns the derived altitude (m).
    pub fn on_pressure_sample(&self, pressure_hpa: f32) -> Result<f32, BridgeError> {
        self.heartbeat(Stream::Pressure);
        if let Err(e) = validate_pressure(pressure_hpa) {
            warn!(error = %e, "pressure sample rejected");
            return Err(e);
        }
        let altitude = barometric_altitude(pressure_hpa, self.config.sea_level_pressure_hpa);
        self.location.update(|s| s.apply_barometric_altitude(altitude));
        trace!(pressure_hpa, altitude, "barometric altitude");
        Ok(altitude)
    }

    /// Fuse a satellite fix into the location.
    ///
    /// A fix without altitude (`altitude == 0.0`) keeps the previous altitude.
    pub fn on_location_fix(&self, fix: LocationFix) -> Result<AltitudeSource, BridgeError> {
        self.heartbeat(Stream::Location);
        if let Err(e) = validate_fix(&fix) {
            warn!(error = %e, "location fix rejected");
            return Err(e);
        }
        let source = self.location.update(|s| s.apply_fix(&fix));
        debug!(
            latitude = fix.latitude,
            longitude = fix.longitude,
            altitude_source = ?source,
            "location fix applied"
        );
        Ok(source)
    }

    /// Feed one tracker frame.
    ///
    /// Only frames reported while [`TrackingState::Tracking`] are used; the
    /// first one anchors the reference frame.  Other states return `Ok(None)`
    /// and leave calibration and the odometry channel alone.
    ///
    /// The rotation is rescaled to unit length before calibration.
    ///
    /// The aggregator does not infer tracker restarts from the state
    /// sequence: a `Stopped` frame followed by `Tracking` keeps the current
    /// anchor.  Callers that see the tracker restart must call
    /// [`reset_calibration`](Self::reset_calibration) (or
    /// [`reset_session`](Self::reset_session)) before feeding the next pose.
    pub fn on_tracked_pose(
        &self,
        raw: Pose,
        state: TrackingState,
    ) -> Result<Option<OdometrySample>, BridgeError> {
        self.heartbeat(Stream::Pose);
        if state != TrackingState::Tracking {
            trace!(?state, "tracker frame skipped");
            return Ok(None);
        }
        if let Err(e) = validate_pose(&raw) {
            warn!(error = %e, "tracked pose rejected");
            return Err(e);
        }
        let raw = Pose::new(raw.translation, raw.rotation.normalize());

        // The calibration lock is held across the channel write so poses
        // reach the channel in the order they were calibrated.
        let mut calibration = self.calibration();
        let calibrated = calibration.apply(raw);
        let sample = OdometrySample::from(calibrated.pose);
        self.odometry.update(|s| *s = sample);
        Ok(Some(sample))
    }

    /// Drop the reference frame; the next tracked pose re-anchors it.
    ///
    /// Returns `true` if a reference frame was held.
    pub fn reset_calibration(&self) -> bool {
        self.calibration().reset()
    }

    /// Return every channel, the calibration and stream tracking to their
    /// start-of-session state.
    pub fn reset_session(&self) {
        let mut calibration = self.calibration();
        calibration.reset();
        self.orientation.reset(OrientationSample::default());
        self.location.reset(self.config.default_location);
        self.odometry.reset(OdometrySample::default());
        self.monitor().clear();
        info!("sensor session reset");
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn orientation(&self) -> &PublishChannel<OrientationSample> {
        &self.orientation
    }

    pub fn location(&self) -> &PublishChannel<LocationSample> {
        &self.location
    }

    pub fn odometry(&self) -> &PublishChannel<OdometrySample> {
        &self.odometry
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.calibration().state()
    }

    pub fn stream_health(&self, stream: Stream) -> StreamHealth {
        self.monitor().health(stream)
    }

    /// Stream health changes since the previous call.
    pub fn poll_stream_transitions(&self) -> Vec<(Stream, StreamHealth)> {
        self.monitor().poll_transitions()
    }

    fn heartbeat(&self, stream: Stream) {
        self.monitor().heartbeat(stream);
    }

    fn calibration(&self) -> MutexGuard<'_, Calibration> {
        self.calibration.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn monitor(&self) -> MutexGuard<'_, StreamMonitor> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SensorAggregator {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

fn exact_vec3(kind: &str, values: &[f32]) -> Result<Vec3, BridgeError> {
    let v = Vec3::from_slice(values).ok_or_else(|| BridgeError::MalformedSample {
        kind: kind.to_string(),
        expected: "3".to_string(),
        actual: values.len(),
    })?;
    if !v.to_array().iter().all(|c| c.is_finite()) {
        return Err(BridgeError::InvalidMeasurement(format!(
            "{kind} sample contains non-finite values"
        )));
    }
    Ok(v)
}

fn validate_pose(pose: &Pose) -> Result<(), BridgeError> {
    let q = pose.rotation;
    let finite = pose.translation.to_array().iter().all(|c| c.is_finite())
        && [q.w, q.x, q.y, q.z].iter().all(|c| c.is_finite());
    if !finite {
        return Err(BridgeError::InvalidMeasurement(
            "tracked pose contains non-finite values".to_string(),
        ));
    }
    if q.norm() < 1e-6 {
        return Err(BridgeError::InvalidMeasurement(
            "tracked pose rotation has zero length".to_string(),
        ));
    }
    Ok(())
}
