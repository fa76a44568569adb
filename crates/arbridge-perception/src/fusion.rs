//! Fusion rules.
//!
//! Turns raw platform readings into the three published sample records:
//!
//! - **Orientation** – accelerometer, gyroscope and rotation-vector readings
//!   each overwrite their own field of [`OrientationSample`].  Rotation
//!   vectors pass through the declination hook ([`DeclinationCorrection`]),
//!   which is disabled unless configured otherwise.
//! - **Location** – barometric altitude and satellite fixes both write
//!   [`LocationSample`].  A fix reporting `altitude == 0.0` is treated as
//!   "no satellite altitude": latitude/longitude are taken and the
//!   barometric altitude is kept.  A genuine fix at exactly sea level is
//!   therefore indistinguishable from a missing altitude.
//! - **Odometry** – see [`crate::calibration`].

use arbridge_types::{BridgeError, LocationFix};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::geomag::DipoleDeclination;
use crate::transform::{Pose, Quaternion, Vec3};

/// Standard-atmosphere exponent used by the hypsometric approximation.
const BAROMETRIC_EXPONENT: f32 = 1.0 / 5.255;

/// Altitude scale (m) of the hypsometric approximation.
const BAROMETRIC_SCALE_M: f32 = 44330.0;

// ────────────────────────────────────────────────────────────────────────────
// Samples
// ────────────────────────────────────────────────────────────────────────────

/// Latest IMU readings, published together.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientationSample {
    /// m/s², gravity removed.
    pub linear_acceleration: Vec3,
    /// rad/s.
    pub angular_velocity: Vec3,
    pub orientation: Quaternion,
}

/// Latest fused location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Horizontal accuracy (m) of the latest satellite fix; `0.0` = unknown.
    pub accuracy: f32,
}

impl LocationSample {
    /// A seed location used before any real fix arrives.
    pub fn fallback(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            accuracy: 0.0,
        }
    }
}

/// Where the stored altitude came from after a fix was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltitudeSource {
    Satellite,
    /// The fix carried no altitude; the previous (barometric or seed)
    /// altitude was kept.
    Retained,
}

/// Latest odometry in the calibrated reference frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OdometrySample {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl From<Pose> for OdometrySample {
    fn from(p: Pose) -> Self {
        Self {
            translation: p.translation,
            rotation: p.rotation,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Altitude fusion
// ────────────────────────────────────────────────────────────────────────────

/// Altitude (m) for a static `pressure_hpa` given the sea-level reference.
pub fn barometric_altitude(pressure_hpa: f32, sea_level_hpa: f32) -> f32 {
    BAROMETRIC_SCALE_M * (1.0 - (pressure_hpa / sea_level_hpa).powf(BAROMETRIC_EXPONENT))
}

/// Reject non-physical pressure readings.
pub fn validate_pressure(pressure_hpa: f32) -> Result<(), BridgeError> {
    if !pressure_hpa.is_finite() || pressure_hpa <= 0.0 {
        return Err(BridgeError::InvalidMeasurement(format!(
            "pressure must be finite and positive, got {pressure_hpa}"
        )));
    }
    Ok(())
}

/// Reject fixes with non-finite or out-of-range coordinates.
pub fn validate_fix(fix: &LocationFix) -> Result<(), BridgeError> {
    let finite = fix.latitude.is_finite()
        && fix.longitude.is_finite()
        && fix.altitude.is_finite()
        && fix.accuracy.is_finite();
    if !finite {
        return Err(BridgeError::InvalidMeasurement(
            "location fix contains non-finite values".to_string(),
        ));
    }
    if fix.latitude.abs() > 90.0 || fix.longitude.abs() > 180.0 {
        return Err(BridgeError::InvalidMeasurement(format!(
            "location fix out of range: lat={}, lon={}",
            fix.latitude, fix.longitude
        )));
    }
    Ok(())
}

impl LocationSample {
    pub fn apply_barometric_altitude(&mut self, altitude: f32) {
        self.altitude = altitude as f64;
    }

    /// Merge a satellite fix into the stored location.
    pub fn apply_fix(&mut self, fix: &LocationFix) -> AltitudeSource {
        self.latitude = fix.latitude;
        self.longitude = fix.longitude;
        self.accuracy = fix.accuracy;
        if fix.altitude == 0.0 {
            AltitudeSource::Retained
        } else {
            self.altitude = fix.altitude;
            AltitudeSource::Satellite
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Orientation fusion
// ────────────────────────────────────────────────────────────────────────────

/// Correction applied to rotation-vector orientations for magnetic
/// declination.
///
/// `Disabled` is the default and leaves orientations untouched.  The
/// `AboutVertical` rotation has not been verified against a reference
/// heading; enable it only after checking it on hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclinationCorrection {
    #[default]
    Disabled,
    /// Compose with a rotation about +Z by the computed declination.
    AboutVertical,
}

impl DeclinationCorrection {
    pub fn apply(self, q: Quaternion, declination_rad: f32) -> Quaternion {
        match self {
            DeclinationCorrection::Disabled => q,
            DeclinationCorrection::AboutVertical => q
                .mul(Quaternion::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), declination_rad))
                .normalize(),
        }
    }
}

/// Rotation-vector → orientation conversion with the declination hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrientationFusion {
    correction: DeclinationCorrection,
    model: DipoleDeclination,
}

impl OrientationFusion {
    pub fn new(correction: DeclinationCorrection) -> Self {
        Self {
            correction,
            model: DipoleDeclination::new(),
        }
    }

    pub fn correction(&self) -> DeclinationCorrection {
        self.correction
    }

    /// Convert a raw rotation vector observed at `location` and time `at`.
    pub fn orientation(
        &self,
        values: &[f32],
        location: &LocationSample,
        at: DateTime<Utc>,
    ) -> Result<Quaternion, BridgeError> {
        if values.iter().any(|v| !v.is_finite()) {
            return Err(BridgeError::InvalidMeasurement(
                "rotation vector contains non-finite values".to_string(),
            ));
        }
        let q = Quaternion::from_rotation_vector(values)?;
        let declination = self.model.declination_rad(
            location.latitude,
            location.longitude,
            location.altitude,
            at,
        ) as f32;
        trace!(declination_deg = declination.to_degrees(), "local magnetic declination");
        Ok(self.correction.apply(q, declination))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(lat: f64, lon: f64, alt: f64) -> LocationFix {
        LocationFix {
            latitude: lat,
            longitude: lon,
            altitude: alt,
            accuracy: 4.0,
        }
    }

    #[test]
    fn barometric_altitude_zero_at_reference() {
        assert!(barometric_altitude(1020.0, 1020.0).abs() < 1e-3);
    }

    #[test]
    fn barometric_altitude_rises_as_pressure_drops() {
        let low = barometric_altitude(1010.0, 1020.0);
        let high = barometric_altitude(900.0, 1020.0);
        assert!(low > 0.0);
        assert!(high > low);
        // ~1 hPa ≈ 8 m near sea level.
        assert!((low - 82.0).abs() < 5.0, "low={low}");
    }

    #[test]
    fn pressure_validation() {
        assert!(validate_pressure(1013.25).is_ok());
        assert!(validate_pressure(0.0).is_err());
        assert!(validate_pressure(-5.0).is_err());
        assert!(validate_pressure(f32::NAN).is_err());
    }

    #[test]
    fn fix_validation() {
        assert!(validate_fix(&fix(10.0, 20.0, 0.0)).is_ok());
        assert!(validate_fix(&fix(91.0, 20.0, 0.0)).is_err());
        assert!(validate_fix(&fix(10.0, -181.0, 0.0)).is_err());
        assert!(validate_fix(&fix(f64::NAN, 0.0, 0.0)).is_err());
    }

    #[test]
    fn fix_without_altitude_retains_barometric_value() {
        let mut loc = LocationSample::fallback(42.0, -71.0, 88.0);
        loc.apply_barometric_altitude(120.5);
        let src = loc.apply_fix(&fix(10.0, 20.0, 0.0));

        assert_eq!(src, AltitudeSource::Retained);
        assert_eq!(loc.latitude, 10.0);
        assert_eq!(loc.longitude, 20.0);
        assert!((loc.altitude - 120.5).abs() < 1e-6);
        assert_eq!(loc.accuracy, 4.0);
    }

    #[test]
    fn fix_with_altitude_replaces_all_fields() {
        let mut loc = LocationSample::fallback(42.0, -71.0, 88.0);
        loc.apply_barometric_altitude(120.5);
        let src = loc.apply_fix(&fix(10.0, 20.0, 33.0));

        assert_eq!(src, AltitudeSource::Satellite);
        assert_eq!((loc.latitude, loc.longitude, loc.altitude), (10.0, 20.0, 33.0));
    }

    #[test]
    fn disabled_correction_is_inert() {
        let q = Quaternion::from_axis_angle(Vec3::new(1.0, 0.0, 0.0), 0.4);
        assert_eq!(DeclinationCorrection::Disabled.apply(q, 0.3), q);
    }

    #[test]
    fn about_vertical_correction_adds_yaw() {
        let q = DeclinationCorrection::AboutVertical.apply(Quaternion::identity(), 0.5);
        let expected = Quaternion::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), 0.5);
        assert!((q.w - expected.w).abs() < 1e-5);
        assert!((q.z - expected.z).abs() < 1e-5);
    }

    #[test]
    fn orientation_fusion_defaults_to_raw_quaternion() {
        let fusion = OrientationFusion::default();
        assert_eq!(fusion.correction(), DeclinationCorrection::Disabled);
        let loc = LocationSample::fallback(42.2932, -71.2637, 88.0);
        let q = fusion
            .orientation(&[0.1, 0.2, 0.3, 0.927_361_8], &loc, Utc::now())
            .unwrap();
        assert_eq!(q, Quaternion::new(0.927_361_8, 0.1, 0.2, 0.3));
    }

    #[test]
    fn orientation_fusion_rejects_bad_input() {
        let fusion = OrientationFusion::default();
        let loc = LocationSample::fallback(0.0, 0.0, 0.0);
        assert!(fusion.orientation(&[0.0, 0.0], &loc, Utc::now()).is_err());
        assert!(fusion.orientation(&[f32::NAN, 0.0, 0.0], &loc, Utc::now()).is_err());
    }
}
