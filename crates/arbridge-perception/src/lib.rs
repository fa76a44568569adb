//! `arbridge-perception` – fusion math for the sensor bridge.
//!
//! Everything here is synchronous and lock-free; sharing across threads is
//! the runtime's concern.
//!
//! # Modules
//!
//! - [`transform`] – [`Vec3`][transform::Vec3], [`Quaternion`][transform::Quaternion]
//!   and [`Pose`][transform::Pose]: rotation/translation algebra
//!   (rotation-vector conversion, composition, inversion, vector rotation).
//! - [`calibration`] – [`Calibration`][calibration::Calibration]: the
//!   one-shot device-to-reference transform taken from the first tracked
//!   pose.
//! - [`fusion`] – the three sample records plus the altitude and
//!   orientation fusion rules.
//! - [`geomag`] – [`DipoleDeclination`][geomag::DipoleDeclination]: magnetic
//!   declination from a centred-dipole field model.

pub mod calibration;
pub mod fusion;
pub mod geomag;
pub mod transform;

pub use calibration::{CalibratedPose, Calibration, CalibrationState};
pub use fusion::{
    AltitudeSource, DeclinationCorrection, LocationSample, OdometrySample, OrientationFusion,
    OrientationSample,
};
pub use transform::{Pose, Quaternion, Vec3};
