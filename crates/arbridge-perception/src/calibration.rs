//! One-shot reference-frame calibration.
//!
//! The tracker reports poses in an arbitrary start-up frame.  The first pose
//! observed while tracking is taken as the reference origin: its inverse is
//! cached and every later pose is composed with it, so published odometry
//! starts at the identity.
//!
//! ```text
//!              first tracked pose p0
//!  Uncalibrated ─────────────────────▶ Calibrated(p0⁻¹)
//!       ▲                                    │
//!       └──────────── reset() ───────────────┘
//! ```
//!
//! [`Calibration`] is a plain state machine; callers that share it between
//! threads hold it behind a lock so the first-write-wins transition happens
//! exactly once.

use tracing::info;

use crate::transform::Pose;

/// Current state of the calibration unit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CalibrationState {
    #[default]
    Uncalibrated,
    /// Holds the device-to-reference transform.
    Calibrated(Pose),
}

/// Result of feeding one raw pose through [`Calibration::apply`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibratedPose {
    /// The raw pose expressed in the reference frame.
    pub pose: Pose,
    /// `true` when this pose established the reference frame.
    pub established: bool,
}

/// Two-state calibration unit.
#[derive(Debug, Default)]
pub struct Calibration {
    state: CalibrationState,
}

impl Calibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self.state, CalibrationState::Calibrated(_))
    }

    /// Convert a raw tracked pose into the reference frame, establishing the
    /// frame first if this is the first pose since construction or reset.
    pub fn apply(&mut self, raw: Pose) -> CalibratedPose {
        let (transform, established) = match self.state {
            CalibrationState::Calibrated(t) => (t, false),
            CalibrationState::Uncalibrated => {
                let t = raw.inverse();
                self.state = CalibrationState::Calibrated(t);
                info!(
                    x = raw.translation.x,
                    y = raw.translation.y,
                    z = raw.translation.z,
                    "reference frame established from first tracked pose"
                );
                (t, true)
            }
        };
        CalibratedPose {
            pose: transform.compose(raw),
            established,
        }
    }

    /// Drop the cached transform.  Returns `true` if one was held.
    pub fn reset(&mut self) -> bool {
        let was = self.is_calibrated();
        self.state = CalibrationState::Uncalibrated;
        if was {
            info!("calibration reset; next tracked pose re-anchors the reference frame");
        }
        was
    }
}
