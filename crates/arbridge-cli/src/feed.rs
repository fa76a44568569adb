//! Line-oriented JSON sensor feed.
//!
//! Each line on stdin is one reading, tagged by `"type"`:
//!
//! ```text
//! {"type":"accel","values":[0.1,0.0,9.7]}
//! {"type":"gyro","values":[0.0,0.0,0.2]}
//! {"type":"rotation_vector","values":[0.0,0.0,0.38,0.92]}
//! {"type":"pressure","hpa":1009.4}
//! {"type":"fix","latitude":42.29,"longitude":-71.26,"altitude":0.0,"accuracy":4.0}
//! {"type":"pose","translation":[0.1,0.0,0.2],"rotation":[0,0,0,1],"state":"tracking"}
//! {"type":"session_resumed"}
//! {"type":"session_restarted"}
//! ```
//!
//! `session_resumed` re-anchors odometry at the next tracked pose.
//! `session_restarted` also drops every fused sample and stream heartbeat,
//! for a tracker that went through `stopped` and came back.

use arbridge_perception::{Pose, Quaternion, Vec3};
use arbridge_runtime::SensorAggregator;
use arbridge_types::{BridgeError, InertialKind, LocationFix, TrackingState};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorRecord {
    Accel {
        values: Vec<f32>,
    },
    Gyro {
        values: Vec<f32>,
    },
    RotationVector {
        values: Vec<f32>,
    },
    Pressure {
        hpa: f32,
    },
    Fix {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        altitude: f64,
        #[serde(default)]
        accuracy: f32,
    },
    Pose {
        translation: [f32; 3],
        /// `[x, y, z, w]`
        rotation: [f32; 4],
        state: TrackingState,
    },
    SessionResumed,
    SessionRestarted,
}

/// Parse one feed line.  Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<SensorRecord>, BridgeError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| BridgeError::Serialization(format!("feed line: {e}")))
}

/// Hand `record` to the matching aggregator entry point.
pub fn apply(record: SensorRecord, aggregator: &SensorAggregator) -> Result<(), BridgeError> {
    match record {
        SensorRecord::Accel { values } => {
            aggregator.on_inertial_sample(InertialKind::LinearAcceleration, &values)
        }
        SensorRecord::Gyro { values } => aggregator.on_inertial_sample(InertialKind::Gyroscope, &values),
        SensorRecord::RotationVector { values } => {
            aggregator.on_inertial_sample(InertialKind::RotationVector, &values)
        }
        SensorRecord::Pressure { hpa } => aggregator.on_pressure_sample(hpa).map(|_| ()),
        SensorRecord::Fix {
            latitude,
            longitude,
            altitude,
            accuracy,
        } => aggregator
            .on_location_fix(LocationFix {
                latitude,
                longitude,
                altitude,
                accuracy,
            })
            .map(|_| ()),
        SensorRecord::Pose {
            translation,
            rotation,
            state,
        } => {
            let [x, y, z] = translation;
            let pose = Pose::new(Vec3::new(x, y, z), Quaternion::from_xyzw(rotation));
            aggregator.on_tracked_pose(pose, state).map(|_| ())
        }
        SensorRecord::SessionResumed => {
            if aggregator.reset_calibration() {
                info!("session resumed; reference frame will be re-anchored");
            }
            Ok(())
        }
        SensorRecord::SessionRestarted => {
            aggregator.reset_session();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbridge_perception::CalibrationState;

    #[test]
    fn parses_every_record_type() {
        let cases = [
            r#"{"type":"accel","values":[0.1,0.0,9.7]}"#,
            r#"{"type":"gyro","values":[0.0,0.0,0.2]}"#,
            r#"{"type":"rotation_vector","values":[0.0,0.0,0.38,0.92]}"#,
            r#"{"type":"pressure","hpa":1009.4}"#,
            r#"{"type":"fix","latitude":1.0,"longitude":2.0}"#,
            r#"{"type":"pose","translation":[0,0,0],"rotation":[0,0,0,1],"state":"paused"}"#,
            r#"{"type":"session_resumed"}"#,
            r#"{"type":"session_restarted"}"#,
        ];
        for line in cases {
            assert!(matches!(parse_line(line), Ok(Some(_))), "failed on {line}");
        }
    }

    #[test]
    fn fix_altitude_and_accuracy_default_to_zero() {
        let rec = parse_line(r#"{"type":"fix","latitude":1.0,"longitude":2.0}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            rec,
            SensorRecord::Fix {
                latitude: 1.0,
                longitude: 2.0,
                altitude: 0.0,
                accuracy: 0.0,
            }
        );
    }

    #[test]
    fn blank_and_malformed_lines() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert!(matches!(parse_line("{not json"), Err(BridgeError::Serialization(_))));
        assert!(parse_line(r#"{"type":"sonar","values":[1]}"#).is_err());
        assert!(parse_line(r#"{"type":"pressure"}"#).is_err());
    }

    #[test]
    fn apply_routes_to_aggregator() {
        let agg = SensorAggregator::default();
        apply(parse_line(r#"{"type":"gyro","values":[1,2,3]}"#).unwrap().unwrap(), &agg).unwrap();
        let s = agg.orientation().snapshot();
        assert_eq!(s.angular_velocity, Vec3::new(1.0, 2.0, 3.0));

        apply(parse_line(r#"{"type":"pressure","hpa":1020.0}"#).unwrap().unwrap(), &agg).unwrap();
        assert!(agg.location().snapshot().altitude.abs() < 1e-3);
    }

    #[test]
    fn apply_reports_rejected_samples() {
        let agg = SensorAggregator::default();
        let rec = parse_line(r#"{"type":"accel","values":[1,2]}"#).unwrap().unwrap();
        assert!(matches!(apply(rec, &agg), Err(BridgeError::MalformedSample { .. })));
    }

    #[test]
    fn pose_rotation_is_read_as_xyzw() {
        let agg = SensorAggregator::default();
        let anchor = r#"{"type":"pose","translation":[0,0,0],"rotation":[0,0,0,1],"state":"tracking"}"#;
        apply(parse_line(anchor).unwrap().unwrap(), &agg).unwrap();
        assert_eq!(agg.odometry().snapshot().rotation, Quaternion::identity());

        let moved = r#"{"type":"pose","translation":[1,0,0],"rotation":[0,0,0,1],"state":"tracking"}"#;
        apply(parse_line(moved).unwrap().unwrap(), &agg).unwrap();
        assert!((agg.odometry().snapshot().translation.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn session_resumed_resets_calibration() {
        let agg = SensorAggregator::default();
        let pose = r#"{"type":"pose","translation":[3,0,0],"rotation":[0,0,0,1],"state":"tracking"}"#;
        apply(parse_line(pose).unwrap().unwrap(), &agg).unwrap();
        assert!(matches!(agg.calibration_state(), CalibrationState::Calibrated(_)));

        apply(SensorRecord::SessionResumed, &agg).unwrap();
        assert_eq!(agg.calibration_state(), CalibrationState::Uncalibrated);
    }

    #[test]
    fn session_restarted_clears_fused_state() {
        let agg = SensorAggregator::default();
        let lines = [
            r#"{"type":"pressure","hpa":900.0}"#,
            r#"{"type":"pose","translation":[3,0,0],"rotation":[0,0,0,1],"state":"tracking"}"#,
            r#"{"type":"session_restarted"}"#,
        ];
        for line in lines {
            apply(parse_line(line).unwrap().unwrap(), &agg).unwrap();
        }
        assert_eq!(agg.calibration_state(), CalibrationState::Uncalibrated);
        assert!(!agg.location().is_dirty());
        assert!(!agg.odometry().is_dirty());
        assert_eq!(
            agg.location().snapshot().altitude,
            agg.config().default_location.altitude
        );

        let pose = r#"{"type":"pose","translation":[7,0,0],"rotation":[0,0,0,1],"state":"tracking"}"#;
        apply(parse_line(pose).unwrap().unwrap(), &agg).unwrap();
        assert!(agg.odometry().snapshot().translation.norm() < 1e-5);
    }

    #[test]
    fn non_unit_feed_rotation_is_published_normalized() {
        let agg = SensorAggregator::default();
        let pose = r#"{"type":"pose","translation":[0,0,0],"rotation":[0,0,0,1.1],"state":"tracking"}"#;
        apply(parse_line(pose).unwrap().unwrap(), &agg).unwrap();
        let q = agg.odometry().snapshot().rotation;
        assert!((q.w - 1.0).abs() < 1e-5, "rotation {q:?}");
        assert!((q.norm() - 1.0).abs() < 1e-5);
    }
}
