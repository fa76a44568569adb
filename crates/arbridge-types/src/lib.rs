use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Inbound vocabulary
// ────────────────────────────────────────────────────────────────────────────

/// Tri-state indicator reported by the pose-tracking subsystem alongside
/// every pose it delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingState {
    /// The tracker has lock and the pose is fresh.
    Tracking,
    /// Tracking is temporarily lost; no fresh pose is available.
    Paused,
    /// The tracker is not running.
    Stopped,
}

/// Which physical quantity an inertial sample carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InertialKind {
    /// Accelerometer minus gravity (m/s²).
    LinearAcceleration,
    /// Angular velocity (rad/s).
    Gyroscope,
    /// Orientation as a rotation vector (sin(θ/2)·axis, optionally w).
    RotationVector,
}

/// A single satellite-based location reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// `0.0` means the receiver produced no altitude.
    pub altitude: f64,
    /// Horizontal accuracy radius (metres).
    pub accuracy: f32,
}

// ────────────────────────────────────────────────────────────────────────────
// Outbound messages
// ────────────────────────────────────────────────────────────────────────────

/// Timestamp + frame identifier attached to every outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Emission time (not sample time).
    pub stamp: DateTime<Utc>,
    pub frame_id: String,
}

impl Header {
    /// Stamp a header with the current wall-clock time.
    pub fn now(frame_id: impl Into<String>) -> Self {
        Self {
            stamp: Utc::now(),
            frame_id: frame_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3Msg {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Quaternion in wire order (x, y, z, w).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuaternionMsg {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for QuaternionMsg {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseMsg {
    pub position: Vector3Msg,
    pub orientation: QuaternionMsg,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseWithCovarianceMsg {
    pub pose: PoseMsg,
    /// Row-major 6×6 covariance. Empty until pose covariance is computed.
    pub covariance: Vec<f64>,
}

/// `nav_msgs/Odometry`-shaped message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdometryMsg {
    pub header: Header,
    pub child_frame_id: String,
    pub pose: PoseWithCovarianceMsg,
}

/// `sensor_msgs/Imu`-shaped message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuMsg {
    pub header: Header,
    pub orientation: QuaternionMsg,
    pub angular_velocity: Vector3Msg,
    pub linear_acceleration: Vector3Msg,
}

/// `sensor_msgs/NavSatFix`-shaped message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavSatFixMsg {
    pub header: Header,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Row-major 3×3 (east, north, up) covariance in m².
    pub position_covariance: [f64; 9],
    /// One of the `COVARIANCE_TYPE_*` constants.
    pub position_covariance_type: u8,
}

impl NavSatFixMsg {
    pub const COVARIANCE_TYPE_UNKNOWN: u8 = 0;
    pub const COVARIANCE_TYPE_APPROXIMATED: u8 = 1;
    pub const COVARIANCE_TYPE_DIAGONAL_KNOWN: u8 = 2;
    pub const COVARIANCE_TYPE_KNOWN: u8 = 3;
}

/// The three message kinds the bridge emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "msg")]
pub enum OutboundMessage {
    Odometry(OdometryMsg),
    Imu(ImuMsg),
    NavSatFix(NavSatFixMsg),
}

impl OutboundMessage {
    pub fn header(&self) -> &Header {
        match self {
            OutboundMessage::Odometry(m) => &m.header,
            OutboundMessage::Imu(m) => &m.header,
            OutboundMessage::NavSatFix(m) => &m.header,
        }
    }
}

/// Envelope routed over the in-process event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Fully-qualified topic name, e.g. `"android/odom"`.
    pub topic: String,
    pub payload: OutboundMessage,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: OutboundMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            topic: topic.into(),
            payload,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by every bridge crate. Nothing here is fatal to the
/// publish loop.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("Malformed {kind} sample: expected {expected} values, got {actual}")]
    MalformedSample {
        kind: String,
        expected: String,
        actual: usize,
    },

    #[error("Invalid measurement: {0}")]
    InvalidMeasurement(String),

    #[error("Publish sink error: {0}")]
    Sink(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_state_serializes_lowercase() {
        let json = serde_json::to_string(&TrackingState::Tracking).unwrap();
        assert_eq!(json, "\"tracking\"");
        let back: TrackingState = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(back, TrackingState::Paused);
    }

    #[test]
    fn inertial_kind_serializes_snake_case() {
        let json = serde_json::to_string(&InertialKind::RotationVector).unwrap();
        assert_eq!(json, "\"rotation_vector\"");
    }

    #[test]
    fn default_quaternion_msg_is_identity() {
        let q = QuaternionMsg::default();
        assert_eq!((q.x, q.y, q.z, q.w), (0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn outbound_message_header_accessor() {
        let msg = OutboundMessage::Imu(ImuMsg {
            header: Header::now("android"),
            orientation: QuaternionMsg::default(),
            angular_velocity: Vector3Msg::default(),
            linear_acceleration: Vector3Msg::default(),
        });
        assert_eq!(msg.header().frame_id, "android");
    }

    #[test]
    fn event_json_carries_topic_and_kind() {
        let event = Event::new(
            "android/fix",
            OutboundMessage::NavSatFix(NavSatFixMsg {
                header: Header::now("android"),
                latitude: 10.0,
                longitude: 20.0,
                altitude: 5.0,
                position_covariance: [0.0; 9],
                position_covariance_type: NavSatFixMsg::COVARIANCE_TYPE_UNKNOWN,
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("android/fix"));
        assert!(json.contains("NavSatFix"));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
    }

    #[test]
    fn bridge_error_display() {
        let err = BridgeError::MalformedSample {
            kind: "gyroscope".to_string(),
            expected: "3".to_string(),
            actual: 2,
        };
        assert!(err.to_string().contains("gyroscope"));
        assert!(err.to_string().contains("got 2"));

        let err2 = BridgeError::Sink("socket closed".to_string());
        assert!(err2.to_string().contains("socket closed"));
    }
}
