//! rosbridge-compatible WebSocket relay.
//!
//! [`RosbridgeRelay`] serves a WebSocket endpoint and forwards every event on
//! the [`EventBus`] to each connected client as a rosbridge v2 `publish`
//! frame:
//!
//! ```json
//! {"op":"publish","topic":"/android/odom","msg":{"header":{...},"pose":{...}}}
//! ```
//!
//! Message bodies follow the field layout of `nav_msgs/Odometry`,
//! `sensor_msgs/Imu` and `sensor_msgs/NavSatFix`.  Inbound client frames
//! are ignored apart from `Close`.

use std::net::SocketAddr;
use std::sync::Arc;

use arbridge_types::{BridgeError, Event, Header, OutboundMessage, QuaternionMsg, Vector3Msg};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;

/// Relay between the internal [`EventBus`] and rosbridge WebSocket clients.
#[derive(Clone)]
pub struct RosbridgeRelay {
    bus: Arc<EventBus>,
}

impl RosbridgeRelay {
    /// Create a new relay backed by `bus`.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Start the WebSocket server on `addr`.
    ///
    /// Runs until the listener cannot be bound; per-client failures are
    /// logged and do not stop the server.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Channel`] if the TCP listener cannot be bound.
    pub async fn run(self, addr: SocketAddr) -> Result<(), BridgeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::Channel(format!("relay bind error on {addr}: {e}")))?;
        info!(%addr, "rosbridge relay listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let relay = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = relay.handle_client(stream, peer).await {
                            error!(peer = %peer, error = %e, "relay client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "relay accept error");
                }
            }
        }
    }

    async fn handle_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), BridgeError> {
        let ws_stream = accept_async(stream).await.map_err(|e| {
            BridgeError::Channel(format!("ws handshake from {peer}: {e}"))
        })?;
        debug!(peer = %peer, "relay client connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let mut rx = self.bus.subscribe_all();

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            let frame = rosbridge_frame(&event)?;
                            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(peer = %peer, lagged_by = n, "relay client lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(_)) => break,
                        _ => {}
                    }
                }
            }
        }

        debug!(peer = %peer, "relay client disconnected");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode `event` as a rosbridge `publish` operation.
pub fn rosbridge_frame(event: &Event) -> Result<String, BridgeError> {
    let frame = json!({
        "op": "publish",
        "topic": format!("/{}", event.topic.trim_start_matches('/')),
        "msg": ros_message(&event.payload),
    });
    serde_json::to_string(&frame).map_err(|e| BridgeError::Serialization(e.to_string()))
}

fn ros_message(payload: &OutboundMessage) -> Value {
    match payload {
        OutboundMessage::Odometry(m) => json!({
            "header": ros_header(&m.header),
            "child_frame_id": m.child_frame_id,
            "pose": {
                "pose": {
                    "position": ros_vector(&m.pose.pose.position),
                    "orientation": ros_quaternion(&m.pose.pose.orientation),
                },
                "covariance": m.pose.covariance,
            },
        }),
        OutboundMessage::Imu(m) => json!({
            "header": ros_header(&m.header),
            "orientation": ros_quaternion(&m.orientation),
            "angular_velocity": ros_vector(&m.angular_velocity),
            "linear_acceleration": ros_vector(&m.linear_acceleration),
        }),
        OutboundMessage::NavSatFix(m) => json!({
            "header": ros_header(&m.header),
            "latitude": m.latitude,
            "longitude": m.longitude,
            "altitude": m.altitude,
            "position_covariance": m.position_covariance,
            "position_covariance_type": m.position_covariance_type,
        }),
    }
}

fn ros_header(h: &Header) -> Value {
    json!({
        "stamp": {
            "sec": h.stamp.timestamp(),
            "nanosec": h.stamp.timestamp_subsec_nanos(),
        },
        "frame_id": h.frame_id,
    })
}

fn ros_vector(v: &Vector3Msg) -> Value {
    json!({ "x": v.x, "y": v.y, "z": v.z })
}

fn ros_quaternion(q: &QuaternionMsg) -> Value {
    json!({ "x": q.x, "y": q.y, "z": q.z, "w": q.w })
}
