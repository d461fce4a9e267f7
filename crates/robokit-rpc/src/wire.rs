/*!
 * Wire messages and framing.
 *
 * Every call is a unary request/response pair. A request names a method
 * (`<Subtype>Service.<Method>`) and carries a JSON payload whose first field
 * is the target's short name. Envelopes travel as length-prefixed frames: a
 * big-endian `u32` byte count followed by that many bytes of JSON.
 */
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use robokit_components::error::{ComponentError, Result};
use robokit_core::types::Value;

use crate::status::Status;

/// Fully qualified method names
pub mod method {
    /// `BaseService.MoveStraight`
    pub const BASE_MOVE_STRAIGHT: &str = "BaseService.MoveStraight";
    /// `BaseService.MoveArc`
    pub const BASE_MOVE_ARC: &str = "BaseService.MoveArc";
    /// `BaseService.Spin`
    pub const BASE_SPIN: &str = "BaseService.Spin";
    /// `BaseService.Stop`
    pub const BASE_STOP: &str = "BaseService.Stop";
    /// `BaseService.WidthGet`
    pub const BASE_WIDTH_GET: &str = "BaseService.WidthGet";
    /// `ServoService.Move`
    pub const SERVO_MOVE: &str = "ServoService.Move";
    /// `ServoService.AngularOffset`
    pub const SERVO_ANGULAR_OFFSET: &str = "ServoService.AngularOffset";
    /// `SensorService.GetReadings`
    pub const SENSOR_GET_READINGS: &str = "SensorService.GetReadings";
}

/// Request envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlates the reply with this request
    pub id: u64,
    /// Fully qualified method name
    pub method: String,
    /// Time the caller is still willing to wait, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Method specific message
    pub payload: serde_json::Value,
}

/// Outcome of a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    /// Method specific reply message
    Ok(serde_json::Value),
    /// The call failed
    Err(Status),
}

/// Response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request this answers
    pub id: u64,
    /// What happened
    pub reply: Reply,
}

impl Response {
    /// A successful response
    pub fn ok(id: u64, payload: serde_json::Value) -> Self {
        Self {
            id,
            reply: Reply::Ok(payload),
        }
    }

    /// A failed response
    pub fn err(id: u64, status: Status) -> Self {
        Self {
            id,
            reply: Reply::Err(status),
        }
    }

    /// The payload, or the error the status describes
    pub fn into_result(self) -> Result<serde_json::Value> {
        match self.reply {
            Reply::Ok(payload) => Ok(payload),
            Reply::Err(status) => Err(status.into_error()),
        }
    }
}

/// Reply carrying no data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// `BaseService.MoveStraight`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveStraightRequest {
    /// Short name of the base
    pub name: String,
    /// Signed distance; negative moves backwards
    pub distance_mm: i64,
    /// Speed
    pub mm_per_sec: f64,
    /// Wait for the motion to finish
    pub block: bool,
}

/// `BaseService.MoveArc`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveArcRequest {
    /// Short name of the base
    pub name: String,
    /// Signed distance along the arc
    pub distance_mm: i64,
    /// Linear speed
    pub mm_per_sec: f64,
    /// Angular speed
    pub degs_per_sec: f64,
    /// Wait for the motion to finish
    pub block: bool,
}

/// `BaseService.Spin`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinRequest {
    /// Short name of the base
    pub name: String,
    /// Signed angle to turn
    pub angle_deg: f64,
    /// Angular speed
    pub degs_per_sec: f64,
    /// Wait for the motion to finish
    pub block: bool,
}

/// Request addressing a resource without further arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRequest {
    /// Short name of the target resource
    pub name: String,
}

/// Reply to `BaseService.WidthGet`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidthGetResponse {
    /// Width of the base
    pub width_mm: i64,
}

/// `ServoService.Move`
///
/// Angles are `u32` on the wire and `u8` in the component contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServoMoveRequest {
    /// Short name of the servo
    pub name: String,
    /// Target angle
    pub angle_deg: u32,
}

/// Reply to `ServoService.AngularOffset`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AngularOffsetResponse {
    /// Current angle
    pub angle_deg: u32,
}

/// Reply to `SensorService.GetReadings`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetReadingsResponse {
    /// Readings in the sensor's own order
    pub readings: Vec<Value>,
}

/// Narrow a wire angle to the contract's range, saturating at 255
pub fn narrow_angle(angle_deg: u32) -> u8 {
    u8::try_from(angle_deg).unwrap_or(u8::MAX)
}

/// Encode a message as a JSON payload
pub fn to_payload<T: Serialize>(message: &T) -> Result<serde_json::Value> {
    serde_json::to_value(message)
        .map_err(|e| ComponentError::transport(format!("failed to encode message: {e}")))
}

/// Decode a JSON payload into a message
pub fn from_payload<T: DeserializeOwned>(payload: serde_json::Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| ComponentError::transport(format!("failed to decode message: {e}")))
}

/// Encode `message` as one complete frame, length prefix included
pub fn encode_frame<T: Serialize>(message: &T, max_frame_length: usize) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(message)
        .map_err(|e| ComponentError::transport(format!("failed to encode frame: {e}")))?;
    if body.len() > max_frame_length {
        return Err(ComponentError::transport(format!(
            "frame of {} bytes exceeds limit of {} bytes",
            body.len(),
            max_frame_length
        )));
    }
    let length = u32::try_from(body.len())
        .map_err(|_| ComponentError::transport("frame too large"))?;

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Write `message` as one frame
pub async fn write_frame<W, T>(writer: &mut W, message: &T, max_frame_length: usize) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(message, max_frame_length)?;
    writer.write_all(&frame).await.map_err(io_error)?;
    writer.flush().await.map_err(io_error)
}

/// Read one frame
///
/// Returns `None` when the peer closed the stream between frames.
pub async fn read_frame<R, T>(reader: &mut R, max_frame_length: usize) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let length = match reader.read_u32().await {
        Ok(length) => length as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(io_error(e)),
    };
    if length > max_frame_length {
        return Err(ComponentError::transport(format!(
            "frame of {} bytes exceeds limit of {} bytes",
            length, max_frame_length
        )));
    }

    let mut bytes = vec![0; length];
    reader.read_exact(&mut bytes).await.map_err(io_error)?;
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| ComponentError::transport(format!("malformed frame: {e}")))
}

fn io_error(err: std::io::Error) -> ComponentError {
    ComponentError::transport(err.to_string())
}
