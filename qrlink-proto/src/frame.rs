use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::device::LinkedDeviceRecord;

/// The `kind` the pairing backend expects in the opening handshake.
pub const HANDSHAKE_KIND: &str = "server";

/// Step numbers carried in `data.step`.
pub const STEP_HANDSHAKE: u8 = 0;
pub const STEP_SCANNED: i64 = 1;
pub const STEP_LINKED: i64 = 2;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame is not valid json: {0}")]
    InvalidJson(String),
    #[error("frame is not a json object")]
    NotAnObject,
    #[error("field `{field}` has an unexpected type")]
    InvalidField { field: &'static str },
    #[error("unknown step {0}")]
    UnknownStep(i64),
    #[error("frame matches no known message shape")]
    Unrecognized,
    #[error("invalid device record: {0}")]
    InvalidDevice(String),
    #[error("invalid timestamp in `{field}`: {reason}")]
    InvalidTimestamp { field: &'static str, reason: String },
}

/// Client -> backend, sent exactly once right after the connection opens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub kind: String,
    pub step: u8,
    pub tenant_id: String,
}

impl Handshake {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            kind: HANDSHAKE_KIND.to_string(),
            step: STEP_HANDSHAKE,
            tenant_id: tenant_id.into(),
        }
    }

    pub fn encode(&self) -> String {
        json!({
            "kind": self.kind,
            "step": self.step,
            "tenantId": self.tenant_id,
        })
        .to_string()
    }
}

/// Backend -> client messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// `code != 0`; `message` is the backend's `msg`, when it sent one
    Error { code: i64, message: Option<String> },
    /// QR image payload to present for scanning
    Qr { qr: String },
    /// The phone scanned the code and is waiting for confirmation
    Scanned,
    /// Pairing finished
    Linked { device: LinkedDeviceRecord },
}

/// Decode one inbound text frame.
///
/// Shape precedence: a non-zero `code` always wins, then a QR payload, then
/// the step number.
pub fn decode_frame(raw: &str) -> Result<InboundFrame, DecodeError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;

    let code = match obj.get("code") {
        None | Some(Value::Null) => 0,
        Some(v) => v
            .as_i64()
            .ok_or(DecodeError::InvalidField { field: "code" })?,
    };
    if code != 0 {
        let message = obj
            .get("msg")
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .map(str::to_owned);
        return Ok(InboundFrame::Error { code, message });
    }

    let data = match obj.get("data") {
        Some(Value::Object(data)) => data,
        None | Some(Value::Null) => return Err(DecodeError::Unrecognized),
        Some(_) => return Err(DecodeError::InvalidField { field: "data" }),
    };

    if let Some(qr) = qr_payload(data)? {
        return Ok(InboundFrame::Qr { qr });
    }

    let step = match data.get("step") {
        None | Some(Value::Null) => return Err(DecodeError::Unrecognized),
        Some(v) => v
            .as_i64()
            .ok_or(DecodeError::InvalidField { field: "data.step" })?,
    };

    match step {
        STEP_SCANNED => Ok(InboundFrame::Scanned),
        STEP_LINKED => {
            let device = data
                .get("device")
                .filter(|d| !d.is_null())
                .ok_or_else(|| DecodeError::InvalidDevice("missing device".to_string()))?;
            Ok(InboundFrame::Linked {
                device: LinkedDeviceRecord::from_wire(device)?,
            })
        }
        other => Err(DecodeError::UnknownStep(other)),
    }
}

fn qr_payload(data: &Map<String, Value>) -> Result<Option<String>, DecodeError> {
    match data.get("qr") {
        Some(Value::String(qr)) => Ok(Some(qr.clone())),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(DecodeError::InvalidField { field: "data.qr" }),
    }
}
