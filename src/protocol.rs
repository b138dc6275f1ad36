use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SyncError;
use crate::grid::in_coordinate_range;
use crate::types::Neighborhood;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MovePayload {
    #[serde(rename = "bitId")]
    pub bit_id: String,
    pub x: i64,
    pub y: i64,
    /// Client clock in milliseconds. Informational only.
    pub time: f64,
}

/// Frames sent by clients.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum ClientMessage {
    Ping,
    Move(MovePayload),
}

/// Frames sent by the server.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum ServerMessage {
    Pong,
    Blocks(Neighborhood),
}

impl ClientMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

pub fn parse_client_message(raw: &str) -> Result<ClientMessage, SyncError> {
    let object = parse_object(raw)?;
    match message_type(&object)? {
        "ping" => Ok(ClientMessage::Ping),
        "move" => {
            let payload: MovePayload = payload_of(&object)?;
            if !in_coordinate_range(payload.x, payload.y) {
                return Err(SyncError::Validation(format!(
                    "coordinates ({}, {}) out of range",
                    payload.x, payload.y
                )));
            }
            Ok(ClientMessage::Move(payload))
        }
        other => Err(SyncError::Validation(format!("unknown message type {other:?}"))),
    }
}

pub fn parse_server_message(raw: &str) -> Result<ServerMessage, SyncError> {
    let object = parse_object(raw)?;
    match message_type(&object)? {
        "pong" => Ok(ServerMessage::Pong),
        "blocks" => Ok(ServerMessage::Blocks(payload_of(&object)?)),
        other => Err(SyncError::Validation(format!("unknown message type {other:?}"))),
    }
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, SyncError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|error| SyncError::Validation(format!("malformed json: {error}")))?;
    match value {
        Value::Object(object) => Ok(object),
        _ => Err(SyncError::Validation("message is not an object".to_string())),
    }
}

fn message_type(object: &Map<String, Value>) -> Result<&str, SyncError> {
    object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::Validation("missing string field \"type\"".to_string()))
}

fn payload_of<T: DeserializeOwned>(object: &Map<String, Value>) -> Result<T, SyncError> {
    let payload = object
        .get("payload")
        .cloned()
        .ok_or_else(|| SyncError::Validation("missing field \"payload\"".to_string()))?;
    serde_json::from_value(payload)
        .map_err(|error| SyncError::Validation(format!("invalid payload: {error}")))
}
