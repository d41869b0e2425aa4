//! Bus message contracts
//!
//! Payloads are JSON with PascalCase keys, matching what the other nodes in
//! the cluster publish.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BusError;

/// Request to create a session for an external id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionCreateRequest {
    /// External (bus-assigned) id
    #[serde(default)]
    pub id: String,

    /// Status and identity to apply to the new session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionStatusPayload>,

    /// Room to join after creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomDescriptor>,
}

impl SessionCreateRequest {
    pub fn new(id: impl Into<String>, session: SessionStatusPayload) -> Self {
        Self {
            id: id.into(),
            session: Some(session),
            room: None,
        }
    }

    /// Attach a room to join
    pub fn with_room(mut self, room: RoomDescriptor) -> Self {
        self.room = Some(room);
        self
    }

    pub fn decode(payload: &[u8]) -> Result<Self, BusError> {
        serde_json::from_slice(payload).map_err(|e| BusError::Malformed(e.to_string()))
    }

    pub fn encode(&self) -> Result<Bytes, BusError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| BusError::Malformed(e.to_string()))
    }
}

/// Session status carried by a create request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionStatusPayload {
    /// Opaque status blob broadcast to peers
    #[serde(default)]
    pub status: Value,

    /// User id to bind without authentication
    #[serde(default)]
    pub userid: String,
}

impl SessionStatusPayload {
    pub fn new(status: Value, userid: impl Into<String>) -> Self {
        Self {
            status,
            userid: userid.into(),
        }
    }
}

/// Room to join
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoomDescriptor {
    pub name: String,

    #[serde(rename = "Type", default)]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Value>,
}

impl RoomDescriptor {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            credentials: None,
        }
    }
}

/// Decode a close request (a JSON string holding the external id)
pub fn decode_close_request(payload: &[u8]) -> Result<String, BusError> {
    serde_json::from_slice(payload).map_err(|e| BusError::Malformed(e.to_string()))
}

/// Encode a close request
pub fn encode_close_request(id: &str) -> Bytes {
    Bytes::from(serde_json::Value::from(id).to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decode_create_request() {
        let payload = br#"{
            "Id": "ext-1",
            "Session": {"Status": {"Status": "away"}, "Userid": "u1"},
            "Room": {"Name": "lobby", "Type": "Room"}
        }"#;

        let msg = SessionCreateRequest::decode(payload).unwrap();
        assert_eq!(msg.id, "ext-1");
        let session = msg.session.unwrap();
        assert_eq!(session.status, json!({"Status": "away"}));
        assert_eq!(session.userid, "u1");
        let room = msg.room.unwrap();
        assert_eq!(room.name, "lobby");
        assert_eq!(room.kind, "Room");
        assert!(room.credentials.is_none());
    }

    #[test]
    fn test_decode_create_request_without_session() {
        let msg = SessionCreateRequest::decode(br#"{"Id": "ext-1"}"#).unwrap();
        assert!(msg.session.is_none());
    }

    #[test]
    fn test_decode_garbage() {
        let result = SessionCreateRequest::decode(b"not json");
        assert!(matches!(result, Err(BusError::Malformed(_))));
    }

    #[test]
    fn test_close_request() {
        let payload = encode_close_request("ext-\"1\"");
        assert_eq!(decode_close_request(&payload).unwrap(), "ext-\"1\"");
        assert!(decode_close_request(b"42").is_err());
    }
}
