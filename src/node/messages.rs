//! Maelstrom message envelope and the request/response bodies treecast speaks.
//!
//! Every line on stdin/stdout is one [`Message`]. The body always carries a
//! `type`; request/reply correlation uses `msg_id` and `in_reply_to`. All other
//! fields are kept as raw JSON and decoded by the handler that owns the type,
//! so a malformed payload fails only that handler.
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::MemberId;
use crate::error::{ProtocolError, Result};

/// Broadcast value identifier
pub type MessageId = u64;

pub mod kinds {
    pub const INIT: &str = "init";
    pub const INIT_OK: &str = "init_ok";
    pub const TOPOLOGY: &str = "topology";
    pub const TOPOLOGY_OK: &str = "topology_ok";
    pub const BROADCAST: &str = "broadcast";
    pub const BROADCAST_OK: &str = "broadcast_ok";
    pub const READ: &str = "read";
    pub const READ_OK: &str = "read_ok";
    pub const ERROR: &str = "error";
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub src: MemberId,
    pub dest: MemberId,
    pub body: Body,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Body {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub msg_id: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub in_reply_to: Option<u64>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Body {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            msg_id: None,
            in_reply_to: None,
            fields: Map::new(),
        }
    }

    /// Build a body of `kind` whose fields come from a serializable payload
    pub fn with_payload<T: Serialize>(kind: &str, payload: &T) -> Result<Self> {
        let fields = match serde_json::to_value(payload)? {
            Value::Object(fields) => fields,
            Value::Null => Map::new(),
            other => {
                return Err(ProtocolError::Malformed(format!(
                    "payload for '{}' must be an object, got {}",
                    kind, other
                ))
                .into())
            }
        };
        Ok(Self {
            fields,
            ..Self::new(kind)
        })
    }

    pub fn error(code: u32, text: impl Into<String>) -> Self {
        let mut body = Self::new(kinds::ERROR);
        body.fields.insert("code".into(), Value::from(code));
        body.fields.insert("text".into(), Value::from(text.into()));
        body
    }

    /// Decode the non-routing fields into a typed payload
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|e| {
            ProtocolError::Malformed(format!("invalid '{}' body: {}", self.kind, e)).into()
        })
    }

    pub fn is_error(&self) -> bool {
        self.kind == kinds::ERROR
    }

    /// Copy of this body with routing metadata removed, for forwarding
    pub fn stripped(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            msg_id: None,
            in_reply_to: None,
            fields: self.fields.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct InitRequest {
    pub node_id: MemberId,
    pub node_ids: Vec<MemberId>,
}

/// The harness sends its own neighbour map; the tree is derived instead
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TopologyRequest {
    #[serde(default)]
    pub topology: HashMap<MemberId, Vec<MemberId>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub message: MessageId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadResponse {
    pub messages: Vec<MessageId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: u32,
    #[serde(default)]
    pub text: String,
}
