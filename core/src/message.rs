//! Outbound message envelope for whatever transport sits on top of the engine.

use serde::{Deserialize, Serialize};

use crate::capture::{CaptureEvent, InterfaceStatus};
use crate::domain::Packet;
use crate::state::StateSnapshot;

/// Serialized as `{"type": "...", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Message {
    Packet(Packet),
    State(StateSnapshot),
    Interfaces(Vec<InterfaceStatus>),
    Error { interface: String, message: String },
}

impl Message {
    /// Map a capture event to the message a client should see, if any.
    /// Exits are not forwarded; the interface list reflects them.
    pub fn from_event(event: &CaptureEvent) -> Option<Self> {
        match event {
            CaptureEvent::Packet { packet, .. } => Some(Message::Packet(packet.clone())),
            CaptureEvent::Error { interface, message } => Some(Message::Error {
                interface: interface.clone(),
                message: message.clone(),
            }),
            CaptureEvent::Exited { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Packet(_) => "packet",
            Message::State(_) => "state",
            Message::Interfaces(_) => "interfaces",
            Message::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
