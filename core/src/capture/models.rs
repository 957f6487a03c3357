//! Capture supervisor data models.

use serde::{Deserialize, Serialize};

use crate::domain::Packet;

/// Events emitted by running captures, each scoped to one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// A stdout line classified into a packet.
    Packet { interface: String, packet: Packet },
    /// A genuine error from the capture subprocess. The interface has been
    /// removed from the active set.
    Error { interface: String, message: String },
    /// The subprocess exited on its own. `code` is `None` when it was killed
    /// by a signal.
    Exited { interface: String, code: Option<i32> },
}

/// Status of one running capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceStatus {
    pub name: String,
    pub packet_count: u64,
    /// Stdout lines that were not packet lines.
    pub rejected_count: u64,
    pub filter: Option<String>,
    pub pid: Option<u32>,
    /// Milliseconds since the Unix epoch.
    pub started_at: u64,
}

/// Snapshot of the supervisor state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStatus {
    pub active: bool,
    pub per_interface: Vec<InterfaceStatus>,
    /// Packets forwarded since the last `stop_all`.
    pub total_packets: u64,
    pub total_rejected: u64,
}

impl CaptureStatus {
    /// Status entry for a named interface.
    pub fn interface(&self, name: &str) -> Option<&InterfaceStatus> {
        self.per_interface.iter().find(|i| i.name == name)
    }

    /// Names of the interfaces currently capturing.
    pub fn names(&self) -> Vec<&str> {
        self.per_interface.iter().map(|i| i.name.as_str()).collect()
    }
}

/// A capture-capable interface reported by the capture tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    pub index: u32,
    pub name: String,
    pub description: Option<String>,
    pub flags: Vec<String>,
}

impl NetworkInterface {
    /// Whether the tool reported the interface as up.
    pub fn is_up(&self) -> bool {
        self.flags.iter().any(|f| f == "Up")
    }

    /// Pseudo-devices such as `any` and the loopback.
    pub fn is_loopback(&self) -> bool {
        self.flags.iter().any(|f| f == "Loopback")
    }
}
