//! NetScope Core Library
//!
//! Live network traffic mapping from capture-tool output. Provides:
//! - Supervision of one capture subprocess per interface
//! - Classification of capture text lines into typed packets
//! - A time-decaying model of devices and connections
//! - Overlap-free layout of the device graph
//!
//! # Architecture
//! - `domain`: Packet, device and connection models
//! - `capture`: Subprocess launch, supervision and interface discovery
//! - `classifier`: Stateless line parser
//! - `state`: Device/connection store fed by packets
//! - `layout`: Position resolver for visualized devices
//! - `engine`: Wires the pieces together behind one polling API
//!
//! # Platform Support
//! Capture relies on `tcpdump` (or a compatible tool) being installed and
//! permitted to open the requested interfaces.

pub mod capture;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod layout;
pub mod message;
pub mod state;

// Re-export domain types (primary API)
pub use domain::{Connection, ConnectionKey, Device, DeviceType, Packet, Position, Protocol};

// Re-export other commonly used types
pub use capture::{CaptureEvent, CaptureStatus, CaptureSupervisor, InterfaceStatus, TcpdumpLauncher};
pub use classifier::classify;
pub use config::{Config, ConfigStore};
pub use engine::NetScopeEngine;
pub use error::{Error, Result};
pub use layout::{LayoutConfig, LayoutResolver};
pub use message::Message;
pub use state::{NetworkStateStore, StateSnapshot, StoreStats};
