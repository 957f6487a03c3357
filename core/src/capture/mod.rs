//! Capture module: supervised capture subprocesses, one per interface.
//!
//! This module provides:
//! - The launcher seam that builds capture commands (`tcpdump` by default)
//! - The supervisor that runs captures and streams classified packets
//! - Stderr triage separating diagnostics from failures
//! - Interface discovery via the capture tool

pub mod interfaces;
pub mod launcher;
pub mod models;
pub mod output;
pub mod supervisor;

// Re-export commonly used types
pub use interfaces::{list_interfaces, parse_interface_list};
pub use launcher::{CaptureLauncher, TcpdumpLauncher};
pub use models::{CaptureEvent, CaptureStatus, InterfaceStatus, NetworkInterface};
pub use output::is_diagnostic_line;
pub use supervisor::CaptureSupervisor;
