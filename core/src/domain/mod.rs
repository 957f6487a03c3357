//! Domain layer - Pure data models for packets, devices and connections.
//!
//! These types have no I/O dependencies and can be tested in isolation.

mod address;
mod connection;
mod device;
mod packet;

pub use address::{is_gateway_address, is_special_address, parse_ipv4};
pub use connection::{Connection, ConnectionKey};
pub use device::{Device, DeviceType, Position};
pub use packet::{is_mac_address, LinkAnnotation, Packet, Protocol};
