//! Device domain model.

use serde::{Deserialize, Serialize};

use super::address::{is_gateway_address, parse_ipv4};

/// Role inferred once from the address shape when a device is first seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum DeviceType {
    Host,
    Gateway,
    #[default]
    Unknown,
}

impl DeviceType {
    /// Classify an address: private `.1` hosts are gateways, other IPv4 hosts
    /// are plain hosts, anything else is unknown.
    pub fn detect(address: &str) -> Self {
        if parse_ipv4(address).is_none() {
            DeviceType::Unknown
        } else if is_gateway_address(address) {
            DeviceType::Gateway
        } else {
            DeviceType::Host
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DeviceType::Host => "Host",
            DeviceType::Gateway => "Gateway",
            DeviceType::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Canvas coordinates assigned by the layout resolver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A host observed in traffic, keyed by its IP address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub ip: String,
    /// Filled from the first link-layer annotation that carries it.
    pub mac: Option<String>,
    pub device_type: DeviceType,
    pub traffic_in: u64,
    pub traffic_out: u64,
    /// Milliseconds since the Unix epoch.
    pub last_seen: u64,
    /// Owned by the layout resolver; the state store never sets it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Device {
    /// Create a device first seen at `timestamp`.
    pub fn new(ip: impl Into<String>, timestamp: u64) -> Self {
        let ip = ip.into();
        let device_type = DeviceType::detect(&ip);
        Self {
            ip,
            mac: None,
            device_type,
            traffic_in: 0,
            traffic_out: 0,
            last_seen: timestamp,
            position: None,
        }
    }

    /// Combined traffic in both directions.
    pub fn total_traffic(&self) -> u64 {
        self.traffic_in.saturating_add(self.traffic_out)
    }

    /// Set the MAC only if none is known yet.
    pub fn backfill_mac(&mut self, mac: Option<&str>) {
        if self.mac.as_deref().map_or(true, str::is_empty) {
            if let Some(mac) = mac.filter(|m| !m.is_empty()) {
                self.mac = Some(mac.to_string());
            }
        }
    }

    /// Advance `last_seen`, never moving it backwards.
    pub fn touch(&mut self, timestamp: u64) {
        self.last_seen = self.last_seen.max(timestamp);
    }

    /// Whether the device was seen within `ttl_ms` of `now`.
    pub fn is_active(&self, now: u64, ttl_ms: u64) -> bool {
        now.saturating_sub(self.last_seen) < ttl_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_type_detection() {
        assert_eq!(DeviceType::detect("192.168.1.1"), DeviceType::Gateway);
        assert_eq!(DeviceType::detect("192.168.1.42"), DeviceType::Host);
        assert_eq!(DeviceType::detect("1.1.1.1"), DeviceType::Host);
        assert_eq!(DeviceType::detect("fe80::1"), DeviceType::Unknown);
    }

    #[test]
    fn test_mac_is_never_overwritten() {
        let mut device = Device::new("10.0.0.5", 0);
        device.backfill_mac(None);
        assert_eq!(device.mac, None);

        device.backfill_mac(Some("aa:bb:cc:dd:ee:ff"));
        device.backfill_mac(Some("11:22:33:44:55:66"));
        assert_eq!(device.mac.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_empty_mac_is_backfilled() {
        let mut device = Device::new("10.0.0.5", 0);
        device.mac = Some(String::new());
        device.backfill_mac(Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(device.mac.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_touch_keeps_latest() {
        let mut device = Device::new("10.0.0.5", 500);
        device.touch(100);
        assert_eq!(device.last_seen, 500);
        device.touch(900);
        assert_eq!(device.last_seen, 900);
    }

    #[test]
    fn test_activity_window() {
        let device = Device::new("10.0.0.5", 1_000);
        assert!(device.is_active(1_000 + 299, 300));
        assert!(!device.is_active(1_000 + 300, 300));
        // clock behind last_seen still counts as active
        assert!(device.is_active(500, 300));
    }
}
