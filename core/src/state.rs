//! Network state store: devices and connections folded from the packet stream.
//!
//! Records are never deleted by age. A record that has not been seen within
//! its TTL is simply left out of snapshots; [`NetworkStateStore::clear`] is the
//! only way to drop records.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::now_millis;
use crate::domain::{is_special_address, Connection, ConnectionKey, Device, Packet};

/// Default visibility window for devices and connections (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_millis(300_000);

/// Active devices and connections at one point in time.
///
/// Both collections are plain lists, sorted by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub devices: Vec<Device>,
    pub connections: Vec<Connection>,
    /// Milliseconds since the Unix epoch at which activity was evaluated.
    pub taken_at: u64,
}

impl StateSnapshot {
    pub fn device(&self, ip: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.ip == ip)
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty() && self.connections.is_empty()
    }
}

/// Counters covering every record, including ones outside the TTL window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub packets: u64,
    pub bytes: u64,
    pub devices: usize,
    pub connections: usize,
}

#[derive(Debug, Default)]
struct NetworkState {
    devices: HashMap<String, Device>,
    connections: HashMap<ConnectionKey, Connection>,
    packets: u64,
    bytes: u64,
}

/// Single-writer store for the device/connection model.
///
/// All operations take the same lock, so ingests from different interfaces
/// are serialized against each other and against snapshots. Updates are sums
/// and max-timestamps, which makes duplicate or reordered delivery harmless
/// to the keys.
#[derive(Debug)]
pub struct NetworkStateStore {
    state: Mutex<NetworkState>,
    device_ttl_ms: u64,
    connection_ttl_ms: u64,
}

impl NetworkStateStore {
    pub fn new(device_ttl: Duration, connection_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(NetworkState::default()),
            device_ttl_ms: duration_millis(device_ttl),
            connection_ttl_ms: duration_millis(connection_ttl),
        }
    }

    /// Store with the default 5 minute TTL for both record kinds.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_TTL)
    }

    pub fn device_ttl(&self) -> Duration {
        Duration::from_millis(self.device_ttl_ms)
    }

    pub fn connection_ttl(&self) -> Duration {
        Duration::from_millis(self.connection_ttl_ms)
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Fold one packet into the model.
    ///
    /// Special addresses (loopback, broadcast, multicast, unspecified) never
    /// become devices, but the connection is recorded regardless.
    pub fn ingest(&self, packet: &Packet) {
        let size = u64::from(packet.size);
        let timestamp = packet.timestamp;
        let mut state = self.state.lock();

        state.packets = state.packets.saturating_add(1);
        state.bytes = state.bytes.saturating_add(size);

        if let Some(source) = device_entry(&mut state.devices, &packet.src_ip, timestamp) {
            source.backfill_mac(packet.src_mac());
            source.traffic_out = source.traffic_out.saturating_add(size);
            source.touch(timestamp);
        }

        if let Some(destination) = device_entry(&mut state.devices, &packet.dst_ip, timestamp) {
            destination.backfill_mac(packet.dst_mac());
            destination.traffic_in = destination.traffic_in.saturating_add(size);
            destination.touch(timestamp);
        }

        let key = ConnectionKey::from_packet(packet);
        state
            .connections
            .entry(key.clone())
            .or_insert_with(|| Connection::new(key, timestamp))
            .record(packet.size, timestamp);
    }

    /// Drop every device and connection and reset the counters.
    pub fn clear(&self) {
        *self.state.lock() = NetworkState::default();
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Records seen within their TTL, evaluated against the wall clock.
    pub fn snapshot(&self) -> StateSnapshot {
        self.snapshot_at(now_millis())
    }

    /// Records seen within their TTL, evaluated at `now`.
    pub fn snapshot_at(&self, now: u64) -> StateSnapshot {
        let state = self.state.lock();

        let mut devices: Vec<Device> = state
            .devices
            .values()
            .filter(|d| d.is_active(now, self.device_ttl_ms))
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.ip.cmp(&b.ip));

        let mut connections: Vec<Connection> = state
            .connections
            .values()
            .filter(|c| c.is_active(now, self.connection_ttl_ms))
            .cloned()
            .collect();
        connections.sort_by(|a, b| a.key.cmp(&b.key));

        StateSnapshot {
            devices,
            connections,
            taken_at: now,
        }
    }

    /// Look up a device record regardless of activity.
    pub fn device(&self, ip: &str) -> Option<Device> {
        self.state.lock().devices.get(ip).cloned()
    }

    /// Look up a connection record regardless of activity.
    pub fn connection(&self, key: &ConnectionKey) -> Option<Connection> {
        self.state.lock().connections.get(key).cloned()
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.state.lock();
        StoreStats {
            packets: state.packets,
            bytes: state.bytes,
            devices: state.devices.len(),
            connections: state.connections.len(),
        }
    }
}

impl Default for NetworkStateStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Create-or-fetch the device for `ip`, or `None` for addresses that are
/// never materialized.
fn device_entry<'a>(
    devices: &'a mut HashMap<String, Device>,
    ip: &str,
    timestamp: u64,
) -> Option<&'a mut Device> {
    if ip.is_empty() || is_special_address(ip) {
        return None;
    }
    Some(
        devices
            .entry(ip.to_string())
            .or_insert_with(|| Device::new(ip, timestamp)),
    )
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
