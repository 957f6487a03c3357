//! Connection domain model.

use serde::{Deserialize, Serialize};

use super::packet::{Packet, Protocol};

/// Directional 5-tuple identifying a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionKey {
    pub src_ip: String,
    pub src_port: u16,
    pub dst_ip: String,
    pub dst_port: u16,
    pub protocol: Protocol,
}

impl ConnectionKey {
    pub fn from_packet(packet: &Packet) -> Self {
        Self {
            src_ip: packet.src_ip.clone(),
            src_port: packet.src_port,
            dst_ip: packet.dst_ip.clone(),
            dst_port: packet.dst_port,
            protocol: packet.protocol,
        }
    }
}

impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} ({})",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port, self.protocol
        )
    }
}

/// Accumulated traffic for one 5-tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(flatten)]
    pub key: ConnectionKey,
    pub traffic: u64,
    pub packet_count: u64,
    /// Milliseconds since the Unix epoch.
    pub last_seen: u64,
}

impl Connection {
    pub fn new(key: ConnectionKey, timestamp: u64) -> Self {
        Self {
            key,
            traffic: 0,
            packet_count: 0,
            last_seen: timestamp,
        }
    }

    /// Fold one packet of `size` bytes seen at `timestamp`.
    pub fn record(&mut self, size: u32, timestamp: u64) {
        self.traffic = self.traffic.saturating_add(u64::from(size));
        self.packet_count = self.packet_count.saturating_add(1);
        self.last_seen = self.last_seen.max(timestamp);
    }

    pub fn is_active(&self, now: u64, ttl_ms: u64) -> bool {
        now.saturating_sub(self.last_seen) < ttl_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_matters() {
        let forward = Packet::new(0, "10.0.0.1", 80, "10.0.0.2", 5000, Protocol::Tcp, 10);
        let reverse = Packet::new(0, "10.0.0.2", 5000, "10.0.0.1", 80, Protocol::Tcp, 10);
        assert_ne!(
            ConnectionKey::from_packet(&forward),
            ConnectionKey::from_packet(&reverse)
        );
    }

    #[test]
    fn test_record_accumulates() {
        let packet = Packet::new(100, "10.0.0.1", 80, "10.0.0.2", 5000, Protocol::Http, 40);
        let mut conn = Connection::new(ConnectionKey::from_packet(&packet), 100);
        conn.record(40, 100);
        conn.record(60, 50);
        assert_eq!(conn.traffic, 100);
        assert_eq!(conn.packet_count, 2);
        assert_eq!(conn.last_seen, 100);
    }

    #[test]
    fn test_key_is_flattened_on_the_wire() {
        let packet = Packet::new(0, "10.0.0.1", 53, "10.0.0.2", 5000, Protocol::Dns, 40);
        let conn = Connection::new(ConnectionKey::from_packet(&packet), 0);
        let json = serde_json::to_value(&conn).unwrap();
        assert_eq!(json["srcIp"], "10.0.0.1");
        assert_eq!(json["protocol"], "DNS");
        assert_eq!(json["packetCount"], 0);
    }
}
