//! Packet records produced by the classifier.

use serde::{Deserialize, Serialize};

// ============================================================================
// Protocol
// ============================================================================

/// Protocol tag assigned to a classified packet.
///
/// Transport tags come from the capture line itself; application tags are a
/// port-based refinement on top of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Icmp,
    Dns,
    Http,
    Https,
    Ssh,
}

impl Protocol {
    /// Display label for this protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
            Protocol::Dns => "DNS",
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
            Protocol::Ssh => "SSH",
        }
    }

    /// Whether the protocol carries port numbers.
    pub fn has_ports(&self) -> bool {
        !matches!(self, Protocol::Icmp)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// LinkAnnotation
// ============================================================================

/// Link-layer header text preceding the network segment, e.g.
/// `aa:bb:cc:dd:ee:ff > 11:22:33:44:55:66`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkAnnotation {
    pub raw: String,
}

impl LinkAnnotation {
    /// Build an annotation when `raw` holds a well-formed MAC pair.
    pub fn parse(raw: &str) -> Option<Self> {
        let annotation = Self {
            raw: raw.trim().to_string(),
        };
        (annotation.source_mac().is_some() && annotation.destination_mac().is_some())
            .then_some(annotation)
    }

    /// MAC address on the sending side.
    pub fn source_mac(&self) -> Option<&str> {
        let (source, _) = self.raw.split_once('>')?;
        let source = source.trim();
        is_mac_address(source).then_some(source)
    }

    /// MAC address on the receiving side.
    pub fn destination_mac(&self) -> Option<&str> {
        let (_, destination) = self.raw.split_once('>')?;
        let destination = destination.trim();
        is_mac_address(destination).then_some(destination)
    }
}

/// Six colon-separated hex pairs.
pub fn is_mac_address(candidate: &str) -> bool {
    let groups: Vec<&str> = candidate.split(':').collect();
    groups.len() == 6
        && groups
            .iter()
            .all(|g| g.len() == 2 && g.chars().all(|c| c.is_ascii_hexdigit()))
}

// ============================================================================
// Packet
// ============================================================================

/// One observed packet. Folded into the state store and then discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Packet {
    /// Milliseconds since the Unix epoch, stamped at classification time.
    pub timestamp: u64,
    pub src_ip: String,
    pub dst_ip: String,
    /// Zero when the protocol has no ports.
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
    /// Size reported by the capture tool; zero when unknown.
    pub size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkAnnotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}

impl Packet {
    /// Create a packet without link-layer or interface annotations.
    pub fn new(
        timestamp: u64,
        src_ip: impl Into<String>,
        src_port: u16,
        dst_ip: impl Into<String>,
        dst_port: u16,
        protocol: Protocol,
        size: u32,
    ) -> Self {
        Self {
            timestamp,
            src_ip: src_ip.into(),
            dst_ip: dst_ip.into(),
            src_port,
            dst_port,
            protocol,
            size,
            link: None,
            interface: None,
        }
    }

    /// Attach a link-layer annotation.
    pub fn with_link(mut self, link: LinkAnnotation) -> Self {
        self.link = Some(link);
        self
    }

    /// Tag the packet with the interface it was captured on.
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// Source MAC from the link annotation, if any.
    pub fn src_mac(&self) -> Option<&str> {
        self.link.as_ref().and_then(LinkAnnotation::source_mac)
    }

    /// Destination MAC from the link annotation, if any.
    pub fn dst_mac(&self) -> Option<&str> {
        self.link.as_ref().and_then(LinkAnnotation::destination_mac)
    }
}
