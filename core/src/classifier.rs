//! Capture-line classifier.
//!
//! Turns one line of tcpdump-style text output into a [`Packet`], or `None` when
//! the line is not a packet line. Accepted shapes:
//!
//! ```text
//! IP 192.168.1.1.80 > 192.168.1.2.54321: Flags [S], seq 0, win 65535, length 0
//! IP 10.0.0.1.53 > 192.168.1.1.54321: UDP, length 1024
//! IP 192.168.1.1 > 192.168.1.2: ICMP echo request, id 12345, seq 0, length 64
//! aa:bb:cc:dd:ee:ff > 11:22:33:44:55:66, ethertype IPv4 (0x0800), length 74: 10.0.0.2.443 > 10.0.0.9.51000: Flags [P.], length 8
//! aa:bb:cc:dd:ee:ff > 11:22:33:44:55:66, IPv4, length 98: 10.0.0.2 > 10.0.0.9: ICMP echo reply, id 7, seq 1, length 64
//! ```
//!
//! The capture tool's own timestamp is ignored; packets are stamped with the
//! local wall clock when classified.

use std::sync::OnceLock;

use regex::{Match, Regex};

use crate::clock::now_millis;
use crate::domain::{parse_ipv4, LinkAnnotation, Packet, Protocol};

const DNS_PORT: u16 = 53;
const HTTP_PORT: u16 = 80;
const HTTPS_PORT: u16 = 443;
const SSH_PORT: u16 = 22;

/// Network-segment marker written after the link header by `tcpdump -e`.
const ETHERTYPE_IPV4_MARKER: &str = "ethertype IPv4";
/// Shorter marker used by some capture builds.
const IPV4_MARKER: &str = "IPv4,";

/// `<ipv4>[.<port>] > <ipv4>[.<port>]:`
fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(\d{1,3}(?:\.\d{1,3}){3})(?:\.(\d{1,5}))?\s+>\s+(\d{1,3}(?:\.\d{1,3}){3})(?:\.(\d{1,5}))?:",
        )
        .unwrap()
    })
}

fn length_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\blength:? (\d+)").unwrap())
}

/// Trailing `(N)` size used by tcpdump's DNS summaries.
fn trailing_size_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\((\d+)\)\s*$").unwrap())
}

/// Classify a line, stamping it with the current time.
pub fn classify(line: &str, interface: Option<&str>) -> Option<Packet> {
    classify_at(line, interface, now_millis())
}

/// Classify a line using an explicit timestamp.
pub fn classify_at(line: &str, interface: Option<&str>, timestamp: u64) -> Option<Packet> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (link, segment) = split_link_layer(line)?;

    let caps = address_pattern().captures(segment)?;
    let src_ip = parse_ipv4(caps.get(1)?.as_str())?;
    let dst_ip = parse_ipv4(caps.get(3)?.as_str())?;
    if src_ip.is_unspecified() || dst_ip.is_unspecified() {
        return None;
    }
    let mut src_port = parse_port(caps.get(2))?;
    let mut dst_port = parse_port(caps.get(4))?;

    let rest = &segment[caps.get(0)?.end()..];
    let tokens: Vec<&str> = rest
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();

    let transport = detect_transport(&tokens);
    if !transport.has_ports() {
        src_port = 0;
        dst_port = 0;
    }

    let size = extract_size(rest);
    let has_seq_ack = tokens.iter().any(|t| *t == "seq" || *t == "ack");
    let protocol = refine_protocol(transport, src_port, dst_port, has_seq_ack);

    let mut packet = Packet::new(
        timestamp,
        src_ip.to_string(),
        src_port,
        dst_ip.to_string(),
        dst_port,
        protocol,
        size,
    );
    if let Some(link) = link {
        packet = packet.with_link(link);
    }
    if let Some(interface) = interface {
        packet = packet.with_interface(interface);
    }
    Some(packet)
}

/// Separate an optional leading MAC pair from the network-layer segment.
///
/// Lines with a link header must carry an IPv4 marker; ARP, IPv6 and other
/// ethertypes are rejected here.
fn split_link_layer(line: &str) -> Option<(Option<LinkAnnotation>, &str)> {
    let Some((head, tail)) = line.split_once(',') else {
        return Some((None, line));
    };

    let link = LinkAnnotation::parse(head).or_else(|| {
        // Skip a leading capture timestamp such as `12:00:01.123456`.
        let (_, after_timestamp) = head.trim_start().split_once(char::is_whitespace)?;
        LinkAnnotation::parse(after_timestamp)
    });
    let Some(link) = link else {
        return Some((None, line));
    };

    let start = tail
        .find(ETHERTYPE_IPV4_MARKER)
        .or_else(|| tail.find(IPV4_MARKER))?;
    Some((Some(link), &tail[start..]))
}

/// Missing port means 0; a port that does not fit in 16 bits rejects the line.
fn parse_port(port: Option<Match<'_>>) -> Option<u16> {
    match port {
        Some(m) => m.as_str().parse().ok(),
        None => Some(0),
    }
}

fn detect_transport(tokens: &[&str]) -> Protocol {
    if tokens.iter().any(|t| t.eq_ignore_ascii_case("udp")) {
        Protocol::Udp
    } else if tokens.iter().any(|t| t.eq_ignore_ascii_case("icmp")) {
        Protocol::Icmp
    } else {
        // `Flags [..]` or no marker at all: unrecognised transports count as TCP.
        Protocol::Tcp
    }
}

fn extract_size(rest: &str) -> u32 {
    length_pattern()
        .captures_iter(rest)
        .last()
        .or_else(|| trailing_size_pattern().captures(rest))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn refine_protocol(transport: Protocol, src_port: u16, dst_port: u16, has_seq_ack: bool) -> Protocol {
    if src_port == DNS_PORT || dst_port == DNS_PORT {
        return Protocol::Dns;
    }
    if transport != Protocol::Tcp {
        return transport;
    }
    match src_port {
        HTTP_PORT if !has_seq_ack => Protocol::Http,
        HTTPS_PORT if !has_seq_ack => Protocol::Https,
        SSH_PORT => Protocol::Ssh,
        _ => Protocol::Tcp,
    }
}
