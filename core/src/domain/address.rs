//! Address-shape rules shared by the classifier and the state store.

use std::net::Ipv4Addr;

/// Parse a dotted-quad string, ignoring surrounding whitespace.
pub fn parse_ipv4(address: &str) -> Option<Ipv4Addr> {
    address.trim().parse().ok()
}

/// Addresses that are never materialized as devices.
///
/// Covers loopback (127.0.0.0/8), limited broadcast, multicast (224.0.0.0/4)
/// and the unspecified address. Strings that are not IPv4 are not special.
pub fn is_special_address(address: &str) -> bool {
    match parse_ipv4(address) {
        Some(ip) => ip.is_loopback() || ip.is_broadcast() || ip.is_multicast() || ip.is_unspecified(),
        None => false,
    }
}

/// True for a `.1` host inside an RFC 1918 range.
pub fn is_gateway_address(address: &str) -> bool {
    parse_ipv4(address)
        .map(|ip| ip.is_private() && ip.octets()[3] == 1)
        .unwrap_or(false)
}
