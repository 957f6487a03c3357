//! Triage of capture subprocess stderr output.
//!
//! Capture tools write status chatter to stderr next to real failures. Only
//! the latter are surfaced as error events.

/// Status messages tcpdump writes to stderr during normal operation.
const DIAGNOSTIC_MARKERS: &[&str] = &[
    "listening on",
    "packets captured",
    "packets received by filter",
    "packets dropped by kernel",
    "packets dropped by interface",
    "verbose output suppressed",
    "data link type",
    "warning:",
];

/// Checks if a stderr line is diagnostic chatter rather than an error.
pub fn is_diagnostic_line(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return true;
    }

    let line_lower = line.to_lowercase();
    DIAGNOSTIC_MARKERS
        .iter()
        .any(|marker| line_lower.contains(marker))
}

/// Human-readable reason for an unexpected exit.
pub fn describe_exit(program: &str, code: i32) -> String {
    match code {
        1 => format!("{} exited with code 1 (check interface name and capture permissions)", program),
        _ => format!("{} exited with code {}", program, code),
    }
}
