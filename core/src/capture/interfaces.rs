//! Discovery of capture-capable interfaces.
//!
//! Uses `<capture program> -D`, which prints one interface per line:
//! ```text
//! 1.eth0 [Up, Running, Connected]
//! 2.any (Pseudo-device that captures on all interfaces) [Up, Running]
//! 3.lo [Up, Running, Loopback]
//! ```

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::models::NetworkInterface;
use crate::error::{Error, Result};

/// Run `<program> -D` and parse its interface list.
pub async fn list_interfaces(program: impl AsRef<Path>) -> Result<Vec<NetworkInterface>> {
    let program = program.as_ref();
    let output = Command::new(program)
        .arg("-D")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            Error::CommandFailed(format!("Failed to run {} -D: {}", program.display(), e))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::CommandFailed(format!(
            "{} -D failed: {}",
            program.display(),
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8(output.stdout)
        .map_err(|e| Error::ParseError(format!("Invalid UTF-8 in interface list: {}", e)))?;

    let interfaces = parse_interface_list(&stdout);
    debug!(count = interfaces.len(), "Discovered capture interfaces");
    Ok(interfaces)
}

/// Parse `-D` output, skipping lines that do not fit the shape.
pub fn parse_interface_list(output: &str) -> Vec<NetworkInterface> {
    output.lines().filter_map(parse_interface_line).collect()
}

fn parse_interface_line(line: &str) -> Option<NetworkInterface> {
    let line = line.trim();
    let (index, rest) = line.split_once('.')?;
    let index: u32 = index.parse().ok()?;

    // Flags are the trailing bracket group, if any.
    let (rest, flags) = match rest.rfind(" [") {
        Some(pos) if rest.ends_with(']') => {
            let flags = rest[pos + 2..rest.len() - 1]
                .split(',')
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect();
            (&rest[..pos], flags)
        }
        _ => (rest, Vec::new()),
    };

    let (name, description) = match rest.find(" (") {
        Some(pos) if rest.ends_with(')') => (
            &rest[..pos],
            Some(rest[pos + 2..rest.len() - 1].to_string()),
        ),
        _ => (rest, None),
    };

    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    Some(NetworkInterface {
        index,
        name: name.to_string(),
        description,
        flags,
    })
}
