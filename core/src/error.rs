//! Error types for the netscope-core library.

use thiserror::Error;

/// Result type alias for netscope operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while supervising captures and managing configuration.
///
/// Unparsable capture lines are not errors: the classifier returns `None` for them.
#[derive(Error, Debug)]
pub enum Error {
    /// A capture subprocess could not be launched for an interface.
    #[error("Failed to start capture on {interface}: {reason}")]
    LaunchFailed { interface: String, reason: String },

    /// A start request named interfaces that are already capturing.
    #[error("Already capturing on: {}", .0.join(", "))]
    Conflict(Vec<String>),

    /// Failed to execute a system command.
    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    /// Failed to parse command output.
    #[error("Failed to parse output: {0}")]
    ParseError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_names_interfaces() {
        let err = Error::Conflict(vec!["eth0".to_string(), "wlan0".to_string()]);
        assert_eq!(err.to_string(), "Already capturing on: eth0, wlan0");
    }

    #[test]
    fn test_launch_failure_names_interface() {
        let err = Error::LaunchFailed {
            interface: "eth0".to_string(),
            reason: "permission denied".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to start capture on eth0: permission denied");
    }
}
