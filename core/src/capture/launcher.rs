//! Command construction for capture subprocesses.

use std::path::PathBuf;

use tokio::process::Command;

/// Builds the subprocess command that captures on one interface.
///
/// The supervisor wires stdio and lifetime handling; implementations only
/// choose the program and its arguments.
pub trait CaptureLauncher: Send + Sync {
    /// Command that captures on `interface`, applying `filter` verbatim when given.
    fn command(&self, interface: &str, filter: Option<&str>) -> Command;

    /// Program name used in log and error messages.
    fn program(&self) -> String;
}

/// Launches `tcpdump` in line-buffered, numeric mode.
#[derive(Debug, Clone)]
pub struct TcpdumpLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl TcpdumpLauncher {
    /// Default arguments: line-buffered (`-l`), no name resolution (`-n`),
    /// link-level header (`-e`).
    pub const DEFAULT_ARGS: [&'static str; 3] = ["-l", "-n", "-e"];

    pub fn new() -> Self {
        Self::with_program("tcpdump", Self::DEFAULT_ARGS.iter().map(|a| a.to_string()).collect())
    }

    pub fn with_program(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Full argument list for one interface.
    pub fn args_for(&self, interface: &str, filter: Option<&str>) -> Vec<String> {
        let mut args = self.args.clone();
        args.push("-i".to_string());
        args.push(interface.to_string());
        if let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) {
            args.push(filter.to_string());
        }
        args
    }
}

impl Default for TcpdumpLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureLauncher for TcpdumpLauncher {
    fn command(&self, interface: &str, filter: Option<&str>) -> Command {
        let mut command = Command::new(&self.program);
        command.args(self.args_for(interface, filter));
        command
    }

    fn program(&self) -> String {
        self.program.display().to_string()
    }
}
