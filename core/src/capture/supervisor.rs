//! Supervisor for per-interface capture subprocesses.
//!
//! Each interface gets its own subprocess plus three tasks: a stdout reader
//! feeding the classifier, a stderr reader separating diagnostics from
//! failures, and an exit watcher. Interfaces never share a task, so a stalled
//! capture cannot hold up another one.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::launcher::CaptureLauncher;
use super::models::{CaptureEvent, CaptureStatus, InterfaceStatus};
use super::output::{describe_exit, is_diagnostic_line};
use crate::classifier::classify;
use crate::clock::now_millis;
use crate::error::{Error, Result};

/// Grace period between SIGTERM and a forced kill.
const KILL_GRACE_PERIOD: Duration = Duration::from_millis(300);

/// How long the exit watcher waits for buffered stdout after the subprocess
/// exits. Bounded because a grandchild may keep the pipe open.
const STDOUT_DRAIN_WINDOW: Duration = Duration::from_secs(2);

/// How long the exit watcher waits for trailing stderr before reporting.
const STDERR_DRAIN_WINDOW: Duration = Duration::from_millis(200);

/// Why the exit watcher was told to terminate its subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    /// `stop_interface`/`stop_all`. No exit event follows.
    Requested,
    /// The capture reported an error. The exit is still reported.
    Failed,
}

#[derive(Debug, Default)]
struct LineCounters {
    packets: AtomicU64,
    rejected: AtomicU64,
}

/// Bookkeeping for one running capture. Dropping it stops the subprocess.
struct CaptureHandle {
    /// Distinguishes this subprocess from later captures on the same name.
    generation: Uuid,
    filter: Option<String>,
    pid: Option<u32>,
    started_at: u64,
    counters: Arc<LineCounters>,
    stop: oneshot::Sender<StopReason>,
}

struct Shared {
    captures: RwLock<HashMap<String, CaptureHandle>>,
    events: mpsc::UnboundedSender<CaptureEvent>,
    total_packets: AtomicU64,
    total_rejected: AtomicU64,
}

impl Shared {
    fn is_current(&self, name: &str, generation: Uuid) -> bool {
        self.captures
            .read()
            .get(name)
            .map(|h| h.generation == generation)
            .unwrap_or(false)
    }

    /// Remove the capture only if it is still the given generation.
    fn take_if_current(&self, name: &str, generation: Uuid) -> Option<CaptureHandle> {
        let mut captures = self.captures.write();
        match captures.get(name) {
            Some(handle) if handle.generation == generation => captures.remove(name),
            _ => None,
        }
    }

    fn remove_if_current(&self, name: &str, generation: Uuid) -> bool {
        self.take_if_current(name, generation).is_some()
    }

    fn emit(&self, event: CaptureEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.events.send(event);
    }
}

/// Runs one capture subprocess per interface and streams classified packets.
///
/// Events are delivered on the receiver returned by [`CaptureSupervisor::new`].
/// Starting captures requires a Tokio runtime.
pub struct CaptureSupervisor {
    launcher: Box<dyn CaptureLauncher>,
    shared: Arc<Shared>,
}

impl CaptureSupervisor {
    /// Creates a supervisor and the receiving end of its event channel.
    pub fn new(
        launcher: impl CaptureLauncher + 'static,
    ) -> (Self, mpsc::UnboundedReceiver<CaptureEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let supervisor = Self {
            launcher: Box::new(launcher),
            shared: Arc::new(Shared {
                captures: RwLock::new(HashMap::new()),
                events,
                total_packets: AtomicU64::new(0),
                total_rejected: AtomicU64::new(0),
            }),
        };
        (supervisor, receiver)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts capturing on every named interface with the same filter.
    ///
    /// Fails with [`Error::Conflict`] before spawning anything if a name is
    /// already capturing. If any launch fails, every subprocess started by
    /// this call is killed and [`Error::LaunchFailed`] is returned; captures
    /// from earlier calls are left alone.
    pub fn start_interfaces<I, S>(&self, names: I, filter: Option<&str>) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names
            .into_iter()
            .map(|n| {
                let name: String = n.into();
                name.trim().to_string()
            })
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            return Ok(());
        }
        let filter = filter
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string);

        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("Capture requires a Tokio runtime: {}", e)))?;
        let _guard = runtime.enter();

        let mut captures = self.shared.captures.write();

        let conflicts: Vec<String> = names
            .iter()
            .filter(|n| captures.contains_key(n.as_str()))
            .cloned()
            .collect();
        if !conflicts.is_empty() {
            warn!(interfaces = ?conflicts, "Capture already running");
            return Err(Error::Conflict(conflicts));
        }

        let mut launched: Vec<(String, Child)> = Vec::with_capacity(names.len());
        for name in &names {
            let mut command = self.launcher.command(name, filter.as_deref());
            command
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            match command.spawn() {
                Ok(child) => launched.push((name.clone(), child)),
                Err(e) => {
                    warn!(interface = %name, error = %e, "Capture launch failed");
                    for (started, mut child) in launched {
                        debug!(interface = %started, "Rolling back capture");
                        let _ = child.start_kill();
                    }
                    return Err(Error::LaunchFailed {
                        interface: name.clone(),
                        reason: format!("Failed to start {}: {}", self.launcher.program(), e),
                    });
                }
            }
        }

        for (name, child) in launched {
            let handle = self.supervise(&runtime, &name, filter.clone(), child);
            info!(interface = %name, pid = ?handle.pid, filter = ?handle.filter, "Capture started");
            captures.insert(name, handle);
        }

        Ok(())
    }

    /// Stops capturing on one interface. Returns false if it was not running.
    ///
    /// The interface leaves [`status`](Self::status) immediately; the
    /// subprocess is terminated in the background.
    pub fn stop_interface(&self, name: &str) -> bool {
        let removed = self.shared.captures.write().remove(name);
        match removed {
            Some(handle) => {
                info!(interface = %name, "Stopping capture");
                let _ = handle.stop.send(StopReason::Requested);
                true
            }
            None => {
                debug!(interface = %name, "Capture not running");
                false
            }
        }
    }

    /// Stops every capture and resets the counters.
    pub fn stop_all(&self) {
        let drained: Vec<(String, CaptureHandle)> = self.shared.captures.write().drain().collect();
        for (name, handle) in drained {
            info!(interface = %name, "Stopping capture");
            let _ = handle.stop.send(StopReason::Requested);
        }
        self.shared.total_packets.store(0, Ordering::SeqCst);
        self.shared.total_rejected.store(0, Ordering::SeqCst);
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Current captures, sorted by interface name.
    pub fn status(&self) -> CaptureStatus {
        let captures = self.shared.captures.read();
        let mut per_interface: Vec<InterfaceStatus> = captures
            .iter()
            .map(|(name, handle)| InterfaceStatus {
                name: name.clone(),
                packet_count: handle.counters.packets.load(Ordering::Relaxed),
                rejected_count: handle.counters.rejected.load(Ordering::Relaxed),
                filter: handle.filter.clone(),
                pid: handle.pid,
                started_at: handle.started_at,
            })
            .collect();
        per_interface.sort_by(|a, b| a.name.cmp(&b.name));

        CaptureStatus {
            active: !per_interface.is_empty(),
            per_interface,
            total_packets: self.shared.total_packets.load(Ordering::Relaxed),
            total_rejected: self.shared.total_rejected.load(Ordering::Relaxed),
        }
    }

    /// Checks if an interface is capturing.
    pub fn is_capturing(&self, name: &str) -> bool {
        self.shared.captures.read().contains_key(name)
    }

    /// Name of the capture program, for display.
    pub fn program(&self) -> String {
        self.launcher.program()
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    fn supervise(
        &self,
        runtime: &Handle,
        name: &str,
        filter: Option<String>,
        mut child: Child,
    ) -> CaptureHandle {
        let generation = Uuid::new_v4();
        let counters = Arc::new(LineCounters::default());
        let (stop, stop_rx) = oneshot::channel();
        let pid = child.id();

        let stdout_task = child.stdout.take().map(|stdout| {
            runtime.spawn(forward_stdout(
                self.shared.clone(),
                name.to_string(),
                generation,
                counters.clone(),
                stdout,
            ))
        });

        let stderr_task = child.stderr.take().map(|stderr| {
            runtime.spawn(forward_stderr(
                self.shared.clone(),
                name.to_string(),
                generation,
                stderr,
            ))
        });

        runtime.spawn(watch_exit(
            self.shared.clone(),
            name.to_string(),
            generation,
            self.launcher.program(),
            child,
            stop_rx,
            stdout_task,
            stderr_task,
        ));

        CaptureHandle {
            generation,
            filter,
            pid,
            started_at: now_millis(),
            counters,
            stop,
        }
    }
}

impl Drop for CaptureSupervisor {
    fn drop(&mut self) {
        // Dropping the handles signals every exit watcher to terminate its child.
        self.shared.captures.write().clear();
    }
}

async fn read_line_lossy<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    buf: &mut Vec<u8>,
) -> Option<String> {
    buf.clear();
    match reader.read_until(b'\n', buf).await {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(String::from_utf8_lossy(buf).into_owned()),
    }
}

async fn forward_stdout<R: AsyncRead + Unpin>(
    shared: Arc<Shared>,
    name: String,
    generation: Uuid,
    counters: Arc<LineCounters>,
    stdout: R,
) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();

    while let Some(line) = read_line_lossy(&mut reader, &mut buf).await {
        if !shared.is_current(&name, generation) {
            break;
        }

        match classify(&line, Some(&name)) {
            Some(packet) => {
                counters.packets.fetch_add(1, Ordering::Relaxed);
                shared.total_packets.fetch_add(1, Ordering::Relaxed);
                let event = CaptureEvent::Packet {
                    interface: name.clone(),
                    packet,
                };
                if shared.events.send(event).is_err() {
                    break;
                }
            }
            None => {
                counters.rejected.fetch_add(1, Ordering::Relaxed);
                shared.total_rejected.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    debug!(interface = %name, "Capture stdout closed");
}

async fn forward_stderr<R: AsyncRead + Unpin>(
    shared: Arc<Shared>,
    name: String,
    generation: Uuid,
    stderr: R,
) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    let mut failed = false;

    while let Some(line) = read_line_lossy(&mut reader, &mut buf).await {
        let line = line.trim();
        if is_diagnostic_line(line) {
            debug!(interface = %name, message = %line, "Capture diagnostic");
            continue;
        }

        // Errors after a deliberate stop are not reported.
        let removed = match shared.take_if_current(&name, generation) {
            Some(handle) => {
                let _ = handle.stop.send(StopReason::Failed);
                true
            }
            None => false,
        };
        if removed || failed {
            failed = true;
            warn!(interface = %name, message = %line, "Capture error");
            shared.emit(CaptureEvent::Error {
                interface: name.clone(),
                message: line.to_string(),
            });
        }
    }
}

async fn watch_exit(
    shared: Arc<Shared>,
    name: String,
    generation: Uuid,
    program: String,
    mut child: Child,
    stop: oneshot::Receiver<StopReason>,
    stdout_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
) {
    // A pending stop wins over an exit seen in the same poll, so an explicit
    // stop never reports an exit.
    let status = tokio::select! {
        biased;
        reason = stop => {
            terminate(&name, &mut child).await;
            // A dropped handle (supervisor gone) counts as a requested stop.
            if reason.unwrap_or(StopReason::Requested) == StopReason::Requested {
                return;
            }
            child.wait().await
        }
        status = child.wait() => status,
    };

    // Every line the subprocess printed is forwarded before its exit is reported.
    if let Some(task) = stdout_task {
        if tokio::time::timeout(STDOUT_DRAIN_WINDOW, task).await.is_err() {
            debug!(interface = %name, "Capture stdout still open after exit");
        }
    }
    if let Some(task) = stderr_task {
        let _ = tokio::time::timeout(STDERR_DRAIN_WINDOW, task).await;
    }
    let removed = shared.remove_if_current(&name, generation);

    match status {
        Ok(status) => {
            let code = status.code();
            info!(interface = %name, code = ?code, "Capture exited");
            if let Some(code) = code.filter(|c| *c != 0) {
                if removed {
                    shared.emit(CaptureEvent::Error {
                        interface: name.clone(),
                        message: describe_exit(&program, code),
                    });
                }
            }
            shared.emit(CaptureEvent::Exited {
                interface: name,
                code,
            });
        }
        Err(e) => {
            warn!(interface = %name, error = %e, "Failed to wait for capture");
            if removed {
                shared.emit(CaptureEvent::Error {
                    interface: name,
                    message: format!("Failed to wait for {}: {}", program, e),
                });
            }
        }
    }
}

/// SIGTERM first so the capture tool can flush, then force kill.
async fn terminate(name: &str, child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id().and_then(|p| i32::try_from(p).ok()) {
            if kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok()
                && tokio::time::timeout(KILL_GRACE_PERIOD, child.wait())
                    .await
                    .is_ok()
            {
                debug!(interface = %name, pid = pid, "Capture terminated");
                return;
            }
        }
    }

    match child.kill().await {
        Ok(()) => debug!(interface = %name, "Capture killed"),
        Err(e) => debug!(interface = %name, error = %e, "Capture already gone"),
    }
}
