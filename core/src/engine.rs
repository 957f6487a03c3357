//! NetScope Engine - wires capture, state and layout together.
//!
//! The engine owns the capture supervisor and a pump task that folds every
//! classified packet into the state store. Callers poll it: `snapshot()` for
//! the positioned device graph, `take_messages()` for errors and interface
//! changes since the last poll.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capture::{CaptureEvent, CaptureLauncher, CaptureStatus, CaptureSupervisor};
use crate::clock::now_millis;
use crate::config::Config;
use crate::domain::{Device, Position};
use crate::error::{Error, Result};
use crate::layout::LayoutResolver;
use crate::message::Message;
use crate::state::{NetworkStateStore, StateSnapshot, StoreStats};

/// Layout bookkeeping kept across snapshots.
struct LayoutState {
    resolver: LayoutResolver,
    /// Last known position per device IP, including devices currently aged out.
    positions: HashMap<String, Position>,
    snapshots: u64,
    every: u64,
}

impl LayoutState {
    fn new(resolver: LayoutResolver, every: u32) -> Self {
        Self {
            resolver,
            positions: HashMap::new(),
            snapshots: 0,
            every: u64::from(every.max(1)),
        }
    }

    /// Position every device in `devices`: known devices keep their spot, new
    /// ones are placed against the rest, and every Nth call relaxes the lot.
    fn apply(&mut self, devices: &mut [Device]) {
        let mut placed: Vec<Device> = Vec::with_capacity(devices.len());
        let mut fresh: Vec<Device> = Vec::new();
        for device in devices.iter() {
            let mut device = device.clone();
            match self.positions.get(&device.ip) {
                Some(position) => {
                    device.position = Some(*position);
                    placed.push(device);
                }
                None => fresh.push(device),
            }
        }

        for mut device in fresh {
            self.resolver.place_new_device(&mut device, &mut placed);
            debug!(ip = %device.ip, "Placed new device");
            placed.push(device);
        }

        self.snapshots += 1;
        if self.snapshots % self.every == 0 {
            self.resolver.resolve_all(&mut placed);
        }

        for device in &placed {
            if let Some(position) = device.position {
                self.positions.insert(device.ip.clone(), position);
            }
        }
        for device in devices.iter_mut() {
            device.position = self.positions.get(&device.ip).copied();
        }
    }
}

/// Queue shared between the engine and its pump task.
#[derive(Default)]
struct Outbox {
    messages: Mutex<Vec<Message>>,
    interfaces_changed: AtomicBool,
    forward_packets: AtomicBool,
}

/// The main NetScope engine.
///
/// Must be created inside a Tokio runtime; the pump task and capture
/// subprocesses run on it.
pub struct NetScopeEngine {
    supervisor: CaptureSupervisor,
    store: Arc<NetworkStateStore>,
    layout: Mutex<LayoutState>,
    outbox: Arc<Outbox>,
    pump: JoinHandle<()>,
    default_filter: Option<String>,
}

impl NetScopeEngine {
    /// Create an engine that captures with the configured tool.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_launcher(config, config.launcher())
    }

    /// Create an engine with a custom capture launcher.
    pub fn with_launcher(config: &Config, launcher: impl CaptureLauncher + 'static) -> Result<Self> {
        let resolver = LayoutResolver::new(config.layout.clone());
        Self::build(config, launcher, resolver)
    }

    /// Like [`with_launcher`](Self::with_launcher) with reproducible placement.
    pub fn with_seed(config: &Config, launcher: impl CaptureLauncher + 'static, seed: u64) -> Result<Self> {
        let resolver = LayoutResolver::with_seed(config.layout.clone(), seed);
        Self::build(config, launcher, resolver)
    }

    fn build(config: &Config, launcher: impl CaptureLauncher + 'static, resolver: LayoutResolver) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("Engine requires a Tokio runtime: {}", e)))?;

        let (supervisor, events) = CaptureSupervisor::new(launcher);
        let store = Arc::new(NetworkStateStore::new(config.device_ttl(), config.connection_ttl()));
        let outbox = Arc::new(Outbox::default());
        let pump = runtime.spawn(pump_events(events, store.clone(), outbox.clone()));

        Ok(Self {
            supervisor,
            store,
            layout: Mutex::new(LayoutState::new(resolver, config.layout_every)),
            outbox,
            pump,
            default_filter: config.default_filter.clone(),
        })
    }

    // =========================================================================
    // Capture control
    // =========================================================================

    /// Start capturing on `interfaces`. Falls back to the configured default
    /// filter when `filter` is `None`.
    pub fn start<I, S>(&self, interfaces: I, filter: Option<&str>) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let filter = filter.or(self.default_filter.as_deref());
        self.supervisor.start_interfaces(interfaces, filter)?;
        self.outbox.interfaces_changed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop one interface. Returns `false` if it was not capturing.
    pub fn stop(&self, interface: &str) -> bool {
        let stopped = self.supervisor.stop_interface(interface);
        if stopped {
            self.outbox.interfaces_changed.store(true, Ordering::SeqCst);
        }
        stopped
    }

    pub fn stop_all(&self) {
        self.supervisor.stop_all();
        self.outbox.interfaces_changed.store(true, Ordering::SeqCst);
    }

    pub fn status(&self) -> CaptureStatus {
        self.supervisor.status()
    }

    // =========================================================================
    // State access
    // =========================================================================

    /// Active devices and connections, with layout positions applied.
    pub fn snapshot(&self) -> StateSnapshot {
        self.snapshot_at(now_millis())
    }

    pub fn snapshot_at(&self, now: u64) -> StateSnapshot {
        let mut snapshot = self.store.snapshot_at(now);
        self.layout.lock().apply(&mut snapshot.devices);
        snapshot
    }

    /// Drop all devices, connections and remembered positions.
    pub fn clear(&self) {
        self.store.clear();
        self.layout.lock().positions.clear();
        info!("Cleared network state");
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Shared handle to the underlying store.
    pub fn store(&self) -> Arc<NetworkStateStore> {
        self.store.clone()
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Also queue every classified packet as a message. Off by default.
    pub fn set_packet_forwarding(&self, enabled: bool) {
        self.outbox.forward_packets.store(enabled, Ordering::SeqCst);
    }

    /// Get and clear pending messages. An interface list is appended when the
    /// set of running captures changed since the last call.
    pub fn take_messages(&self) -> Vec<Message> {
        let mut messages = std::mem::take(&mut *self.outbox.messages.lock());
        if self.outbox.interfaces_changed.swap(false, Ordering::SeqCst) {
            messages.push(Message::Interfaces(self.supervisor.status().per_interface));
        }
        messages
    }

    /// Whether [`take_messages`](Self::take_messages) would return anything.
    pub fn has_pending_messages(&self) -> bool {
        self.outbox.interfaces_changed.load(Ordering::SeqCst) || !self.outbox.messages.lock().is_empty()
    }
}

impl Drop for NetScopeEngine {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Drain capture events into the store until the supervisor goes away.
async fn pump_events(
    mut events: mpsc::UnboundedReceiver<CaptureEvent>,
    store: Arc<NetworkStateStore>,
    outbox: Arc<Outbox>,
) {
    while let Some(event) = events.recv().await {
        match &event {
            CaptureEvent::Packet { packet, .. } => {
                store.ingest(packet);
                if !outbox.forward_packets.load(Ordering::Relaxed) {
                    continue;
                }
            }
            CaptureEvent::Error { interface, message } => {
                warn!(interface = %interface, error = %message, "Capture failed");
                outbox.interfaces_changed.store(true, Ordering::SeqCst);
            }
            CaptureEvent::Exited { interface, code } => {
                info!(interface = %interface, code = ?code, "Capture exited");
                outbox.interfaces_changed.store(true, Ordering::SeqCst);
            }
        }
        if let Some(message) = Message::from_event(&event) {
            outbox.messages.lock().push(message);
        }
    }
    debug!("Capture event channel closed");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::process::Command;

    /// Prints the given lines as the "capture tool" output, then idles.
    struct ReplayLauncher {
        lines: Vec<String>,
    }

    impl CaptureLauncher for ReplayLauncher {
        fn command(&self, _interface: &str, _filter: Option<&str>) -> Command {
            let mut script = String::new();
            for line in &self.lines {
                script.push_str(&format!("printf '%s\\n' '{}'\n", line));
            }
            script.push_str("sleep 30\n");
            let mut command = Command::new("sh");
            command.arg("-c").arg(script);
            command
        }

        fn program(&self) -> String {
            "sh".to_string()
        }
    }

    struct FailingLauncher;

    impl CaptureLauncher for FailingLauncher {
        fn command(&self, _interface: &str, _filter: Option<&str>) -> Command {
            let mut command = Command::new("sh");
            command.arg("-c").arg("echo 'capture: eth9: No such device exists' >&2; exit 1");
            command
        }

        fn program(&self) -> String {
            "sh".to_string()
        }
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_packets_reach_the_store() {
        let launcher = ReplayLauncher {
            lines: vec![
                "12:00:00.000001 IP 192.168.1.10.51000 > 93.184.216.34.443: Flags [S], seq 1, length 0".to_string(),
                "12:00:00.000002 IP 192.168.1.10.51000 > 93.184.216.34.443: Flags [.], ack 1, length 200".to_string(),
                "garbage line".to_string(),
            ],
        };
        let engine = NetScopeEngine::with_seed(&Config::default(), launcher, 1).unwrap();
        engine.start(["eth0"], None).unwrap();

        wait_for(|| {
            engine.stats().packets == 2
                && engine
                    .status()
                    .interface("eth0")
                    .map_or(false, |i| i.rejected_count == 1)
        })
        .await;

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.devices.len(), 2);
        assert_eq!(snapshot.connections.len(), 1);
        assert_eq!(snapshot.connections[0].traffic, 200);
        assert!(snapshot.devices.iter().all(|d| d.position.is_some()));

        engine.stop_all();
    }

    #[tokio::test]
    async fn test_positions_are_stable_between_snapshots() {
        let engine = NetScopeEngine::with_seed(&Config::default(), ReplayLauncher { lines: vec![] }, 3).unwrap();
        let store = engine.store();
        store.ingest(&crate::domain::Packet::new(
            1_000,
            "10.0.0.2",
            1234,
            "10.0.0.3",
            80,
            crate::domain::Protocol::Tcp,
            60,
        ));

        let first = engine.snapshot_at(1_000);
        let second = engine.snapshot_at(1_000);
        assert_eq!(first.devices, second.devices);

        engine.clear();
        assert!(engine.snapshot_at(1_000).devices.is_empty());
    }

    #[tokio::test]
    async fn test_errors_become_messages() {
        let engine = NetScopeEngine::with_launcher(&Config::default(), FailingLauncher).unwrap();
        engine.start(["eth9"], None).unwrap();

        // first poll carries the interface list from start()
        let messages = engine.take_messages();
        assert!(messages.iter().any(|m| matches!(m, Message::Interfaces(_))));

        let mut collected = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                collected.extend(engine.take_messages());
                let errored = collected.iter().any(|m| matches!(m, Message::Error { .. }));
                let emptied = collected
                    .iter()
                    .any(|m| matches!(m, Message::Interfaces(list) if list.is_empty()));
                if errored && emptied {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("error not reported in time");

        let (interface, message) = collected
            .iter()
            .find_map(|m| match m {
                Message::Error { interface, message } => Some((interface.as_str(), message.as_str())),
                _ => None,
            })
            .unwrap();
        assert_eq!(interface, "eth9");
        assert!(message.contains("No such device"));
        assert!(!engine.status().active);
    }

    #[tokio::test]
    async fn test_packet_forwarding() {
        let line = "12:00:00.000001 IP 10.0.0.5.40000 > 10.0.0.1.53: 7+ A? example.com. (29)";
        let engine = NetScopeEngine::with_launcher(
            &Config::default(),
            ReplayLauncher { lines: vec![line.to_string(), line.to_string()] },
        )
        .unwrap();
        assert!(!engine.has_pending_messages());

        engine.set_packet_forwarding(true);
        engine.start(["eth0"], None).unwrap();
        assert!(engine.has_pending_messages());

        let mut packets = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), async {
            while packets.len() < 2 {
                packets.extend(engine.take_messages().into_iter().filter_map(|m| match m {
                    Message::Packet(packet) => Some(packet),
                    _ => None,
                }));
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("packets not forwarded in time");

        assert_eq!(packets[0].dst_port, 53);
        assert_eq!(packets[0].interface.as_deref(), Some("eth0"));
        assert!(!engine.has_pending_messages());
        assert_eq!(engine.stats().packets, 2);

        engine.stop_all();
    }

    #[tokio::test]
    async fn test_packets_are_not_forwarded_by_default() {
        let line = "12:00:00.000001 IP 10.0.0.5.40000 > 10.0.0.1.53: 7+ A? example.com. (29)";
        let engine = NetScopeEngine::with_launcher(
            &Config::default(),
            ReplayLauncher { lines: vec![line.to_string()] },
        )
        .unwrap();
        engine.start(["eth0"], None).unwrap();
        wait_for(|| engine.stats().packets == 1).await;

        let messages = engine.take_messages();
        assert!(messages.iter().all(|m| !matches!(m, Message::Packet(_))));
        assert!(!engine.has_pending_messages());

        engine.stop_all();
    }

    #[tokio::test]
    async fn test_default_filter_is_used() {
        let config = Config {
            default_filter: Some("udp".to_string()),
            ..Config::default()
        };
        let engine = NetScopeEngine::with_launcher(&config, ReplayLauncher { lines: vec![] }).unwrap();
        engine.start(["eth0"], None).unwrap();
        assert_eq!(engine.status().interface("eth0").unwrap().filter.as_deref(), Some("udp"));

        assert!(engine.stop("eth0"));
        assert!(!engine.stop("eth0"));
    }

    #[test]
    fn test_requires_runtime() {
        let result = NetScopeEngine::with_launcher(&Config::default(), ReplayLauncher { lines: vec![] });
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
