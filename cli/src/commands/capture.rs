//! Capture command - run captures and print the device graph periodically.

use std::time::Duration;

use anyhow::Result;
use chrono::{Local, TimeZone};
use netscope_core::{ConfigStore, Message, NetScopeEngine, StateSnapshot};
use tracing::{debug, info, warn};

use super::{format_bytes, truncate};

/// Clear screen and home the cursor.
const CLEAR: &str = "\x1B[2J\x1B[H";

pub async fn run(
    interfaces: Vec<String>,
    filter: Option<String>,
    interval: u64,
    packets: bool,
    json: bool,
) -> Result<()> {
    let config = ConfigStore::new()?.load().await?;
    let engine = NetScopeEngine::new(&config)?;
    if packets && !json {
        warn!("--packets only applies to --json output");
    }
    engine.set_packet_forwarding(packets && json);

    engine.start(interfaces.iter().cloned(), filter.as_deref())?;
    info!(interfaces = ?interfaces, "Capture started");

    let redraw = !json && atty::is(atty::Stream::Stdout);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping captures");
                break;
            }
            _ = ticker.tick() => {
                if engine.has_pending_messages() {
                    for message in engine.take_messages() {
                        match message {
                            Message::Error { interface, message } => {
                                warn!(interface = %interface, "{}", message);
                            }
                            other if json => println!("{}", other.to_json()?),
                            other => debug!(kind = other.kind(), "Message not shown in table view"),
                        }
                    }
                }

                let snapshot = engine.snapshot();
                if json {
                    println!("{}", Message::State(snapshot).to_json()?);
                } else {
                    if redraw {
                        print!("{}", CLEAR);
                    }
                    print_snapshot(&snapshot, &engine);
                }

                if !engine.status().active {
                    warn!("No interface is capturing any more");
                    break;
                }
            }
        }
    }

    engine.stop_all();
    Ok(())
}

fn print_snapshot(snapshot: &StateSnapshot, engine: &NetScopeEngine) {
    let status = engine.status();
    println!(
        "NetScope | {} | {} packets | {} devices | {} connections",
        status.names().join(", "),
        status.total_packets,
        snapshot.devices.len(),
        snapshot.connections.len()
    );
    println!();

    println!(
        "{:<16} {:<18} {:<8} {:>10} {:>10} {:<9}",
        "IP", "MAC", "TYPE", "IN", "OUT", "SEEN"
    );
    println!("{}", "-".repeat(76));
    for device in &snapshot.devices {
        println!(
            "{:<16} {:<18} {:<8} {:>10} {:>10} {:<9}",
            device.ip,
            device.mac.as_deref().unwrap_or("-"),
            device.device_type.display_name(),
            format_bytes(device.traffic_in),
            format_bytes(device.traffic_out),
            clock_time(device.last_seen)
        );
    }

    println!();
    let mut connections: Vec<_> = snapshot.connections.iter().collect();
    connections.sort_by(|a, b| b.traffic.cmp(&a.traffic));
    println!("{:<44} {:<6} {:>8} {:>10}", "CONNECTION", "PROTO", "PACKETS", "BYTES");
    println!("{}", "-".repeat(76));
    for conn in connections.iter().take(20) {
        let endpoints = format!(
            "{}:{} > {}:{}",
            conn.key.src_ip, conn.key.src_port, conn.key.dst_ip, conn.key.dst_port
        );
        println!(
            "{:<44} {:<6} {:>8} {:>10}",
            truncate(&endpoints, 44),
            conn.key.protocol.as_str(),
            conn.packet_count,
            format_bytes(conn.traffic)
        );
    }
    if connections.len() > 20 {
        println!("... {} more", connections.len() - 20);
    }
}

fn clock_time(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
