//! Classify command - run the line classifier over stdin.

use anyhow::Result;
use netscope_core::{classify, Message};
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(interface: Option<String>, json: bool) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut accepted = 0u64;
    let mut rejected = 0u64;

    while let Some(line) = lines.next_line().await? {
        match classify(&line, interface.as_deref()) {
            Some(packet) => {
                accepted += 1;
                if json {
                    println!("{}", Message::Packet(packet).to_json()?);
                } else {
                    println!(
                        "{:<6} {:>15}:{:<5} -> {:>15}:{:<5} {:>6} B",
                        packet.protocol.as_str(),
                        packet.src_ip,
                        packet.src_port,
                        packet.dst_ip,
                        packet.dst_port,
                        packet.size
                    );
                }
            }
            None => {
                rejected += 1;
                tracing::debug!(line = %line, "Rejected line");
            }
        }
    }

    eprintln!("{} packets, {} rejected lines", accepted, rejected);
    Ok(())
}
