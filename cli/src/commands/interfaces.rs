//! Interfaces command - list capture-capable interfaces.

use anyhow::Result;
use netscope_core::capture::list_interfaces;
use netscope_core::ConfigStore;

use super::truncate;

pub async fn run(json: bool) -> Result<()> {
    let config = ConfigStore::new()?.load().await?;
    let interfaces = list_interfaces(&config.capture_program).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&interfaces)?);
        return Ok(());
    }

    if interfaces.is_empty() {
        println!("No capture interfaces found.");
        return Ok(());
    }

    println!("{:<4} {:<16} {:<8} DESCRIPTION", "#", "NAME", "STATE");
    println!("{}", "-".repeat(70));

    for iface in &interfaces {
        let state = if iface.is_loopback() {
            "loop"
        } else if iface.is_up() {
            "up"
        } else {
            "down"
        };
        println!(
            "{:<4} {:<16} {:<8} {}",
            iface.index,
            truncate(&iface.name, 16),
            state,
            iface.description.as_deref().unwrap_or("-")
        );
    }

    println!("\nTotal: {} interfaces", interfaces.len());
    Ok(())
}
