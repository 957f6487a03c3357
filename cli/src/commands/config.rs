//! Config command - show current configuration.

use anyhow::Result;
use netscope_core::ConfigStore;

pub async fn show(json: bool) -> Result<()> {
    let store = ConfigStore::new()?;
    let config = store.load().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("Config file: {}", store.path().display());
    println!();
    println!("Capture program:   {}", config.capture_program);
    println!("Capture args:      {}", config.capture_args.join(" "));
    println!(
        "Default filter:    {}",
        config.default_filter.as_deref().unwrap_or("(none)")
    );
    println!("Device TTL:        {}s", config.device_ttl().as_secs());
    println!("Connection TTL:    {}s", config.connection_ttl().as_secs());
    println!("Layout every:      {} snapshots", config.layout_every);
    println!(
        "Canvas:            {}x{} (padding {})",
        config.layout.width, config.layout.height, config.layout.padding
    );

    Ok(())
}
