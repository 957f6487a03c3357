//! NetScope CLI - live network capture and device graph inspection
//!
//! A command-line tool for listing capture interfaces, running captures
//! and debugging the capture line classifier.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "netscope")]
#[command(author, version, about = "Live network capture and device graph inspection")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List interfaces the capture tool can open
    #[command(alias = "ifaces")]
    Interfaces,

    /// Capture on one or more interfaces and print the device graph
    Capture {
        /// Interface to capture on (repeatable)
        #[arg(short, long = "interface", required = true)]
        interfaces: Vec<String>,

        /// Capture filter expression passed to the capture tool
        #[arg(short, long)]
        filter: Option<String>,

        /// Seconds between snapshots
        #[arg(long, default_value = "2")]
        interval: u64,

        /// Also stream every classified packet (with --json)
        #[arg(long)]
        packets: bool,
    },

    /// Classify capture lines read from stdin
    Classify {
        /// Interface name to tag packets with
        #[arg(short, long)]
        interface: Option<String>,
    },

    /// Show current configuration
    Config,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "netscope=debug,netscope_core=debug"
    } else {
        "netscope=info,netscope_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Logs go to stderr so JSON on stdout stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Interfaces => {
            commands::interfaces::run(cli.json).await?;
        }
        Commands::Capture {
            interfaces,
            filter,
            interval,
            packets,
        } => {
            commands::capture::run(interfaces, filter, interval, packets, cli.json).await?;
        }
        Commands::Classify { interface } => {
            commands::classify::run(interface, cli.json).await?;
        }
        Commands::Config => {
            commands::config::show(cli.json).await?;
        }
    }

    Ok(())
}
