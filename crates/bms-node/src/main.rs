use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bms_node::node::NodeState;
use bms_node::tasks_slow;

#[derive(Parser)]
#[command(name = "bmsd")]
#[command(version, about = "BMS telemetry node daemon", long_about = None)]
struct Cli {
    /// Data directory holding config.json and the flag store
    #[arg(long, default_value = "./bms-data", env = "BMSD_DATA_DIR")]
    data_dir: PathBuf,

    /// HTTP listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "BMSD_HTTP_ADDR")]
    http_addr: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node (default)
    Start,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => start_node(cli.data_dir, cli.http_addr),
    }
}

fn start_node(data_dir: PathBuf, http_addr: String) -> Result<()> {
    info!(data_dir = %data_dir.display(), %http_addr, "bmsd starting");

    // The flag store and the watchdog come up before any task; the rest
    // of the bring-up belongs to the state machine's INIT path.
    let state = NodeState::new(data_dir, http_addr)?;

    let slow_core = tasks_slow::slow_core_task_create(state)?;
    info!("application started");

    // The slow core runs the state machine until a restart is requested.
    let _ = slow_core.join();
    Ok(())
}
