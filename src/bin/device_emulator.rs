// src/bin/device_emulator.rs
//! Stand-in for the sensor firmware: serves generated vitals over WebSocket.
//!
//! Run with: cargo run --bin device_emulator -- --bind 127.0.0.1:8081

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use pulselink::device::emulator::DeviceEmulator;

#[derive(Parser)]
#[command(name = "device_emulator", about = "Serve emulated heart-rate frames over WebSocket")]
struct Cli {
    /// Address:port to listen on
    #[arg(long, default_value = "127.0.0.1:81")]
    bind: SocketAddr,

    /// Frames per pass
    #[arg(long, default_value_t = 120)]
    count: usize,

    /// Milliseconds between frames
    #[arg(long, default_value_t = 500)]
    cadence_ms: u64,

    /// Loop over the frames forever instead of stopping after one pass
    #[arg(long)]
    repeat: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let handle = DeviceEmulator::generated(cli.count)?
        .with_cadence(Duration::from_millis(cli.cadence_ms))
        .repeating(cli.repeat)
        .closing_when_done(!cli.repeat)
        .serve(cli.bind)?;

    println!("Emulated device at ws://{}/ (Ctrl+C to stop)", handle.local_addr());
    tokio::signal::ctrl_c().await?;
    handle.shutdown();
    Ok(())
}
