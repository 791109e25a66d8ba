// src/bin/pulse_monitor.rs
//! Terminal dashboard for a heart-rate / SpO2 sensor.
//!
//! Connects to the device's WebSocket, prints the live vitals and the recent
//! readings table once a second, and forwards every reading to the store.
//!
//! Run with: cargo run --bin pulse_monitor -- --device 192.168.1.100 --user-id u1 --token <jwt>

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use pulselink::dashboard::display::{connection_label, finger_status, format_bpm, format_percent};
use pulselink::persistence::MemoryStore;
use pulselink::{
    Credential, Dashboard, DashboardConfig, HttpReadingStore, ReadingStore, StaticSession, UserIdentity,
    WsConnector,
};

#[derive(Parser)]
#[command(name = "pulse_monitor", about = "Live heart-rate and SpO2 monitor")]
struct Cli {
    /// Device IP, host:port or ws:// URL
    #[arg(long)]
    device: Option<String>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured reading store endpoint
    #[arg(long)]
    store_url: Option<String>,

    /// Keep readings in memory instead of writing them to the store
    #[arg(long)]
    no_store: bool,

    #[arg(long, default_value = "local-user")]
    user_id: String,

    #[arg(long)]
    name: Option<String>,

    /// Bearer token for the reading store
    #[arg(long, default_value = "")]
    token: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DashboardConfig::from_json_file(path)?,
        None => DashboardConfig::default(),
    };
    if let Some(url) = cli.store_url {
        config.store_url = url;
    }

    let store: Arc<dyn ReadingStore> = if cli.no_store {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(HttpReadingStore::new(config.store_url.clone()).context("Failed to build store client")?)
    };

    let mut user = UserIdentity::new(cli.user_id);
    if let Some(name) = cli.name {
        user = user.with_name(name);
    }
    if cli.token.is_empty() && !cli.no_store {
        log::warn!("No bearer token given; store writes will be rejected");
    }
    let session = Arc::new(StaticSession::signed_in(user.clone(), Credential::bearer(cli.token)));

    let dashboard = Dashboard::new(config, Arc::new(WsConnector), store, session)?;
    dashboard.set_address(cli.device);

    println!("Welcome back, {}", user.display_name());
    if let Err(e) = dashboard.connect() {
        if let Some(message) = dashboard.error_message() {
            eprintln!("{}", message);
        }
        return Err(e.into());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => render(&dashboard),
        }
    }

    println!("Shutting down...");
    dashboard.settle_writes().await;
    dashboard.disconnect();
    Ok(())
}

fn render(dashboard: &Dashboard) {
    println!();
    println!("== {} ==", connection_label(dashboard.state()));
    if let Some(message) = dashboard.error_message() {
        println!("{}", message);
    }

    match dashboard.live_vitals() {
        Some(vitals) => {
            println!("{}", finger_status(vitals.finger_detected));
            println!(
                "Heart Rate {:>10} | Average HR {:>10} | SpO2 {:>6}",
                format_bpm(vitals.heart_rate),
                format_bpm(vitals.avg_heart_rate),
                format_percent(vitals.spo2)
            );
        }
        None => println!(
            "Heart Rate {:>10} | Average HR {:>10} | SpO2 {:>6}",
            format_bpm(0.0),
            format_bpm(0.0),
            format_percent(0.0)
        ),
    }

    let rows = dashboard.recent_rows();
    if rows.is_empty() {
        println!("No readings available yet");
        return;
    }
    println!("{:<10} {:>10} {:>8} {:>6}", "TIME", "HEART RATE", "AVG HR", "SPO2");
    for row in rows {
        println!(
            "{:<10} {:>10} {:>8} {:>6}",
            row.time, row.heart_rate, row.avg_heart_rate, row.spo2
        );
    }
}
