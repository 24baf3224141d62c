//! Diretta Renderer daemon
//!
//! Binds the transmit socket, starts the cadence engine and the
//! diagnostics server, then drops privileges and waits for shutdown.

use anyhow::{bail, Result};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use diretta_renderer::{
    config::RendererConfig,
    constants::{DEFAULT_TARGET_PORT, MIN_RECOMMENDED_BUFFER_SECONDS},
    diag::DiagServer,
    privilege, DirettaRenderer,
};

const USAGE: &str = "Diretta UPnP Renderer

Usage: renderer [options]

Options:
  --name, -n <name>     Renderer name (default: Diretta Renderer)
  --buffer, -b <secs>   Buffer size in seconds, fractions allowed (default: 10)
  --cycle <us>          Transmit cycle time in microseconds [333, 10000]
  --packet <bytes>      Packet size handed to the sink per cycle
  --target, -t <addr>   Diretta target address (host:port, port optional)
  --user, -u <user>     Drop privileges to this user after startup
  --diag-port <port>    Diagnostics HTTP port (default: 8389)
  --no-diag             Disable the diagnostics server
  --help, -h            Show this help";

fn parse_arguments() -> Result<RendererConfig> {
    let mut config = RendererConfig::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next().ok_or_else(|| anyhow::anyhow!("{name} requires a value"))
        };

        match arg.as_str() {
            "--name" | "-n" => config.name = value("--name")?,
            "--buffer" | "-b" => {
                config.buffer_seconds = value("--buffer")?.parse()?;
                if config.buffer_seconds < MIN_RECOMMENDED_BUFFER_SECONDS {
                    eprintln!(
                        "Warning: buffer < {MIN_RECOMMENDED_BUFFER_SECONDS} seconds may cause issues with DSD/Hi-Res!"
                    );
                }
            }
            "--cycle" => config.cycle_time_us = value("--cycle")?.parse()?,
            "--packet" => config.packet_bytes = value("--packet")?.parse()?,
            "--target" | "-t" => {
                let raw = value("--target")?;
                let addr = if raw.contains(':') {
                    raw.parse()?
                } else {
                    format!("{raw}:{DEFAULT_TARGET_PORT}").parse()?
                };
                config.target = Some(addr);
            }
            "--user" | "-u" => config.runtime_user = Some(value("--user")?),
            "--diag-port" => config.diag.http_port = value("--diag-port")?.parse()?,
            "--no-diag" => config.diag.enabled = false,
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => {
                bail!("Unknown option: {other}\nUse --help for usage information");
            }
        }
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = parse_arguments()?;

    println!("=== Diretta Renderer ===");
    println!("Configuration:");
    println!("  Name:    {}", config.name);
    println!("  Buffer:  {} seconds", config.buffer_seconds);
    println!("  Cycle:   {} us", config.cycle_time_us);
    println!("  Packet:  {} bytes", config.packet_bytes);
    match config.target {
        Some(addr) => println!("  Target:  {addr}"),
        None => println!("  Target:  none (packets discarded)"),
    }
    println!();

    let mut renderer = DirettaRenderer::new(config.clone())?;

    tracing::info!("starting renderer");
    renderer.start()?;

    // Sockets are bound; root is no longer needed
    if let Some(user) = &config.runtime_user {
        privilege::drop_privileges(user)?;
    }

    let _diag_handle = DiagServer::new(
        config.diag.clone(),
        config.name.clone(),
        renderer.stats(),
        renderer.ring(),
    )
    .start_background();

    tracing::info!("renderer running, press Ctrl+C to stop");

    let stats = renderer.stats();
    let mut stats_interval = tokio::time::interval(Duration::from_secs(5));
    stats_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
            _ = stats_interval.tick() => {
                let snap = stats.snapshot();
                tracing::info!(
                    "stats: state={:?} packets={} silence={} underruns={} pushed={} popped={}",
                    snap.state,
                    snap.packets_sent,
                    snap.silence_packets,
                    snap.underruns,
                    snap.bytes_pushed,
                    snap.bytes_popped,
                );
            }
        }
    }

    renderer.stop();
    tracing::info!("renderer stopped");

    Ok(())
}
