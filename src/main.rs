use std::time::Duration;

use anyhow::Context;
use clap::error::ErrorKind;
use ffmpeg_pump::{Locator, PumpConfig, PumpStats, Repeater, SinkTarget};

mod cli;

use cli::RepeaterArgs;

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("ffmpeg_pump", log::LevelFilter::Info)
        .init();
}

#[tokio::main]
async fn main() -> ! {
    let args = match cli::parse_from(std::env::args_os()) {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    };

    init_logging();
    ffmpeg_pump::init().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    println!("========================================");
    println!("MediaKit v{}", env!("CARGO_PKG_VERSION"));
    println!("========================================");
    println!("Protocol: {}", args.protocol);
    println!("Video file: {}", args.file);
    println!("Stream URL: {}", args.url);
    println!(
        "Loop mode: {}",
        if args.loop_replay { "enabled" } else { "disabled" }
    );

    match run(args).await {
        Ok(stats) => {
            println!("Final statistics: {}", stats);
            println!("MediaKit stopped.");
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(args: RepeaterArgs) -> anyhow::Result<PumpStats> {
    let target = SinkTarget::new(args.protocol, &args.url)?;
    let locator = Locator::file(&args.file)?;
    let config = PumpConfig::default().with_loop_replay(args.loop_replay);

    let repeater = Repeater::repeater(target, config);
    repeater
        .start(&locator)
        .context("failed to start stream")?;
    println!("Streaming started. Press Ctrl+C to stop.");

    wait_for_shutdown(&repeater).await;

    println!("Stopping stream...");
    tokio::task::block_in_place(|| repeater.stop());
    Ok(repeater.stats())
}

/// Returns on SIGINT, SIGTERM or once the repeater stopped by itself.
async fn wait_for_shutdown(repeater: &Repeater) {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let terminate = terminate();
    tokio::pin!(terminate);
    let mut tick = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!("Received SIGINT, shutting down...");
                return;
            },
            _ = &mut terminate => {
                println!("Received SIGTERM, shutting down...");
                return;
            },
            _ = tick.tick() => {
                if !repeater.is_running() {
                    log::info!("repeater stopped by itself");
                    return;
                }
            },
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            log::warn!("cannot listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
