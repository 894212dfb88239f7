//! Headless ingest client: connects to a camera, stream or file, logs what the pump
//! reports every second and optionally saves a snapshot before disconnecting.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Arg, ArgAction, Command};
use ffmpeg_pump::{ConnectionType, IngestPump, PumpConfig, PumpEvent, device};
use futures::StreamExt;

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("ffmpeg_pump", log::LevelFilter::Debug)
        .init();
}

fn parse_connection_type(value: &str) -> Result<ConnectionType, String> {
    value.parse::<ConnectionType>().map_err(|e| e.to_string())
}

fn command() -> Command {
    Command::new("viewer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Decode a camera, network stream or file and report its progress")
        .arg(
            Arg::new("type")
                .short('t')
                .long("type")
                .value_name("CONNECTION")
                .help("network-camera, local-camera or uvc-camera")
                .default_value("network-camera")
                .value_parser(parse_connection_type),
        )
        .arg(
            Arg::new("address")
                .value_name("ADDRESS")
                .help("Stream URL, or camera name / device node for local cameras")
                .required_unless_present("list-cameras"),
        )
        .arg(
            Arg::new("list-cameras")
                .long("list-cameras")
                .help("Print the attached cameras and capture formats, then exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("snapshot")
                .short('s')
                .long("snapshot")
                .value_name("PATH")
                .help("Save the latest frame as JPEG before disconnecting")
                .num_args(0..=1)
                .default_missing_value(""),
        )
        .arg(
            Arg::new("duration")
                .short('d')
                .long("duration")
                .value_name("SECONDS")
                .help("Disconnect after this many seconds")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn print_devices() {
    let cameras = device::list_cameras();
    if cameras.is_empty() {
        println!("no camera detected");
    }
    for camera in cameras.iter() {
        println!("{}", camera);
    }
    println!("capture formats:");
    for format in device::input_video_formats() {
        println!("  {}", format);
    }
}

async fn until(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending::<()>().await,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = command().get_matches();
    init_logging();
    ffmpeg_pump::init()?;

    if matches.get_flag("list-cameras") {
        print_devices();
        return Ok(());
    }

    let kind = matches
        .get_one::<ConnectionType>("type")
        .copied()
        .unwrap_or(ConnectionType::NetworkCamera);
    let address = matches
        .get_one::<String>("address")
        .cloned()
        .unwrap_or_default();
    let snapshot = matches
        .get_one::<String>("snapshot")
        .map(|path| (!path.is_empty()).then(|| PathBuf::from(path)));
    let duration = matches
        .get_one::<u64>("duration")
        .map(|secs| Duration::from_secs(*secs));

    let pump = IngestPump::decoder(PumpConfig::default());
    let mut events = pump.events();
    tokio::task::block_in_place(|| pump.connect(kind, &address))?;

    let deadline = until(duration);
    tokio::pin!(deadline);
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupted");
                break;
            },
            _ = &mut deadline => break,
            event = events.next() => match event {
                Some(PumpEvent::StreamClosed) | None => {
                    log::info!("stream closed");
                    break;
                }
                Some(PumpEvent::Error(message)) => log::error!("{}", message),
                Some(event @ PumpEvent::StreamOpened { .. }) => log::info!("{}", event),
                Some(event) => log::trace!("{}", event),
            },
            _ = tick.tick() => {
                let (width, height) = pump.dimensions();
                log::info!(
                    "{} {}x{} @ {:.2} fps, {} kbit/s, {}",
                    pump.elapsed(),
                    width,
                    height,
                    pump.frame_rate(),
                    pump.bitrate() / 1000,
                    pump.stats()
                );
            },
        }
    }

    if let Some(path) = snapshot {
        if pump.is_running() {
            match pump.snapshot(path.as_deref()) {
                Ok(path) => println!("snapshot saved to {}", path.display()),
                Err(e) => log::error!("snapshot failed: {:#}", e),
            }
        } else {
            println!("stream is no longer playing, no snapshot taken");
        }
    }
    tokio::task::block_in_place(|| pump.stop());
    println!("{}", pump.stats());
    Ok(())
}
