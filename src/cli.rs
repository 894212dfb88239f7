use std::ffi::OsString;

use clap::{Arg, ArgAction, Command};
use ffmpeg_pump::Protocol;

/// Parsed repeater command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeaterArgs {
    pub protocol: Protocol,
    pub file: String,
    pub url: String,
    pub loop_replay: bool,
}

fn parse_protocol(value: &str) -> Result<Protocol, String> {
    value.parse::<Protocol>().map_err(|e| e.to_string())
}

pub fn command() -> Command {
    Command::new("mediakit")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Stream a video file to an RTSP or RTMP endpoint in real time")
        .after_help(
            "Examples:\n  \
             mediakit -p rtsp -f video.mp4 -u rtsp://localhost:8554/stream\n  \
             mediakit -p rtmp -f video.mp4 -u rtmp://localhost:1935/live/stream\n  \
             mediakit --protocol rtsp --file test.mp4 --url rtsp://0.0.0.0:8554/test --no-loop",
        )
        .disable_version_flag(true)
        .arg(
            Arg::new("protocol")
                .short('p')
                .long("protocol")
                .value_name("rtsp|rtmp")
                .help("Protocol to use")
                .required(true)
                .value_parser(parse_protocol),
        )
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("PATH")
                .help("Video file to stream")
                .required(true),
        )
        .arg(
            Arg::new("url")
                .short('u')
                .long("url")
                .value_name("URL")
                .help("Stream URL")
                .required(true),
        )
        .arg(
            Arg::new("loop")
                .short('l')
                .long("loop")
                .help("Enable loop playback (default)")
                .action(ArgAction::SetTrue)
                .overrides_with("no-loop"),
        )
        .arg(
            Arg::new("no-loop")
                .short('n')
                .long("no-loop")
                .help("Disable loop playback")
                .action(ArgAction::SetTrue)
                .overrides_with("loop"),
        )
        .arg(
            Arg::new("version")
                .short('v')
                .long("version")
                .help("Show version information")
                .action(ArgAction::Version),
        )
}

/// Parses `args` (program name first). Help and version requests come back as
/// errors of kind `DisplayHelp` and `DisplayVersion`.
pub fn parse_from<I, T>(args: I) -> Result<RepeaterArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = command().try_get_matches_from(args)?;
    let required = |id: &str| {
        matches
            .get_one::<String>(id)
            .cloned()
            .unwrap_or_default()
    };

    Ok(RepeaterArgs {
        protocol: matches
            .get_one::<Protocol>("protocol")
            .copied()
            .unwrap_or(Protocol::Rtsp),
        file: required("file"),
        url: required("url"),
        // the later of --loop and --no-loop overrides the other
        loop_replay: !matches.get_flag("no-loop"),
    })
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod cli_test;
