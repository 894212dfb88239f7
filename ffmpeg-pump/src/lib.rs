//! Moves video between FFmpeg sources and sinks on a dedicated worker thread.
//!
//! Two directions share one controller: ingest decodes a camera, network stream or
//! file into RGB24 frames held in a latest-frame buffer, and egress stream-copies a
//! source to an RTSP or RTMP endpoint in real time, optionally on a loop.

/// Registers FFmpeg components (formats, devices, network). Call once at startup
/// before opening any session.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

pub mod bitrate;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod device;
pub mod error;
pub mod event;
pub mod frame;
pub mod input;
pub mod locator;
pub mod output;
pub mod packet;
pub mod scaler;
pub mod session;
pub mod stream;
pub mod timing;
mod worker;

#[cfg(test)]
mod test_support;

pub use config::PumpConfig;
pub use controller::{IngestPump, PumpController, PumpState, PumpStats, Repeater};
pub use error::{OpenError, PumpError, ReadError, ValidationError, WriteError};
pub use event::PumpEvent;
pub use frame::{DecodedFrame, FrameBuffer};
pub use locator::{ConnectionType, Locator, Protocol, SinkTarget};
pub use session::{CodecSession, EgressSession, IngestSession, UnitSink};
pub use stream::StreamSession;
