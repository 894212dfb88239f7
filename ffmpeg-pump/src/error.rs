//! Error taxonomy for pump sessions and controllers.
//!
//! - [`ValidationError`]: the locator or connection type was rejected before any
//!   resource was touched.
//! - [`OpenError`]: the source or sink could not be opened.
//! - [`ReadError`]: a single read failed; end-of-stream and transport failures are
//!   retried by the worker, anything else is fatal.
//! - [`WriteError`]: the sink refused a unit.
//! - [`PumpError`]: everything a controller or worker can surface.

use thiserror::Error;

use crate::locator::ConnectionType;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty stream address")]
    EmptyLocator,

    #[error("unsupported address {locator:?}: must start with one of {expected}")]
    UnsupportedScheme { locator: String, expected: String },

    #[error("connection type {0} is not supported")]
    UnsupportedConnection(ConnectionType),

    #[error("no camera detected")]
    NoCameraDetected,

    #[error("camera not found: {0}")]
    CameraNotFound(String),

    #[error("unknown protocol {0:?}, expected rtsp or rtmp")]
    UnknownProtocol(String),

    #[error("unknown connection type {0:?}")]
    UnknownConnectionType(String),
}

#[derive(Error, Debug)]
pub enum OpenError {
    #[error("session is already open")]
    AlreadyOpen,

    #[error("failed to open input {locator}: {source}")]
    Input {
        locator: String,
        #[source]
        source: ffmpeg_next::Error,
    },

    #[error("input format not found: {0}")]
    InputFormat(String),

    #[error("no video stream found")]
    NoVideoTrack,

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("missing codec parameters")]
    MissingParameters,

    #[error("failed to open decoder: {0}")]
    Decoder(#[source] ffmpeg_next::Error),

    #[error("failed to open output {url}: {source}")]
    Sink {
        url: String,
        #[source]
        source: ffmpeg_next::Error,
    },

    #[error("failed to allocate {0}")]
    Resource(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("end of stream")]
    EndOfStream,

    #[error("transport error ({code}): {message}")]
    Transport { code: i32, message: String },

    #[error("read failed: {0}")]
    Fatal(String),
}

impl From<ffmpeg_next::Error> for ReadError {
    fn from(err: ffmpeg_next::Error) -> Self {
        match err {
            ffmpeg_next::Error::Eof => ReadError::EndOfStream,
            ffmpeg_next::Error::Other { errno } if errno == ffmpeg_next::util::error::ENOMEM => {
                ReadError::Fatal(err.to_string())
            }
            other => ReadError::Transport {
                code: i32::from(other),
                message: other.to_string(),
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("sink is not open")]
    NotOpen,

    #[error("failed to write to {url}: {source}")]
    Sink {
        url: String,
        #[source]
        source: ffmpeg_next::Error,
    },
}

#[derive(Error, Debug)]
pub enum PumpError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("pump is already running")]
    AlreadyRunning,

    #[error("session is not open")]
    NotOpen,

    #[error("stream ended or connection lost")]
    StreamEnded,

    #[error("read frame error: {0}")]
    ReadFailed(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("failed to spawn pump worker: {0}")]
    Spawn(#[from] std::io::Error),
}
