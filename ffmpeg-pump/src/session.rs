//! Codec sessions: everything a pump needs to open, read, convert and close.
//!
//! A session is created closed, opened once with a [`Locator`], used from a single
//! thread and closed again. Reopening an open session fails with
//! [`OpenError::AlreadyOpen`]; closing is idempotent.

use crate::{
    decoder::VideoDecoder,
    error::{OpenError, PumpError, ReadError, WriteError},
    frame::DecodedFrame,
    input::AvInput,
    locator::{Locator, SinkTarget},
    output::AvOutput,
    packet::MediaUnit,
    stream::StreamSession,
};

pub trait CodecSession: Send + 'static {
    /// What [`CodecSession::process_unit`] turns a unit of the selected track into.
    type Output: Send;

    fn open(&mut self, locator: &Locator) -> Result<StreamSession, OpenError>;

    fn is_open(&self) -> bool;

    /// The open stream, if any.
    fn stream(&self) -> Option<&StreamSession>;

    fn read_unit(&mut self) -> Result<MediaUnit, ReadError>;

    /// `Ok(None)` means the unit was consumed without producing output yet.
    fn process_unit(&mut self, unit: MediaUnit) -> Result<Option<Self::Output>, PumpError>;

    fn close(&mut self);
}

/// An egress session that can also hand processed units to its sink.
pub trait UnitSink: CodecSession<Output = MediaUnit> {
    /// Writes a processed unit and returns its size in bytes.
    fn write_unit(&mut self, unit: MediaUnit) -> Result<usize, WriteError>;
}

struct IngestState {
    input: AvInput,
    decoder: VideoDecoder,
    stream: StreamSession,
}

/// Demuxes the first video track and decodes it to RGB24 frames.
#[derive(Default)]
pub struct IngestSession {
    state: Option<IngestState>,
}

// FFmpeg contexts are owned by the session and used by one thread at a time.
unsafe impl Send for IngestSession {}

impl IngestSession {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CodecSession for IngestSession {
    type Output = DecodedFrame;

    fn open(&mut self, locator: &Locator) -> Result<StreamSession, OpenError> {
        if self.state.is_some() {
            return Err(OpenError::AlreadyOpen);
        }

        let input = AvInput::open(locator)?;
        let track = input
            .first_video_track()
            .cloned()
            .ok_or(OpenError::NoVideoTrack)?;
        let decoder = VideoDecoder::new(&track)?;

        let mut stream = StreamSession::from_track(&locator.to_string(), &track);
        stream.width = decoder.width();
        stream.height = decoder.height();
        log::info!(
            "ingest opened {} (decoding {:?} to rgb24)",
            stream,
            decoder.format()
        );

        self.state = Some(IngestState {
            input,
            decoder,
            stream: stream.clone(),
        });
        Ok(stream)
    }

    fn is_open(&self) -> bool {
        self.state.is_some()
    }

    fn stream(&self) -> Option<&StreamSession> {
        self.state.as_ref().map(|state| &state.stream)
    }

    fn read_unit(&mut self) -> Result<MediaUnit, ReadError> {
        match self.state.as_mut() {
            Some(state) => state.input.read_unit(),
            None => Err(ReadError::Fatal("session is not open".to_string())),
        }
    }

    fn process_unit(&mut self, unit: MediaUnit) -> Result<Option<DecodedFrame>, PumpError> {
        let state = self.state.as_mut().ok_or(PumpError::NotOpen)?;
        state.decoder.decode(&unit)
    }

    fn close(&mut self) {
        if let Some(state) = self.state.take() {
            log::info!("ingest closed {}", state.stream.locator);
        }
    }
}

struct EgressState {
    input: AvInput,
    output: AvOutput,
    stream: StreamSession,
}

/// Reads a source and stream-copies its first video track to a [`SinkTarget`].
pub struct EgressSession {
    target: SinkTarget,
    state: Option<EgressState>,
}

unsafe impl Send for EgressSession {}

impl EgressSession {
    pub fn new(target: SinkTarget) -> Self {
        Self {
            target,
            state: None,
        }
    }
}

impl CodecSession for EgressSession {
    type Output = MediaUnit;

    fn open(&mut self, locator: &Locator) -> Result<StreamSession, OpenError> {
        if self.state.is_some() {
            return Err(OpenError::AlreadyOpen);
        }

        let input = AvInput::open(locator)?;
        let track = input
            .first_video_track()
            .cloned()
            .ok_or(OpenError::NoVideoTrack)?;
        let output = AvOutput::open(&self.target, &track)?;
        let stream = StreamSession::from_track(&locator.to_string(), &track);
        log::info!("egress opened {} -> {}", stream, self.target);

        self.state = Some(EgressState {
            input,
            output,
            stream: stream.clone(),
        });
        Ok(stream)
    }

    fn is_open(&self) -> bool {
        self.state.is_some()
    }

    fn stream(&self) -> Option<&StreamSession> {
        self.state.as_ref().map(|state| &state.stream)
    }

    fn read_unit(&mut self) -> Result<MediaUnit, ReadError> {
        match self.state.as_mut() {
            Some(state) => state.input.read_unit(),
            None => Err(ReadError::Fatal("session is not open".to_string())),
        }
    }

    /// Repackages the unit for the sink: timestamps move to the output time base and
    /// the unit is pointed at output track 0.
    fn process_unit(&mut self, mut unit: MediaUnit) -> Result<Option<MediaUnit>, PumpError> {
        let state = self.state.as_ref().ok_or(PumpError::NotOpen)?;
        unit.rescale(state.output.time_base());
        unit.retarget(0);
        Ok(Some(unit))
    }

    fn close(&mut self) {
        if let Some(mut state) = self.state.take() {
            if let Err(e) = state.output.finish() {
                log::warn!("egress trailer for {} failed: {}", self.target, e);
            }
            log::info!("egress closed {} -> {}", state.stream.locator, self.target);
        }
    }
}

impl UnitSink for EgressSession {
    fn write_unit(&mut self, unit: MediaUnit) -> Result<usize, WriteError> {
        let state = self.state.as_mut().ok_or(WriteError::NotOpen)?;
        let size = unit.size();
        state.output.write_unit(&unit)?;
        Ok(size)
    }
}

impl Drop for EgressSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
