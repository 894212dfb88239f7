use ffmpeg_next::util::error::EAGAIN;

use crate::{
    error::{OpenError, PumpError},
    frame::DecodedFrame,
    packet::MediaUnit,
    scaler::RgbConverter,
    stream::AvTrack,
};

/// Video decoder feeding an RGB24 converter.
pub struct VideoDecoder {
    inner: ffmpeg_next::codec::decoder::Video,
    converter: RgbConverter,
}

impl VideoDecoder {
    pub fn new(track: &AvTrack) -> Result<Self, OpenError> {
        let codec_id = track.codec_id();
        if ffmpeg_next::decoder::find(codec_id).is_none() {
            return Err(OpenError::UnsupportedCodec(track.codec_name().to_string()));
        }

        let mut decoder_ctx =
            ffmpeg_next::codec::Context::from_parameters(track.parameters().clone())
                .map_err(OpenError::Decoder)?;
        unsafe {
            (*decoder_ctx.as_mut_ptr()).time_base = track.time_base().into();
        }
        let video_decoder = decoder_ctx.decoder().video().map_err(OpenError::Decoder)?;

        if video_decoder.format() == ffmpeg_next::format::Pixel::None
            || video_decoder.width() == 0
            || video_decoder.height() == 0
        {
            return Err(OpenError::MissingParameters);
        }

        let converter = RgbConverter::new(
            video_decoder.format(),
            video_decoder.width(),
            video_decoder.height(),
        )
        .map_err(|e| OpenError::Resource(format!("rgb converter: {}", e)))?;

        Ok(Self {
            inner: video_decoder,
            converter,
        })
    }

    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    pub fn format(&self) -> ffmpeg_next::format::Pixel {
        self.inner.format()
    }

    /// Feeds one unit and returns the newest frame it completed, converted to RGB24.
    ///
    /// Corrupt units are skipped; the decoder resynchronises on the next keyframe.
    pub fn decode(&mut self, unit: &MediaUnit) -> Result<Option<DecodedFrame>, PumpError> {
        match self.inner.send_packet(unit.packet()) {
            Ok(()) => {}
            Err(ffmpeg_next::Error::InvalidData) => {
                log::warn!("skipping undecodable unit ({} bytes)", unit.size());
                return Ok(None);
            }
            // output queue is full; drain it below and drop this unit
            Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => {}
            Err(ffmpeg_next::Error::Eof) => return Ok(None),
            Err(err) => return Err(PumpError::Decode(err.to_string())),
        }

        let mut newest = None;
        loop {
            let mut frame = ffmpeg_next::frame::Video::empty();
            match self.inner.receive_frame(&mut frame) {
                Ok(()) => newest = Some(frame),
                Err(ffmpeg_next::Error::Eof) => break,
                Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => break,
                Err(err) => return Err(PumpError::Decode(err.to_string())),
            }
        }

        match newest {
            Some(frame) => self
                .converter
                .convert(&frame)
                .map(Some)
                .map_err(|e| PumpError::Decode(format!("{:#}", e))),
            None => Ok(None),
        }
    }
}
