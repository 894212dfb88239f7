use std::fmt::{Display, Formatter};

use ffmpeg_next::{Rational, codec::Parameters, format::stream};

/// Frame rate assumed when a track does not declare one.
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

// Parameters are cloned out of the demuxer, so the track owns them outright.
unsafe impl Send for AvTrack {}
unsafe impl Sync for AvTrack {}

/// A demuxed track and its codec parameters.
pub struct AvTrack {
    index: usize,
    parameters: Parameters,
    time_base: Rational,
    rate: Rational,
}

impl AvTrack {
    pub fn index(&self) -> usize {
        self.index
    }
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }
    pub fn time_base(&self) -> Rational {
        self.time_base
    }
    pub fn is_video(&self) -> bool {
        self.parameters.medium() == ffmpeg_next::media::Type::Video
    }

    pub fn codec_id(&self) -> ffmpeg_next::codec::Id {
        self.parameters.id()
    }

    pub fn codec_name(&self) -> &'static str {
        self.parameters.id().name()
    }

    pub fn width(&self) -> u32 {
        unsafe {
            let ptr = self.parameters.as_ptr() as *const ffmpeg_next::ffi::AVCodecParameters;
            (*ptr).width.max(0) as u32
        }
    }

    pub fn height(&self) -> u32 {
        unsafe {
            let ptr = self.parameters.as_ptr() as *const ffmpeg_next::ffi::AVCodecParameters;
            (*ptr).height.max(0) as u32
        }
    }

    pub fn frame_rate(&self) -> f64 {
        frame_rate_or_default(self.rate)
    }
}

impl From<stream::Stream<'_>> for AvTrack {
    fn from(stream: stream::Stream<'_>) -> Self {
        Self {
            index: stream.index(),
            parameters: stream.parameters().clone(),
            time_base: stream.time_base(),
            rate: stream.avg_frame_rate(),
        }
    }
}

impl Clone for AvTrack {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            parameters: self.parameters.clone(),
            time_base: self.time_base,
            rate: self.rate,
        }
    }
}

impl Display for AvTrack {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "track #{}: {:?} {} time_base={}/{}",
            self.index,
            self.parameters.medium(),
            self.codec_name(),
            self.time_base.numerator(),
            self.time_base.denominator()
        )?;
        if self.is_video() {
            write!(f, " {}x{} @ {:.2} fps", self.width(), self.height(), self.frame_rate())?;
        }
        Ok(())
    }
}

/// Falls back to [`DEFAULT_FRAME_RATE`] when the rate is undeclared or degenerate.
pub fn frame_rate_or_default(rate: Rational) -> f64 {
    if rate.numerator() <= 0 || rate.denominator() <= 0 {
        return DEFAULT_FRAME_RATE;
    }
    rate.numerator() as f64 / rate.denominator() as f64
}

/// What an open session reports about the track it is pumping.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSession {
    pub locator: String,
    pub track_index: usize,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub time_base: Rational,
    pub codec: String,
}

impl StreamSession {
    pub fn from_track(locator: &str, track: &AvTrack) -> Self {
        Self {
            locator: locator.to_string(),
            track_index: track.index(),
            width: track.width(),
            height: track.height(),
            frame_rate: track.frame_rate(),
            time_base: track.time_base(),
            codec: track.codec_name().to_string(),
        }
    }
}

impl Display for StreamSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{} {}x{} @ {:.2} fps]",
            self.locator, self.codec, self.width, self.height, self.frame_rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_rate_is_used() {
        assert_eq!(frame_rate_or_default(Rational::new(25, 1)), 25.0);
        let ntsc = frame_rate_or_default(Rational::new(30000, 1001));
        assert!((ntsc - 29.97).abs() < 0.01);
    }

    #[test]
    fn undeclared_rate_falls_back() {
        assert_eq!(frame_rate_or_default(Rational::new(0, 1)), DEFAULT_FRAME_RATE);
        assert_eq!(frame_rate_or_default(Rational::new(0, 0)), DEFAULT_FRAME_RATE);
        assert_eq!(frame_rate_or_default(Rational::new(30, 0)), DEFAULT_FRAME_RATE);
    }
}
