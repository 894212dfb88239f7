use std::ffi::CString;
use std::path::Path;

use ffmpeg_next::{Dictionary, Packet, Rational};

use crate::{
    error::{OpenError, ReadError},
    locator::Locator,
    packet::MediaUnit,
    stream::AvTrack,
};

/// An open demuxer and the tracks it found.
pub struct AvInput {
    inner: ffmpeg_next::format::context::Input,
    tracks: Vec<AvTrack>,
}

impl AvInput {
    /// Resolve input format by name (e.g. "v4l2", "avfoundation") via FFmpeg's av_find_input_format.
    fn find_input_format(name: &str) -> Result<ffmpeg_next::format::format::Input, OpenError> {
        let cname =
            CString::new(name).map_err(|_| OpenError::InputFormat(name.to_string()))?;
        let ptr = unsafe { ffmpeg_next::ffi::av_find_input_format(cname.as_ptr()) };
        if ptr.is_null() {
            return Err(OpenError::InputFormat(name.to_string()));
        }
        Ok(unsafe { ffmpeg_next::format::format::Input::wrap(ptr as *mut _) })
    }

    pub fn open(locator: &Locator) -> Result<Self, OpenError> {
        use ffmpeg_next::format::format::Format;

        let mut options = Dictionary::new();
        for (key, value) in locator.transport_options() {
            options.set(key, value);
        }

        let path = Path::new(locator.url());
        let input_err = |source| OpenError::Input {
            locator: locator.to_string(),
            source,
        };
        let input = match locator.input_format() {
            Some(name) => {
                let fmt = Self::find_input_format(name)?;
                ffmpeg_next::format::open_with(path, &Format::Input(fmt), options)
                    .map_err(input_err)?
                    .input()
            }
            None => ffmpeg_next::format::input_with_dictionary(path, options).map_err(input_err)?,
        };

        let tracks: Vec<AvTrack> = input.streams().map(AvTrack::from).collect();
        for track in tracks.iter() {
            log::debug!("{}: {}", locator, track);
        }

        Ok(Self {
            inner: input,
            tracks,
        })
    }

    pub fn first_video_track(&self) -> Option<&AvTrack> {
        self.tracks.iter().find(|track| track.is_video())
    }

    /// Reads the next unit from any track.
    pub fn read_unit(&mut self) -> Result<MediaUnit, ReadError> {
        let mut packet = Packet::empty();
        packet.read(&mut self.inner)?;
        let time_base = self
            .tracks
            .get(packet.stream())
            .map(AvTrack::time_base)
            .unwrap_or(Rational(1, 1_000_000));
        Ok(MediaUnit::from((packet, time_base)))
    }
}
