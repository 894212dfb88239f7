use ffmpeg_next::{Dictionary, Rational};

use crate::{
    error::{OpenError, WriteError},
    locator::SinkTarget,
    packet::MediaUnit,
    stream::AvTrack,
};

/// Stream-copy muxer with a single output track.
pub struct AvOutput {
    inner: ffmpeg_next::format::context::Output,
    url: String,
    time_base: Rational,
    have_written_trailer: bool,
}

impl AvOutput {
    /// Opens the sink, mirrors `track` onto output track 0 and writes the header.
    pub fn open(target: &SinkTarget, track: &AvTrack) -> Result<Self, OpenError> {
        let url = target.url().to_string();
        let sink_err = |source| OpenError::Sink {
            url: url.clone(),
            source,
        };

        let protocol = target.protocol();
        let mut output =
            ffmpeg_next::format::output_as(&url, protocol.muxer_format()).map_err(sink_err)?;
        {
            let mut writer_stream = output
                .add_stream(ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::None))
                .map_err(sink_err)?;
            writer_stream.set_parameters(track.parameters().clone());
            // let the muxer pick a tag valid for its container
            unsafe {
                (*writer_stream.parameters().as_mut_ptr()).codec_tag = 0;
            }
            writer_stream.set_time_base(track.time_base());
        }

        let mut options = Dictionary::new();
        for (key, value) in protocol.options() {
            options.set(key, value);
        }
        output.write_header_with(options).map_err(sink_err)?;

        let time_base = output
            .stream(0)
            .map(|s| s.time_base())
            .ok_or_else(|| OpenError::Resource("output track".to_string()))?;
        log::debug!(
            "{} opened, output time_base={}/{}",
            target,
            time_base.numerator(),
            time_base.denominator()
        );

        Ok(Self {
            inner: output,
            url,
            time_base,
            have_written_trailer: false,
        })
    }

    /// Time base the muxer settled on for the output track.
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Writes a unit already rescaled to [`Self::time_base`] and retargeted to track 0.
    pub fn write_unit(&mut self, unit: &MediaUnit) -> Result<(), WriteError> {
        unit.packet()
            .write_interleaved(&mut self.inner)
            .map_err(|source| WriteError::Sink {
                url: self.url.clone(),
                source,
            })
    }

    pub fn finish(&mut self) -> Result<(), ffmpeg_next::Error> {
        if !self.have_written_trailer {
            self.have_written_trailer = true;
            self.inner.write_trailer()?;
        }
        Ok(())
    }
}
