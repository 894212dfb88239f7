use ffmpeg_next::{
    format::Pixel,
    frame::Video,
    software::scaling::{Context, Flags},
};

use crate::frame::{DecodedFrame, PIXEL_FORMAT};

/// Converts decoded frames of any pixel format to same-size RGB24.
pub struct RgbConverter {
    context: Context,
    output: Video,
}

impl RgbConverter {
    pub fn new(format: Pixel, width: u32, height: u32) -> Result<Self, ffmpeg_next::Error> {
        Ok(Self {
            context: Self::context(format, width, height)?,
            output: Video::empty(),
        })
    }

    fn context(format: Pixel, width: u32, height: u32) -> Result<Context, ffmpeg_next::Error> {
        Context::get(
            format,
            width,
            height,
            PIXEL_FORMAT,
            width,
            height,
            Flags::BILINEAR,
        )
    }

    pub fn convert(&mut self, frame: &Video) -> anyhow::Result<DecodedFrame> {
        let input = self.context.input();
        if input.format != frame.format()
            || input.width != frame.width()
            || input.height != frame.height()
        {
            log::debug!(
                "source geometry changed to {:?} {}x{}, rebuilding converter",
                frame.format(),
                frame.width(),
                frame.height()
            );
            self.context = Self::context(frame.format(), frame.width(), frame.height())?;
            self.output = Video::empty();
        }
        self.context.run(frame, &mut self.output)?;
        self.output.set_pts(frame.pts());
        DecodedFrame::from_video(&self.output)
    }
}

unsafe impl Send for RgbConverter {}
