use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use ffmpeg_next::format::Pixel;

use crate::controller::lock;

/// Decoded frames are always packed RGB24.
pub const PIXEL_FORMAT: Pixel = Pixel::RGB24;
pub const BYTES_PER_PIXEL: usize = 3;

/// An RGB24 image produced by the ingest decoder. Rows are `stride` bytes apart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedFrame {
    width: u32,
    height: u32,
    stride: usize,
    data: Bytes,
    pts: Option<i64>,
}

impl DecodedFrame {
    pub fn new(
        width: u32,
        height: u32,
        stride: usize,
        data: Bytes,
        pts: Option<i64>,
    ) -> anyhow::Result<Self> {
        if width == 0 || height == 0 {
            anyhow::bail!("invalid frame size {}x{}", width, height);
        }
        let row = width as usize * BYTES_PER_PIXEL;
        if stride < row {
            anyhow::bail!("stride {} shorter than row of {} bytes", stride, row);
        }
        let expected = stride * height as usize;
        if data.len() < expected {
            anyhow::bail!("frame data {} bytes, need {}", data.len(), expected);
        }
        Ok(Self {
            width,
            height,
            stride,
            data: data.slice(..expected),
            pts,
        })
    }

    /// Copies the first plane out of an RGB24 FFmpeg frame.
    pub fn from_video(frame: &ffmpeg_next::frame::Video) -> anyhow::Result<Self> {
        if frame.format() != PIXEL_FORMAT {
            anyhow::bail!("expected {:?} frame, got {:?}", PIXEL_FORMAT, frame.format());
        }
        let stride = frame.stride(0);
        let len = stride * frame.height() as usize;
        let plane = frame.data(0);
        let data = plane
            .get(..len)
            .ok_or_else(|| anyhow::anyhow!("short rgb plane: {} < {}", plane.len(), len))?;
        Self::new(
            frame.width(),
            frame.height(),
            stride,
            Bytes::copy_from_slice(data),
            frame.pts(),
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    /// Pixel rows without stride padding.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        let row = self.width as usize * BYTES_PER_PIXEL;
        self.data.chunks(self.stride).map(move |line| &line[..row])
    }

    /// Tightly packed copy of the pixels (`width * 3` bytes per row).
    pub fn to_packed(&self) -> Vec<u8> {
        let mut packed =
            Vec::with_capacity(self.width as usize * self.height as usize * BYTES_PER_PIXEL);
        for row in self.rows() {
            packed.extend_from_slice(row);
        }
        packed
    }

    pub fn save_jpeg(&self, path: &Path, quality: u8) -> anyhow::Result<()> {
        let width = u16::try_from(self.width)
            .map_err(|_| anyhow::anyhow!("frame too wide for jpeg: {}", self.width))?;
        let height = u16::try_from(self.height)
            .map_err(|_| anyhow::anyhow!("frame too tall for jpeg: {}", self.height))?;
        let encoder = jpeg_encoder::Encoder::new_file(path, quality)?;
        encoder.encode(&self.to_packed(), width, height, jpeg_encoder::ColorType::Rgb)?;
        Ok(())
    }
}

impl Display for DecodedFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rgb24 {}x{} stride={} pts={:?}",
            self.width, self.height, self.stride, self.pts
        )
    }
}

/// Single-slot holder of the most recent decoded frame.
///
/// The worker replaces the slot wholesale; readers get a shared handle to a complete
/// frame, so dimensions and bytes always agree.
#[derive(Clone, Default)]
pub struct FrameBuffer {
    slot: Arc<Mutex<Option<Arc<DecodedFrame>>>>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: DecodedFrame) {
        *lock(&self.slot) = Some(Arc::new(frame));
    }

    pub fn latest(&self) -> Option<Arc<DecodedFrame>> {
        lock(&self.slot).clone()
    }

    pub fn clear(&self) {
        lock(&self.slot).take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, stride: usize, value: u8) -> DecodedFrame {
        let data = Bytes::from(vec![value; stride * height as usize]);
        DecodedFrame::new(width, height, stride, data, Some(value as i64)).unwrap()
    }

    #[test]
    fn new_validates_geometry() {
        assert!(DecodedFrame::new(0, 2, 12, Bytes::from(vec![0; 24]), None).is_err());
        assert!(DecodedFrame::new(4, 2, 11, Bytes::from(vec![0; 24]), None).is_err());
        assert!(DecodedFrame::new(4, 2, 12, Bytes::from(vec![0; 23]), None).is_err());

        let frame = DecodedFrame::new(4, 2, 12, Bytes::from(vec![0; 30]), None).unwrap();
        assert_eq!(frame.data().len(), 24);
    }

    #[test]
    fn packed_copy_drops_padding() {
        let mut data = Vec::new();
        for row in 0..2u8 {
            data.extend_from_slice(&[row; 6]);
            data.extend_from_slice(&[0xff; 2]);
        }
        let frame = DecodedFrame::new(2, 2, 8, Bytes::from(data), None).unwrap();
        assert_eq!(frame.to_packed(), vec![0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn buffer_keeps_only_the_latest() {
        let buffer = FrameBuffer::new();
        assert!(buffer.latest().is_none());

        buffer.publish(solid(4, 2, 12, 1));
        buffer.publish(solid(8, 4, 24, 2));
        let latest = buffer.latest().unwrap();
        assert_eq!((latest.width(), latest.height()), (8, 4));
        assert_eq!(latest.pts(), Some(2));

        buffer.clear();
        assert!(buffer.latest().is_none());
    }

    #[test]
    fn readers_never_see_torn_frames() {
        let buffer = FrameBuffer::new();
        buffer.publish(solid(2, 2, 6, 0));

        let writer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                for i in 0..500u32 {
                    let size = 2 + (i % 7);
                    let stride = size as usize * BYTES_PER_PIXEL;
                    buffer.publish(solid(size, size, stride, (i % 251) as u8));
                }
            })
        };

        for _ in 0..500 {
            let frame = buffer.latest().unwrap();
            assert_eq!(frame.data().len(), frame.stride() * frame.height() as usize);
            let first = frame.data()[0];
            assert!(frame.data().iter().all(|b| *b == first));
        }
        writer.join().unwrap();
    }

    #[test]
    fn save_jpeg_writes_a_file() {
        let dir = std::env::temp_dir().join(format!("ffmpeg-pump-jpeg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("frame.jpg");

        solid(16, 8, 48, 128).save_jpeg(&path, 90).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xff, 0xd8]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
