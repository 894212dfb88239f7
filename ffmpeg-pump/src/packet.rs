use bytes::Bytes;
use ffmpeg_next::{Packet, Rational};

/// One demuxed, still-encoded unit together with the time base its timestamps are in.
pub struct MediaUnit {
    packet: Packet,
    time_base: Rational,
}

impl MediaUnit {
    /// Builds a unit from raw bytes. Mostly useful for scripted sources.
    pub fn new(
        data: &[u8],
        pts: Option<i64>,
        dts: Option<i64>,
        track_index: usize,
        time_base: Rational,
    ) -> Self {
        let mut packet = Packet::copy(data);
        packet.set_pts(pts);
        packet.set_dts(dts);
        packet.set_stream(track_index);
        Self { packet, time_base }
    }

    pub fn pts(&self) -> Option<i64> {
        self.packet.pts()
    }

    pub fn dts(&self) -> Option<i64> {
        self.packet.dts()
    }

    /// Presentation timestamp, falling back to the decode timestamp.
    pub fn timestamp(&self) -> Option<i64> {
        self.pts().or_else(|| self.dts())
    }

    pub fn duration(&self) -> i64 {
        self.packet.duration()
    }

    pub fn size(&self) -> usize {
        self.packet.size()
    }

    pub fn track_index(&self) -> usize {
        self.packet.stream()
    }

    pub fn data(&self) -> Bytes {
        self.packet
            .data()
            .map(Bytes::copy_from_slice)
            .unwrap_or_default()
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Rewrites pts, dts and duration into `to`.
    pub fn rescale(&mut self, to: Rational) {
        self.packet.rescale_ts(self.time_base, to);
        self.time_base = to;
    }

    /// Points the unit at `track_index` of a muxer and drops its byte position.
    pub fn retarget(&mut self, track_index: usize) {
        self.packet.set_stream(track_index);
        self.packet.set_position(-1);
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }
}

impl From<(Packet, Rational)> for MediaUnit {
    fn from((packet, time_base): (Packet, Rational)) -> Self {
        Self { packet, time_base }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_moves_timestamps_and_time_base() {
        let mut unit = MediaUnit::new(&[0u8; 16], Some(3), Some(2), 1, Rational::new(1, 30));
        assert_eq!(unit.size(), 16);
        assert_eq!(unit.track_index(), 1);

        unit.rescale(Rational::new(1, 1000));
        assert_eq!(unit.pts(), Some(100));
        assert_eq!(unit.dts(), Some(67));
        assert_eq!(unit.time_base(), Rational::new(1, 1000));

        unit.retarget(0);
        assert_eq!(unit.track_index(), 0);
    }

    #[test]
    fn missing_timestamps_stay_missing() {
        let mut unit = MediaUnit::new(&[1, 2, 3], None, Some(9), 0, Rational::new(1, 90000));
        assert_eq!(unit.timestamp(), Some(9));
        unit.rescale(Rational::new(1, 1000));
        assert_eq!(unit.pts(), None);
        assert_eq!(unit.data().as_ref(), &[1, 2, 3]);
    }
}
