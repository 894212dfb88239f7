//! Scripted sessions for driving the worker and controller without real media.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use ffmpeg_next::Rational;

use crate::{
    error::{OpenError, PumpError, ReadError, WriteError},
    frame::DecodedFrame,
    locator::Locator,
    packet::MediaUnit,
    session::{CodecSession, UnitSink},
    stream::StreamSession,
};

pub(crate) const FAKE_WIDTH: u32 = 4;
pub(crate) const FAKE_HEIGHT: u32 = 2;
pub(crate) const FAKE_FRAME_RATE: f64 = 200.0;
pub(crate) const UNIT_SIZE: usize = 100;
/// Units are stamped `10 * position` in this time base (milliseconds).
pub(crate) const TIME_BASE: Rational = Rational(1, 1000);

#[derive(Clone, Debug)]
pub(crate) enum Step {
    Unit { track: usize },
    EndOfStream,
    Transport,
    Fatal,
    /// In the first opened session: blocks the reading thread, ignoring
    /// cancellation, then reports end of stream. Later sessions skip it.
    Stall(Duration),
    /// A track-0 unit the egress sink refuses to write.
    Unwritable,
}

/// Size of the units produced by [`Step::Unwritable`].
const UNWRITABLE_SIZE: usize = 1;

pub(crate) fn units(count: usize) -> Vec<Step> {
    vec![Step::Unit { track: 0 }; count]
}

#[derive(Clone)]
pub(crate) struct Script {
    steps: Arc<Vec<Step>>,
    then: Step,
    /// Opens beyond this many fail.
    open_limit: Option<usize>,
}

impl Script {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Arc::new(steps),
            then: Step::EndOfStream,
            open_limit: None,
        }
    }

    /// Step repeated once the script runs out.
    pub(crate) fn then(mut self, step: Step) -> Self {
        self.then = step;
        self
    }

    pub(crate) fn open_limit(mut self, opens: usize) -> Self {
        self.open_limit = Some(opens);
        self
    }
}

/// Counters shared by every session a factory creates.
#[derive(Clone, Default)]
pub(crate) struct Tally {
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
    /// `(open number, pts)` of every written unit.
    written: Arc<Mutex<Vec<(usize, i64)>>>,
}

impl Tally {
    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn written(&self) -> Vec<(usize, i64)> {
        self.written.lock().unwrap().clone()
    }
}

struct ScriptedSource {
    script: Script,
    tally: Tally,
    cursor: usize,
    /// 1 for the first session any factory product opened, 2 for the next, ...
    open_number: usize,
    stream: Option<StreamSession>,
}

impl ScriptedSource {
    fn new(script: Script, tally: Tally) -> Self {
        Self {
            script,
            tally,
            cursor: 0,
            open_number: 0,
            stream: None,
        }
    }

    fn open(&mut self, locator: &Locator) -> Result<StreamSession, OpenError> {
        if self.stream.is_some() {
            return Err(OpenError::AlreadyOpen);
        }
        if let Some(limit) = self.script.open_limit {
            if self.tally.opens() >= limit {
                return Err(OpenError::NoVideoTrack);
            }
        }
        self.open_number = self.tally.opens.fetch_add(1, Ordering::SeqCst) + 1;
        self.cursor = 0;
        let stream = StreamSession {
            locator: locator.to_string(),
            track_index: 0,
            width: FAKE_WIDTH,
            height: FAKE_HEIGHT,
            frame_rate: FAKE_FRAME_RATE,
            time_base: TIME_BASE,
            codec: "rawvideo".to_string(),
        };
        self.stream = Some(stream.clone());
        Ok(stream)
    }

    fn read(&mut self) -> Result<MediaUnit, ReadError> {
        if self.stream.is_none() {
            return Err(ReadError::Fatal("session is not open".to_string()));
        }
        self.tally.reads.fetch_add(1, Ordering::SeqCst);
        let (position, step) = loop {
            let position = self.cursor;
            self.cursor += 1;
            let step = self
                .script
                .steps
                .get(position)
                .cloned()
                .unwrap_or_else(|| self.script.then.clone());
            match step {
                Step::Stall(_) if self.open_number > 1 => continue,
                step => break (position, step),
            }
        };
        match step {
            Step::Unit { track } => {
                let pts = position as i64 * 10;
                Ok(MediaUnit::new(
                    &[position as u8; UNIT_SIZE],
                    Some(pts),
                    Some(pts),
                    track,
                    TIME_BASE,
                ))
            }
            Step::EndOfStream => Err(ReadError::EndOfStream),
            Step::Transport => Err(ReadError::Transport {
                code: -5,
                message: "Input/output error".to_string(),
            }),
            Step::Fatal => Err(ReadError::Fatal("Cannot allocate memory".to_string())),
            Step::Stall(duration) => {
                thread::sleep(duration);
                Err(ReadError::EndOfStream)
            }
            Step::Unwritable => Ok(MediaUnit::new(
                &[0u8; UNWRITABLE_SIZE],
                Some(position as i64 * 10),
                None,
                0,
                TIME_BASE,
            )),
        }
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            self.tally.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Ingest stand-in: every unit decodes to a 4x2 frame filled with its position.
pub(crate) struct FakeIngest(ScriptedSource);

impl FakeIngest {
    pub(crate) fn new(script: Script, tally: Tally) -> Self {
        Self(ScriptedSource::new(script, tally))
    }
}

impl CodecSession for FakeIngest {
    type Output = DecodedFrame;

    fn open(&mut self, locator: &Locator) -> Result<StreamSession, OpenError> {
        self.0.open(locator)
    }

    fn is_open(&self) -> bool {
        self.0.stream.is_some()
    }

    fn stream(&self) -> Option<&StreamSession> {
        self.0.stream.as_ref()
    }

    fn read_unit(&mut self) -> Result<MediaUnit, ReadError> {
        self.0.read()
    }

    fn process_unit(&mut self, unit: MediaUnit) -> Result<Option<DecodedFrame>, PumpError> {
        let fill = unit.data().first().copied().unwrap_or_default();
        let stride = FAKE_WIDTH as usize * 3;
        let data = Bytes::from(vec![fill; stride * FAKE_HEIGHT as usize]);
        DecodedFrame::new(FAKE_WIDTH, FAKE_HEIGHT, stride, data, unit.pts())
            .map(Some)
            .map_err(|e| PumpError::Decode(e.to_string()))
    }

    fn close(&mut self) {
        self.0.close()
    }
}

/// Egress stand-in recording what reaches the sink.
pub(crate) struct FakeEgress(ScriptedSource);

impl FakeEgress {
    pub(crate) fn new(script: Script, tally: Tally) -> Self {
        Self(ScriptedSource::new(script, tally))
    }
}

impl CodecSession for FakeEgress {
    type Output = MediaUnit;

    fn open(&mut self, locator: &Locator) -> Result<StreamSession, OpenError> {
        self.0.open(locator)
    }

    fn is_open(&self) -> bool {
        self.0.stream.is_some()
    }

    fn stream(&self) -> Option<&StreamSession> {
        self.0.stream.as_ref()
    }

    fn read_unit(&mut self) -> Result<MediaUnit, ReadError> {
        self.0.read()
    }

    fn process_unit(&mut self, mut unit: MediaUnit) -> Result<Option<MediaUnit>, PumpError> {
        unit.retarget(0);
        Ok(Some(unit))
    }

    fn close(&mut self) {
        self.0.close()
    }
}

impl UnitSink for FakeEgress {
    fn write_unit(&mut self, unit: MediaUnit) -> Result<usize, WriteError> {
        if self.0.stream.is_none() {
            return Err(WriteError::NotOpen);
        }
        if unit.size() == UNWRITABLE_SIZE {
            return Err(WriteError::Sink {
                url: "scripted://sink".to_string(),
                source: ffmpeg_next::Error::Other { errno: 32 },
            });
        }
        let pass = self.0.tally.opens();
        self.0
            .tally
            .written
            .lock()
            .unwrap()
            .push((pass, unit.pts().unwrap_or(-1)));
        Ok(unit.size())
    }
}
