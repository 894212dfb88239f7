//! Pump lifecycle: one controller per pump, one worker thread per running session.
//!
//! `start` validates the locator and opens the session on the caller's thread, then
//! moves the session into a dedicated worker thread. `stop` cancels the worker, waits
//! up to the configured grace period and takes the session back to close it. If the
//! worker does not come back in time it is detached; it still owns the session and
//! releases it as soon as its current blocking call returns.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::{
    bitrate::BitrateWindow,
    config::PumpConfig,
    device,
    error::PumpError,
    event::{PumpEvent, PumpEventReceiver, PumpEventSender, PumpEventStream},
    frame::{DecodedFrame, FrameBuffer},
    locator::{ConnectionType, Locator, SinkTarget},
    session::{CodecSession, EgressSession, IngestSession, UnitSink},
    stream::StreamSession,
    worker::{self, LoopFn, WorkerContext},
};

const SNAPSHOT_QUALITY: u8 = 90;
const JOIN_POLL: Duration = Duration::from_millis(10);

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PumpState {
    /// Never started.
    Closed,
    /// Session open, worker not yet running.
    Open,
    Running,
    Paused,
    Stopped,
}

impl PumpState {
    pub fn is_active(self) -> bool {
        matches!(self, PumpState::Open | PumpState::Running | PumpState::Paused)
    }
}

/// Units and bytes moved since the stream was last opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub units: u64,
    pub bytes: u64,
}

impl Display for PumpStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frames: {}, Bytes: {} ({:.2} MB)",
            self.units,
            self.bytes,
            self.bytes as f64 / 1024.0 / 1024.0
        )
    }
}

/// Formats a connected duration as `HH:MM:SS`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

pub const ELAPSED_PLACEHOLDER: &str = "--:--:--";

/// State shared between a controller and its worker thread.
pub(crate) struct PumpShared {
    pub(crate) config: PumpConfig,
    state: Mutex<PumpState>,
    paused: AtomicBool,
    stream: Mutex<Option<StreamSession>>,
    connected_at: Mutex<Option<Instant>>,
    bitrate: Mutex<BitrateWindow>,
    frames: FrameBuffer,
    units: AtomicU64,
    bytes: AtomicU64,
    events: PumpEventSender,
}

impl PumpShared {
    pub(crate) fn new(config: PumpConfig) -> Self {
        let (events, _) = tokio::sync::broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            state: Mutex::new(PumpState::Closed),
            paused: AtomicBool::new(false),
            stream: Mutex::new(None),
            connected_at: Mutex::new(None),
            bitrate: Mutex::new(BitrateWindow::default()),
            frames: FrameBuffer::new(),
            units: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            events,
        }
    }

    pub(crate) fn state(&self) -> PumpState {
        *lock(&self.state)
    }

    fn set_state(&self, state: PumpState) {
        *lock(&self.state) = state;
    }

    /// Moves an active pump to Stopped, reporting `error` before `StreamClosed`.
    /// Runs with the state lock held so no start can interleave. False if it was not
    /// active.
    fn close_locked(&self, state: &mut PumpState, error: Option<String>) -> bool {
        if !state.is_active() {
            return false;
        }
        *state = PumpState::Stopped;
        self.paused.store(false, Ordering::SeqCst);
        if let Some(message) = error {
            self.emit(PumpEvent::Error(message));
        }
        self.on_closed();
        true
    }

    fn mark_stopped(&self, error: Option<String>) -> bool {
        let mut state = lock(&self.state);
        self.close_locked(&mut state, error)
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn emit(&self, event: PumpEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn on_opened(&self, stream: &StreamSession) {
        let now = Instant::now();
        *lock(&self.stream) = Some(stream.clone());
        *lock(&self.connected_at) = Some(now);
        lock(&self.bitrate).reset(now);
        self.units.store(0, Ordering::SeqCst);
        self.bytes.store(0, Ordering::SeqCst);
        self.frames.clear();
        self.emit(PumpEvent::StreamOpened {
            width: stream.width,
            height: stream.height,
            frame_rate: stream.frame_rate,
        });
    }

    fn on_closed(&self) {
        lock(&self.stream).take();
        lock(&self.connected_at).take();
        lock(&self.bitrate).clear();
        self.emit(PumpEvent::StreamClosed);
    }

    // Worker-side updates below take the state lock and check the worker's own token
    // first. The controller cancels under the same lock, so a worker it gave up on
    // can never touch a later session's state.

    /// Worker-side teardown after the loop ended by itself.
    pub(crate) fn finish<S: CodecSession>(
        &self,
        cancel: &CancellationToken,
        session: &mut S,
        error: Option<PumpError>,
    ) {
        session.close();
        let mut state = lock(&self.state);
        if cancel.is_cancelled() {
            return;
        }
        self.close_locked(&mut state, error.map(|e| e.to_string()));
    }

    /// A reopened pass of the same run. False if the worker was cancelled meanwhile.
    pub(crate) fn reopened(&self, cancel: &CancellationToken, stream: &StreamSession) -> bool {
        let state = lock(&self.state);
        if cancel.is_cancelled() || !state.is_active() {
            return false;
        }
        self.on_opened(stream);
        true
    }

    pub(crate) fn record_packet(&self, cancel: &CancellationToken, size: usize) {
        let _state = lock(&self.state);
        if cancel.is_cancelled() {
            return;
        }
        self.bytes.fetch_add(size as u64, Ordering::SeqCst);
        lock(&self.bitrate).record(size, Instant::now());
        self.emit(PumpEvent::PacketReceived(size));
    }

    /// Publishes `frame` only while Running; a paused or stopped pump drops it.
    pub(crate) fn publish_frame(&self, cancel: &CancellationToken, frame: DecodedFrame) -> bool {
        let state = lock(&self.state);
        if cancel.is_cancelled() || *state != PumpState::Running {
            return false;
        }
        self.frames.publish(frame);
        self.units.fetch_add(1, Ordering::SeqCst);
        self.emit(PumpEvent::FrameReady);
        true
    }

    pub(crate) fn record_written(
        &self,
        cancel: &CancellationToken,
        size: usize,
    ) -> Option<PumpStats> {
        let _state = lock(&self.state);
        if cancel.is_cancelled() {
            return None;
        }
        lock(&self.bitrate).record(size, Instant::now());
        Some(PumpStats {
            units: self.units.fetch_add(1, Ordering::SeqCst) + 1,
            bytes: self.bytes.fetch_add(size as u64, Ordering::SeqCst) + size as u64,
        })
    }

    pub(crate) fn stats(&self) -> PumpStats {
        PumpStats {
            units: self.units.load(Ordering::SeqCst),
            bytes: self.bytes.load(Ordering::SeqCst),
        }
    }
}

struct WorkerThread<S> {
    handle: JoinHandle<S>,
    cancel: CancellationToken,
}

enum JoinOutcome<S> {
    Joined(S),
    Panicked,
    TimedOut,
}

impl<S> WorkerThread<S> {
    /// Waits up to `grace` for a cancelled worker to hand its session back.
    fn join(self, grace: Duration) -> JoinOutcome<S> {
        let deadline = Instant::now() + grace;
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                // dropping the handle detaches the thread
                return JoinOutcome::TimedOut;
            }
            thread::sleep(JOIN_POLL);
        }
        match self.handle.join() {
            Ok(session) => JoinOutcome::Joined(session),
            Err(_) => JoinOutcome::Panicked,
        }
    }
}

/// Owns a pump's lifecycle and exposes its derived properties.
pub struct PumpController<S: CodecSession> {
    factory: Box<dyn Fn() -> S + Send + Sync>,
    run: LoopFn<S>,
    shared: Arc<PumpShared>,
    worker: Mutex<Option<WorkerThread<S>>>,
}

pub type IngestPump = PumpController<IngestSession>;
pub type Repeater = PumpController<EgressSession>;

impl<S> PumpController<S>
where
    S: CodecSession<Output = DecodedFrame>,
{
    /// An ingest pump: decode and publish frames into the frame buffer.
    pub fn ingest(factory: impl Fn() -> S + Send + Sync + 'static, config: PumpConfig) -> Self {
        Self::with_loop(Box::new(factory), worker::ingest_loop::<S>, config)
    }

    pub fn latest_frame(&self) -> Option<Arc<DecodedFrame>> {
        self.shared.frames.latest()
    }

    /// Writes the latest frame to a JPEG file and returns its path.
    /// Without `path` the file is named after the current local time.
    pub fn snapshot(&self, path: Option<&Path>) -> anyhow::Result<PathBuf> {
        if !self.is_running() {
            anyhow::bail!("no stream is playing");
        }
        let frame = self
            .latest_frame()
            .ok_or_else(|| anyhow::anyhow!("no frame available"))?;
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_snapshot_path);
        frame.save_jpeg(&path, SNAPSHOT_QUALITY)?;
        log::info!("snapshot saved to {}", path.display());
        Ok(path)
    }
}

impl<S: UnitSink> PumpController<S> {
    /// An egress pump: pace and stream-copy the source into the session's sink.
    pub fn egress(factory: impl Fn() -> S + Send + Sync + 'static, config: PumpConfig) -> Self {
        Self::with_loop(Box::new(factory), worker::egress_loop::<S>, config)
    }
}

impl PumpController<IngestSession> {
    pub fn decoder(config: PumpConfig) -> Self {
        Self::ingest(IngestSession::new, config)
    }
}

impl PumpController<EgressSession> {
    pub fn repeater(target: SinkTarget, config: PumpConfig) -> Self {
        Self::egress(move || EgressSession::new(target.clone()), config)
    }
}

impl<S: CodecSession> PumpController<S> {
    fn with_loop(
        factory: Box<dyn Fn() -> S + Send + Sync>,
        run: LoopFn<S>,
        config: PumpConfig,
    ) -> Self {
        Self {
            factory,
            run,
            shared: Arc::new(PumpShared::new(config)),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PumpConfig {
        &self.shared.config
    }

    /// Validates `address` for `kind` against a fresh camera snapshot, then starts.
    pub fn connect(&self, kind: ConnectionType, address: &str) -> Result<(), PumpError> {
        log::info!("connecting to {} via {}", address, kind);
        let locator = match Locator::resolve(kind, address, &device::list_cameras()) {
            Ok(locator) => locator,
            Err(e) => {
                log::warn!("rejected {:?}: {}", address, e);
                self.shared.emit(PumpEvent::Error(e.to_string()));
                return Err(e.into());
            }
        };
        self.start(&locator)
    }

    pub fn start(&self, locator: &Locator) -> Result<(), PumpError> {
        let mut slot = lock(&self.worker);

        if self.shared.state().is_active() {
            log::warn!("pump already running, ignoring start of {}", locator);
            let err = PumpError::AlreadyRunning;
            self.shared.emit(PumpEvent::Error(err.to_string()));
            return Err(err);
        }
        // a worker that stopped by itself may still be on its way out
        if let Some(previous) = slot.take() {
            self.reclaim(previous);
        }

        let mut session = (self.factory)();
        let stream = match session.open(locator) {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("failed to open {}: {}", locator, e);
                self.shared.set_state(PumpState::Stopped);
                self.shared.emit(PumpEvent::Error(e.to_string()));
                return Err(e.into());
            }
        };
        self.shared.set_state(PumpState::Open);
        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.on_opened(&stream);

        let cancel = CancellationToken::new();
        let ctx = WorkerContext {
            shared: Arc::clone(&self.shared),
            cancel: cancel.clone(),
        };
        let run = self.run;
        let worker_locator = locator.clone();
        self.shared.set_state(PumpState::Running);
        let spawned = thread::Builder::new()
            .name("pump-worker".to_string())
            .spawn(move || worker::run_worker(session, worker_locator, ctx, run));

        match spawned {
            Ok(handle) => {
                *slot = Some(WorkerThread { handle, cancel });
                log::info!("pump running for {}", locator);
                Ok(())
            }
            Err(e) => {
                log::error!("failed to spawn pump worker: {}", e);
                // the session was dropped together with the closure
                self.shared.mark_stopped(Some(e.to_string()));
                Err(PumpError::Spawn(e))
            }
        }
    }

    pub fn pause(&self) {
        let mut state = lock(&self.shared.state);
        if *state == PumpState::Running {
            self.shared.paused.store(true, Ordering::SeqCst);
            *state = PumpState::Paused;
            log::info!("pump paused");
        }
    }

    pub fn resume(&self) {
        let mut state = lock(&self.shared.state);
        if *state == PumpState::Paused {
            self.shared.paused.store(false, Ordering::SeqCst);
            *state = PumpState::Running;
            log::info!("pump resumed");
        }
    }

    /// Stops the worker and releases the session. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut slot = lock(&self.worker);
        match slot.take() {
            Some(worker) => self.reclaim(worker),
            None => {
                self.shared.mark_stopped(None);
            }
        }
    }

    /// Cancels and joins `worker`, closing whatever session comes back.
    fn reclaim(&self, worker: WorkerThread<S>) {
        {
            let _state = lock(&self.shared.state);
            worker.cancel.cancel();
        }
        let grace = self.shared.config.stop_grace;
        match worker.join(grace) {
            JoinOutcome::Joined(mut session) => session.close(),
            JoinOutcome::Panicked => log::error!("pump worker panicked"),
            JoinOutcome::TimedOut => {
                log::warn!("pump worker did not stop within {:?}, detaching it", grace)
            }
        }
        if self.shared.mark_stopped(None) {
            log::info!("pump stopped");
        }
    }

    pub fn state(&self) -> PumpState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), PumpState::Running | PumpState::Paused)
    }

    pub fn stream(&self) -> Option<StreamSession> {
        lock(&self.shared.stream).clone()
    }

    /// Frame dimensions of the open stream, `(0, 0)` when closed.
    pub fn dimensions(&self) -> (u32, u32) {
        self.stream()
            .map(|stream| (stream.width, stream.height))
            .unwrap_or((0, 0))
    }

    /// Declared frame rate of the open stream, zero when closed.
    pub fn frame_rate(&self) -> f64 {
        self.stream().map(|stream| stream.frame_rate).unwrap_or(0.0)
    }

    pub fn connected_for(&self) -> Option<Duration> {
        let connected_at = *lock(&self.shared.connected_at);
        connected_at.map(|at| at.elapsed())
    }

    /// Connected time as `HH:MM:SS`, or `--:--:--` when not connected.
    pub fn elapsed(&self) -> String {
        self.connected_for()
            .map(format_elapsed)
            .unwrap_or_else(|| ELAPSED_PLACEHOLDER.to_string())
    }

    /// Bits per second over the last completed one-second window.
    pub fn bitrate(&self) -> u64 {
        lock(&self.shared.bitrate).bits_per_second()
    }

    pub fn stats(&self) -> PumpStats {
        self.shared.stats()
    }

    pub fn subscribe(&self) -> PumpEventReceiver {
        self.shared.events.subscribe()
    }

    /// Notifications as a stream; lagged notifications are skipped.
    pub fn events(&self) -> PumpEventStream {
        Box::pin(BroadcastStream::new(self.subscribe()).filter_map(|event| async move { event.ok() }))
    }
}

impl<S: CodecSession> Drop for PumpController<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from(format!(
        "snapshot_{}.jpg",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ))
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod controller_test;
