//! Worker loops run on the pump's dedicated thread.
//!
//! Ingest reads, decodes and publishes frames paced by the stream's frame rate,
//! riding out end-of-stream and transport errors until too many arrive in a row.
//! Egress reads, paces by timestamp against a per-pass wall clock and writes to the
//! sink, optionally replaying the source from the start.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::{
    config::PumpConfig,
    controller::PumpShared,
    error::{PumpError, ReadError},
    frame::DecodedFrame,
    locator::Locator,
    session::{CodecSession, UnitSink},
    timing::{PaceClock, frame_interval},
};

/// Longest single sleep, so cancellation is seen promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(20);

pub(crate) type LoopFn<S> = fn(&mut S, &Locator, &WorkerContext) -> Result<WorkerExit, PumpError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    /// Stop was requested; the controller tears the session down.
    Cancelled,
    /// The source ended and nothing is left to do.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassEnd {
    Cancelled,
    EndOfStream,
}

pub(crate) struct WorkerContext {
    pub(crate) shared: Arc<PumpShared>,
    pub(crate) cancel: CancellationToken,
}

impl WorkerContext {
    fn config(&self) -> &PumpConfig {
        &self.shared.config
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sleeps in short slices; returns false if cancelled before `duration` elapsed.
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// Counts consecutive transient failures.
#[derive(Debug)]
pub(crate) struct RetryCounter {
    count: u32,
    limit: u32,
}

impl RetryCounter {
    pub(crate) fn new(limit: u32) -> Self {
        Self { count: 0, limit }
    }

    pub(crate) fn reset(&mut self) {
        self.count = 0;
    }

    /// Records a failure; true once the run exceeds the limit.
    pub(crate) fn record(&mut self) -> bool {
        self.count += 1;
        self.count > self.limit
    }

    pub(crate) fn count(&self) -> u32 {
        self.count
    }
}

/// Runs `run` to completion on the current thread and hands the session back.
pub(crate) fn run_worker<S: CodecSession>(
    mut session: S,
    locator: Locator,
    ctx: WorkerContext,
    run: LoopFn<S>,
) -> S {
    log::info!("pump worker started for {}", locator);
    match run(&mut session, &locator, &ctx) {
        Ok(WorkerExit::Cancelled) => log::info!("pump worker for {} cancelled", locator),
        Ok(WorkerExit::Finished) => {
            log::info!("pump worker for {} finished", locator);
            ctx.shared.finish(&ctx.cancel, &mut session, None);
        }
        Err(e) => {
            log::error!("pump worker for {} failed: {}", locator, e);
            ctx.shared.finish(&ctx.cancel, &mut session, Some(e));
        }
    }
    session
}

/// Handles one failed read. Returns the fatal error once retries are exhausted.
fn on_read_error(
    err: ReadError,
    retry: &mut RetryCounter,
    ctx: &WorkerContext,
) -> Result<(), PumpError> {
    match err {
        ReadError::EndOfStream => {
            if retry.record() {
                return Err(PumpError::StreamEnded);
            }
            log::debug!("end of stream, retry {}", retry.count());
        }
        ReadError::Transport { code, message } => {
            if retry.record() {
                return Err(PumpError::ReadFailed(message));
            }
            log::warn!("read error {} ({}), retry {}", code, message, retry.count());
        }
        ReadError::Fatal(message) => return Err(PumpError::ReadFailed(message)),
    }
    ctx.sleep(ctx.config().retry_backoff);
    Ok(())
}

pub(crate) fn ingest_loop<S>(
    session: &mut S,
    _locator: &Locator,
    ctx: &WorkerContext,
) -> Result<WorkerExit, PumpError>
where
    S: CodecSession<Output = DecodedFrame>,
{
    let stream = session.stream().cloned().ok_or(PumpError::NotOpen)?;
    let interval = frame_interval(stream.frame_rate);
    let mut retry = RetryCounter::new(ctx.config().max_consecutive_errors);

    while !ctx.is_cancelled() {
        if ctx.shared.is_paused() {
            ctx.sleep(ctx.config().pause_quantum);
            continue;
        }

        let read = session.read_unit();
        // a read that outlived a stop belongs to nobody
        if ctx.is_cancelled() {
            break;
        }
        let unit = match read {
            Ok(unit) => {
                retry.reset();
                unit
            }
            Err(e) => {
                on_read_error(e, &mut retry, ctx)?;
                continue;
            }
        };
        if unit.track_index() != stream.track_index {
            continue;
        }

        ctx.shared.record_packet(&ctx.cancel, unit.size());
        if let Some(frame) = session.process_unit(unit)? {
            ctx.shared.publish_frame(&ctx.cancel, frame);
        }
        ctx.sleep(interval);
    }
    Ok(WorkerExit::Cancelled)
}

pub(crate) fn egress_loop<S: UnitSink>(
    session: &mut S,
    locator: &Locator,
    ctx: &WorkerContext,
) -> Result<WorkerExit, PumpError> {
    let mut pass = 1u64;
    loop {
        match egress_pass(session, ctx)? {
            PassEnd::Cancelled => return Ok(WorkerExit::Cancelled),
            PassEnd::EndOfStream if !ctx.config().loop_replay => {
                log::info!("{}: end of input, {}", locator, ctx.shared.stats());
                return Ok(WorkerExit::Finished);
            }
            PassEnd::EndOfStream => {
                log::info!(
                    "{}: pass {} complete ({}), replaying",
                    locator,
                    pass,
                    ctx.shared.stats()
                );
                session.close();
                if ctx.is_cancelled() {
                    return Ok(WorkerExit::Cancelled);
                }
                let stream = session.open(locator)?;
                if !ctx.shared.reopened(&ctx.cancel, &stream) {
                    return Ok(WorkerExit::Cancelled);
                }
                pass += 1;
            }
        }
    }
}

fn egress_pass<S: UnitSink>(session: &mut S, ctx: &WorkerContext) -> Result<PassEnd, PumpError> {
    let stream = session.stream().cloned().ok_or(PumpError::NotOpen)?;
    let mut clock = PaceClock::start();
    let mut retry = RetryCounter::new(ctx.config().max_consecutive_errors);

    while !ctx.is_cancelled() {
        if ctx.shared.is_paused() {
            let paused_at = Instant::now();
            ctx.sleep(ctx.config().pause_quantum);
            clock.shift(paused_at.elapsed());
            continue;
        }

        let read = session.read_unit();
        if ctx.is_cancelled() {
            return Ok(PassEnd::Cancelled);
        }
        let unit = match read {
            Ok(unit) => {
                retry.reset();
                unit
            }
            Err(ReadError::EndOfStream) => return Ok(PassEnd::EndOfStream),
            Err(e) => {
                on_read_error(e, &mut retry, ctx)?;
                continue;
            }
        };
        if unit.track_index() != stream.track_index {
            continue;
        }

        if let Some(ts) = unit.timestamp() {
            let delay = clock.delay_for(ts, unit.time_base(), Instant::now());
            if !delay.is_zero() && !ctx.sleep(delay) {
                return Ok(PassEnd::Cancelled);
            }
        }

        let Some(unit) = session.process_unit(unit)? else {
            continue;
        };
        let size = session.write_unit(unit)?;
        let Some(stats) = ctx.shared.record_written(&ctx.cancel, size) else {
            return Ok(PassEnd::Cancelled);
        };
        if stats.units % ctx.config().stats_every.max(1) == 0 {
            log::info!("{}", stats);
        }
    }
    Ok(PassEnd::Cancelled)
}
