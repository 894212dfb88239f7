use std::time::Duration;

/// Consecutive end-of-stream or transport failures tolerated before a read is fatal.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;
pub const RETRY_BACKOFF: Duration = Duration::from_millis(100);
pub const PAUSE_QUANTUM: Duration = Duration::from_millis(100);
/// How long `stop()` waits for the worker before detaching it.
pub const STOP_GRACE: Duration = Duration::from_secs(3);
pub const STATS_EVERY: u64 = 300;
pub const EVENT_CAPACITY: usize = 1024;

/// Tunables shared by a controller and its worker.
#[derive(Debug, Clone, PartialEq)]
pub struct PumpConfig {
    pub max_consecutive_errors: u32,
    pub retry_backoff: Duration,
    pub pause_quantum: Duration,
    pub stop_grace: Duration,
    /// Egress only: reopen and replay the source after end-of-stream.
    pub loop_replay: bool,
    /// Egress only: log statistics every this many written units.
    pub stats_every: u64,
    pub event_capacity: usize,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            max_consecutive_errors: MAX_CONSECUTIVE_ERRORS,
            retry_backoff: RETRY_BACKOFF,
            pause_quantum: PAUSE_QUANTUM,
            stop_grace: STOP_GRACE,
            loop_replay: false,
            stats_every: STATS_EVERY,
            event_capacity: EVENT_CAPACITY,
        }
    }
}

impl PumpConfig {
    pub fn with_loop_replay(mut self, loop_replay: bool) -> Self {
        self.loop_replay = loop_replay;
        self
    }

    pub fn with_retry(mut self, max_consecutive_errors: u32, backoff: Duration) -> Self {
        self.max_consecutive_errors = max_consecutive_errors;
        self.retry_backoff = backoff;
        self
    }

    pub fn with_pause_quantum(mut self, quantum: Duration) -> Self {
        self.pause_quantum = quantum;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_stats_every(mut self, units: u64) -> Self {
        self.stats_every = units.max(1);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
