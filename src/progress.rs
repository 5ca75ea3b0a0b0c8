use crate::batch::BatchResult;
use serde::Serialize;
use tracing::info;

/// Records handled so far, counting failures. `current` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressTick {
    pub current: usize,
    pub total: usize,
}

impl ProgressTick {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.current.min(self.total) * 100) / self.total) as u8
    }

    /// Whether this tick passes a throttle of one tick per `every` records.
    /// The final record always passes.
    pub fn is_due(&self, every: usize) -> bool {
        self.current == self.total || self.current % every.max(1) == 0
    }
}

pub trait ProgressSink {
    fn tick(&mut self, tick: ProgressTick);

    fn finish(&mut self, _result: &BatchResult) {}
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn tick(&mut self, _tick: ProgressTick) {}
}

/// Reports progress as `info` events.
#[derive(Debug, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn tick(&mut self, tick: ProgressTick) {
        info!(
            current = tick.current,
            total = tick.total,
            percent = tick.percent(),
            "progress"
        );
    }

    fn finish(&mut self, result: &BatchResult) {
        info!(
            succeeded = result.succeeded(),
            failed = result.failed_count(),
            aborted = result.aborted.is_some(),
            "batch finished"
        );
    }
}

/// Keeps every tick in memory, for embedding callers and tests.
#[derive(Debug, Default)]
pub struct CollectingProgress {
    pub ticks: Vec<ProgressTick>,
    pub finished: bool,
}

impl ProgressSink for CollectingProgress {
    fn tick(&mut self, tick: ProgressTick) {
        self.ticks.push(tick);
    }

    fn finish(&mut self, _result: &BatchResult) {
        self.finished = true;
    }
}
