//! Build timing and round counters.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::info;

#[derive(Debug, Default, Clone)]
struct Counters {
    compile_time: BTreeMap<String, Duration>,
    rounds: usize,
    failed_rounds: usize,
}

/// A point-in-time copy of [`BuildStatistics`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    /// Accumulated compile time per chunk.
    pub compile_time: BTreeMap<String, Duration>,
    /// Rounds finished, failed or not.
    pub rounds: usize,
    /// Rounds that ended in `Abort`.
    pub failed_rounds: usize,
}

impl StatisticsSnapshot {
    /// Sum of all compile times.
    pub fn total_compile_time(&self) -> Duration {
        self.compile_time.values().sum()
    }
}

/// Statistics of one build invocation, shared by concurrently building chunks.
#[derive(Debug, Default)]
pub struct BuildStatistics {
    counters: Mutex<Counters>,
}

impl BuildStatistics {
    /// Creates empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `elapsed` to the compile time of `chunk`.
    pub fn register_compile(&self, chunk: &str, elapsed: Duration) {
        let mut counters = self.lock();
        *counters.compile_time.entry(chunk.to_string()).or_default() += elapsed;
    }

    /// Counts a finished round.
    ///
    /// Cancelled rounds are not finished and must not be recorded.
    pub fn record_round(&self, failed: bool) {
        let mut counters = self.lock();
        counters.rounds += 1;
        if failed {
            counters.failed_rounds += 1;
        }
    }

    /// Returns a copy of the current counters.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let counters = self.lock().clone();
        StatisticsSnapshot {
            compile_time: counters.compile_time,
            rounds: counters.rounds,
            failed_rounds: counters.failed_rounds,
        }
    }

    /// Logs a summary of the whole build.
    pub fn report_total(&self) {
        let snapshot = self.snapshot();
        for (chunk, elapsed) in &snapshot.compile_time {
            info!(chunk = %chunk, elapsed_ms = elapsed.as_millis() as u64, "compile time");
        }
        info!(
            rounds = snapshot.rounds,
            failed_rounds = snapshot.failed_rounds,
            total_ms = snapshot.total_compile_time().as_millis() as u64,
            "build finished"
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_per_chunk() {
        let stats = BuildStatistics::new();
        stats.register_compile("core", Duration::from_millis(5));
        stats.register_compile("core", Duration::from_millis(7));
        stats.register_compile("app", Duration::from_millis(1));
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.compile_time["core"], Duration::from_millis(12));
        assert_eq!(snapshot.total_compile_time(), Duration::from_millis(13));
    }

    #[test]
    fn counts_failed_rounds() {
        let stats = BuildStatistics::new();
        stats.record_round(false);
        stats.record_round(true);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.rounds, 2);
        assert_eq!(snapshot.failed_rounds, 1);
    }
}
