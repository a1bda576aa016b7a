//! Counters for the breakpoint protocol.
//!
//! # Metrics
//!
//! - Breakpoints hit and suspensions resumed
//! - Suspensions abandoned (no listener, closed channel, dropped)
//! - Handler wall-clock time, total and worst case

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Statistics for breakpoint handling.
///
/// All counters are updated atomically.
#[derive(Debug, Default)]
pub struct DebugStats {
    /// Breakpoint instructions executed.
    breakpoints: AtomicU64,

    /// Suspensions released by a resume signal.
    resumes: AtomicU64,

    /// Suspensions that ended without a resume.
    abandoned: AtomicU64,

    /// Handlers run to completion or panic.
    handlers: AtomicU64,

    /// Total handler time (nanoseconds).
    handler_time_ns: AtomicU64,

    /// Longest handler time seen (nanoseconds).
    max_handler_time_ns: AtomicU64,
}

impl DebugStats {
    /// Create zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a breakpoint hit.
    #[inline]
    pub fn record_breakpoint(&self) {
        self.breakpoints.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivered resume.
    #[inline]
    pub fn record_resume(&self) {
        self.resumes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an abandoned suspension.
    #[inline]
    pub fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long a handler ran.
    #[inline]
    pub fn record_handler_time(&self, time: Duration) {
        let nanos = u64::try_from(time.as_nanos()).unwrap_or(u64::MAX);
        self.handlers.fetch_add(1, Ordering::Relaxed);
        self.handler_time_ns.fetch_add(nanos, Ordering::Relaxed);
        self.max_handler_time_ns.fetch_max(nanos, Ordering::Relaxed);
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// Breakpoints hit.
    #[inline]
    pub fn breakpoints(&self) -> u64 {
        self.breakpoints.load(Ordering::Relaxed)
    }

    /// Resumes delivered.
    #[inline]
    pub fn resumes(&self) -> u64 {
        self.resumes.load(Ordering::Relaxed)
    }

    /// Suspensions abandoned.
    #[inline]
    pub fn abandoned(&self) -> u64 {
        self.abandoned.load(Ordering::Relaxed)
    }

    /// Average handler time.
    pub fn avg_handler_time(&self) -> Duration {
        let count = self.handlers.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.handler_time_ns.load(Ordering::Relaxed) / count)
    }

    /// Longest handler time.
    #[inline]
    pub fn max_handler_time(&self) -> Duration {
        Duration::from_nanos(self.max_handler_time_ns.load(Ordering::Relaxed))
    }

    /// Take a consistent-enough copy for reporting.
    pub fn snapshot(&self) -> DebugStatsSnapshot {
        DebugStatsSnapshot {
            breakpoints: self.breakpoints(),
            resumes: self.resumes(),
            abandoned: self.abandoned(),
            handlers: self.handlers.load(Ordering::Relaxed),
            total_handler_time: Duration::from_nanos(
                self.handler_time_ns.load(Ordering::Relaxed),
            ),
            max_handler_time: self.max_handler_time(),
        }
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.breakpoints.store(0, Ordering::Relaxed);
        self.resumes.store(0, Ordering::Relaxed);
        self.abandoned.store(0, Ordering::Relaxed);
        self.handlers.store(0, Ordering::Relaxed);
        self.handler_time_ns.store(0, Ordering::Relaxed);
        self.max_handler_time_ns.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`DebugStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugStatsSnapshot {
    /// Breakpoints hit.
    pub breakpoints: u64,
    /// Resumes delivered.
    pub resumes: u64,
    /// Suspensions abandoned.
    pub abandoned: u64,
    /// Handlers run.
    pub handlers: u64,
    /// Total handler time.
    pub total_handler_time: Duration,
    /// Longest handler time.
    pub max_handler_time: Duration,
}

impl DebugStatsSnapshot {
    /// Breakpoints still waiting for a resume or abandonment.
    pub fn outstanding(&self) -> u64 {
        self.breakpoints
            .saturating_sub(self.resumes)
            .saturating_sub(self.abandoned)
    }
}

impl std::fmt::Display for DebugStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "breakpoints={} resumes={} abandoned={} max_handler={:?}",
            self.breakpoints, self.resumes, self.abandoned, self.max_handler_time
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = DebugStats::new();
        stats.record_breakpoint();
        stats.record_breakpoint();
        stats.record_resume();
        stats.record_abandoned();

        let snap = stats.snapshot();
        assert_eq!(snap.breakpoints, 2);
        assert_eq!(snap.resumes, 1);
        assert_eq!(snap.abandoned, 1);
        assert_eq!(snap.outstanding(), 0);
    }

    #[test]
    fn test_handler_time() {
        let stats = DebugStats::new();
        assert_eq!(stats.avg_handler_time(), Duration::ZERO);

        stats.record_handler_time(Duration::from_micros(10));
        stats.record_handler_time(Duration::from_micros(30));
        assert_eq!(stats.avg_handler_time(), Duration::from_micros(20));
        assert_eq!(stats.max_handler_time(), Duration::from_micros(30));
    }

    #[test]
    fn test_reset() {
        let stats = DebugStats::new();
        stats.record_breakpoint();
        stats.record_handler_time(Duration::from_millis(1));
        stats.reset();
        assert_eq!(stats.snapshot(), DebugStatsSnapshot::default());
    }
}
