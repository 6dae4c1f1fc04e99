//! Build statistics.
//!
//! Counters are collected while the build runs and returned inside the
//! [`BuildReport`](crate::site::BuildReport). Per-processor statistics are
//! shared across the worker pool, so they sit behind a mutex; writer counters
//! are atomics owned by the [`OutputWriter`](crate::writer::OutputWriter).

use crate::processor::SiteStage;
use indexmap::IndexMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Timing and hit counts for one processor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorStat {
    pub name: String,
    /// Times the processor was consulted.
    pub invocations: u64,
    /// Times it acted (returned something other than `None`).
    pub hits: u64,
    pub elapsed: Duration,
}

/// Per-processor statistics, keyed by name in first-seen order.
#[derive(Debug, Default)]
pub struct ProcessorStats {
    entries: Mutex<IndexMap<String, ProcessorStat>>,
}

impl ProcessorStats {
    pub fn record(&self, name: &str, elapsed: Duration, acted: bool) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let stat = entries
            .entry(name.to_string())
            .or_insert_with(|| ProcessorStat {
                name: name.to_string(),
                ..ProcessorStat::default()
            });
        stat.invocations += 1;
        if acted {
            stat.hits += 1;
        }
        stat.elapsed += elapsed;
    }

    pub fn snapshot(&self) -> Vec<ProcessorStat> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

/// Output writer counters for one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub written: u32,
    pub unchanged: u32,
    pub copied: u32,
    pub copy_skipped: u32,
    pub stale_deleted: u32,
    pub collisions: u32,
}

impl WriteStats {
    pub fn total(&self) -> u32 {
        self.written + self.unchanged + self.copied + self.copy_skipped
    }
}

impl fmt::Display for WriteStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} written, {} unchanged, {} copied, {} up to date",
            self.written, self.unchanged, self.copied, self.copy_skipped
        )?;
        if self.stale_deleted > 0 {
            write!(f, ", {} stale removed", self.stale_deleted)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    pub pages: usize,
    pub static_files: usize,
    pub dynamic_pages: usize,
    /// Entities dropped by `discard` during loading or processing.
    pub discarded: usize,
    pub stages: Vec<(SiteStage, Duration)>,
    pub loading: Duration,
    pub processing: Duration,
    pub processors: Vec<ProcessorStat>,
    pub site_processors: Vec<ProcessorStat>,
    pub writes: WriteStats,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accumulates_per_name() {
        let stats = ProcessorStats::default();
        stats.record("markdown", Duration::from_millis(2), true);
        stats.record("markdown", Duration::from_millis(3), false);
        stats.record("minify", Duration::from_millis(1), true);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, "markdown");
        assert_eq!(snapshot[0].invocations, 2);
        assert_eq!(snapshot[0].hits, 1);
        assert_eq!(snapshot[0].elapsed, Duration::from_millis(5));
        assert_eq!(snapshot[1].name, "minify");
    }

    #[test]
    fn write_stats_display() {
        let stats = WriteStats {
            written: 3,
            unchanged: 2,
            copied: 1,
            copy_skipped: 4,
            stale_deleted: 0,
            collisions: 0,
        };
        assert_eq!(
            stats.to_string(),
            "3 written, 2 unchanged, 1 copied, 4 up to date"
        );
        assert_eq!(stats.total(), 10);

        let with_stale = WriteStats {
            stale_deleted: 2,
            ..stats
        };
        assert!(with_stale.to_string().ends_with(", 2 stale removed"));
    }
}
