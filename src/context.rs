//! Per-build error accounting.
//!
//! A [`BuildContext`] is created at the start of every build and passed by
//! reference to every stage, processor and writer call. Any code path that
//! logs an error-level event also calls [`BuildContext::record_error`], and
//! content warnings (bad URLs, unknown placeholders) call
//! [`BuildContext::record_warning`]. The orchestrator polls
//! [`BuildContext::has_errors`] at its checkpoints and stops processing once
//! it flips.
//!
//! Counters are atomics so the context can be shared across the rayon pool
//! during parallel content processing.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct BuildContext {
    errors: AtomicUsize,
    warnings: AtomicUsize,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_warning(&self) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clean() {
        let cx = BuildContext::new();
        assert!(!cx.has_errors());
        assert_eq!(cx.error_count(), 0);
        assert_eq!(cx.warning_count(), 0);
    }

    #[test]
    fn warnings_do_not_set_error_flag() {
        let cx = BuildContext::new();
        cx.record_warning();
        assert!(!cx.has_errors());
        assert_eq!(cx.warning_count(), 1);
    }

    #[test]
    fn errors_are_counted_across_threads() {
        let cx = BuildContext::new();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| cx.record_error());
            }
        });
        assert!(cx.has_errors());
        assert_eq!(cx.error_count(), 4);
    }
}
