//! Build configuration and context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Configuration for an index build.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Distinct-count threshold above which a single-column index gets a
    /// block-summary array for two-tier search.
    pub block_threshold: usize,

    /// Partition size below which the permutation sort switches to
    /// insertion sort.
    pub sort_cutoff: usize,

    /// Emit a progress trace event every this many rows read.
    pub progress_interval: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            block_threshold: 65_536,
            sort_cutoff: 12,
            progress_interval: 65_536,
        }
    }
}

impl BuildConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the two-tier search threshold.
    #[must_use]
    pub const fn block_threshold(mut self, value: usize) -> Self {
        self.block_threshold = value;
        self
    }

    /// Sets the insertion-sort cutoff.
    #[must_use]
    pub const fn sort_cutoff(mut self, value: usize) -> Self {
        self.sort_cutoff = value;
        self
    }

    /// Sets the progress-report interval in rows.
    #[must_use]
    pub const fn progress_interval(mut self, value: usize) -> Self {
        self.progress_interval = value;
        self
    }
}

/// Per-build context: configuration plus the cooperative interrupt flag.
///
/// The engine holds no process-wide state; everything a build needs is
/// passed through this context. The interrupt flag is checked once per
/// row read, so cancellation latency is one row.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Build configuration.
    pub config: BuildConfig,
    interrupt: Arc<AtomicBool>,
}

impl BuildContext {
    /// Creates a context with the given configuration.
    #[must_use]
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a handle that can cancel the build from another thread.
    #[must_use]
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Returns true if the build has been asked to stop.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new(BuildConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BuildConfig::default();
        assert_eq!(config.block_threshold, 65_536);
        assert_eq!(config.sort_cutoff, 12);
    }

    #[test]
    fn builder_setters() {
        let config = BuildConfig::new().block_threshold(100).sort_cutoff(4);
        assert_eq!(config.block_threshold, 100);
        assert_eq!(config.sort_cutoff, 4);
    }

    #[test]
    fn interrupt_flag_roundtrip() {
        let ctx = BuildContext::default();
        assert!(!ctx.is_interrupted());

        ctx.interrupt_flag()
            .store(true, std::sync::atomic::Ordering::Relaxed);
        assert!(ctx.is_interrupted());
    }
}
