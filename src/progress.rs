//! Progress-callback trait for per-table and per-target events.
//!
//! Inject an [`Arc<dyn SplitProgressCallback>`] via
//! [`crate::config::SplitConfigBuilder::progress_callback`] to receive events
//! while the LLM stages run. The document walk itself is fast; the table
//! stages are where a run spends its minutes.
//!
//! # Example
//!
//! ```rust
//! use prospectus_split::{SplitProgressCallback, SplitConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl SplitProgressCallback for CountingCallback {
//!     fn on_table_complete(&self, index: usize, total: usize, table_type: &str) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("table {}/{}: {}", index + 1, total, table_type);
//!     }
//! }
//!
//! let config = SplitConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Coarse pipeline phases reported through [`SplitProgressCallback::on_stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Headings,
    Sections,
    TableContexts,
    Features,
    Selection,
    Normalization,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Headings => "detecting headings",
            Stage::Sections => "splitting sections",
            Stage::TableContexts => "collecting tables",
            Stage::Features => "describing tables",
            Stage::Selection => "selecting target tables",
            Stage::Normalization => "normalizing statements",
        }
    }
}

/// Called by the pipeline as it works through a document.
///
/// Implementations must be `Send + Sync`: feature generation runs several
/// tables at once, so `on_table_*` may be called concurrently. All methods
/// default to no-ops.
pub trait SplitProgressCallback: Send + Sync {
    /// Called once after the document is parsed.
    fn on_run_start(&self, paragraphs: usize, tables: usize) {
        let _ = (paragraphs, tables);
    }

    /// Called when a phase begins.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called before the first feature request for a table.
    ///
    /// `index` is 0-based over the candidate tables.
    fn on_table_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when a table got a usable type.
    fn on_table_complete(&self, index: usize, total: usize, table_type: &str) {
        let _ = (index, total, table_type);
    }

    /// Called when a table exhausted its attempts without a type.
    fn on_table_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once per target; `id` is `None` when no table was bound.
    fn on_target_resolved(&self, target: &str, id: Option<&str>) {
        let _ = (target, id);
    }

    /// Called once at the end of a successful run.
    fn on_run_complete(&self, resolved_targets: usize, total_targets: usize) {
        let _ = (resolved_targets, total_targets);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SplitProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::SplitConfig`].
pub type ProgressCallback = Arc<dyn SplitProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        stages: Mutex<Vec<Stage>>,
        unresolved: AtomicUsize,
    }

    impl SplitProgressCallback for TrackingCallback {
        fn on_stage(&self, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_table_start(&self, _index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_table_complete(&self, _index: usize, _total: usize, _table_type: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_table_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_target_resolved(&self, _target: &str, id: Option<&str>) {
            if id.is_none() {
                self.unresolved.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(10, 2);
        cb.on_stage(Stage::Features);
        cb.on_table_start(0, 2);
        cb.on_table_complete(0, 2, "现金流");
        cb.on_table_error(1, 2, "timeout");
        cb.on_target_resolved("现金流", None);
        cb.on_run_complete(0, 11);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_stage(Stage::Features);
        tracker.on_table_start(0, 2);
        tracker.on_table_complete(0, 2, "资产负债表");
        tracker.on_table_start(1, 2);
        tracker.on_table_error(1, 2, "no type");
        tracker.on_stage(Stage::Selection);
        tracker.on_target_resolved("资产负债表", Some("1b2c-3d4e"));
        tracker.on_target_resolved("现金流", None);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.unresolved.load(Ordering::SeqCst), 1);
        assert_eq!(
            *tracker.stages.lock().unwrap(),
            vec![Stage::Features, Stage::Selection]
        );
    }

    #[test]
    fn stage_labels_are_distinct() {
        let labels = [
            Stage::Headings,
            Stage::Sections,
            Stage::TableContexts,
            Stage::Features,
            Stage::Selection,
            Stage::Normalization,
        ]
        .map(Stage::label);
        for (i, a) in labels.iter().enumerate() {
            for b in &labels[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
