//! Progress-callback trait for per-document and per-stage events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through a batch or a stage chain. The CLI
//! uses it to drive its progress bar; library callers can forward events
//! anywhere without the pipeline knowing how.
//!
//! # Example
//!
//! ```rust
//! use energy_extract::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     documents: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, index: usize, total: usize, metrics: usize) {
//!         self.documents.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} done ({} metrics)", index + 1, total, metrics);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { documents: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::StageKind;
use std::path::Path;
use std::sync::Arc;

/// Called by the pipelines as they process documents and stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events arrive strictly in order: the pipelines
/// never run two calls at once.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before the first document of a batch.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called before a document is loaded.
    ///
    /// # Arguments
    /// * `index`: 0-indexed position in the batch
    /// * `total`: documents in the batch (1 for a chain run)
    fn on_document_start(&self, index: usize, total: usize, path: &Path) {
        let _ = (index, total, path);
    }

    /// Called just before a stage request is sent.
    fn on_stage_start(&self, stage: StageKind) {
        let _ = stage;
    }

    /// Called when a stage returned schema-valid output.
    fn on_stage_complete(&self, stage: StageKind, metrics: usize) {
        let _ = (stage, metrics);
    }

    /// Called when a stage failed.
    fn on_stage_error(&self, stage: StageKind, error: &str) {
        let _ = (stage, error);
    }

    /// Called when a document finished successfully.
    fn on_document_complete(&self, index: usize, total: usize, metrics: usize) {
        let _ = (index, total, metrics);
    }

    /// Called when a document failed; the batch continues.
    fn on_document_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every document was attempted.
    fn on_batch_complete(&self, total_documents: usize, succeeded: usize) {
        let _ = (total_documents, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        stage_starts: AtomicUsize,
        stage_errors: AtomicUsize,
        documents_done: AtomicUsize,
        succeeded: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_stage_start(&self, _stage: StageKind) {
            self.stage_starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_error(&self, _stage: StageKind, _error: &str) {
            self.stage_errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _index: usize, _total: usize, _metrics: usize) {
            self.documents_done.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total: usize, succeeded: usize) {
            self.succeeded.store(succeeded, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_document_start(0, 2, Path::new("a.pdf"));
        cb.on_stage_start(StageKind::SingleShot);
        cb.on_stage_error(StageKind::SingleShot, "boom");
        cb.on_document_error(0, 2, "boom");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let t = TrackingCallback::default();
        for stage in StageKind::CHAIN {
            t.on_stage_start(stage);
        }
        t.on_stage_error(StageKind::Classify, "schema");
        t.on_document_complete(0, 1, 12);
        t.on_batch_complete(1, 1);

        assert_eq!(t.stage_starts.load(Ordering::SeqCst), 3);
        assert_eq!(t.stage_errors.load(Ordering::SeqCst), 1);
        assert_eq!(t.documents_done.load(Ordering::SeqCst), 1);
        assert_eq!(t.succeeded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_complete(StageKind::Identify, 5);
    }
}
