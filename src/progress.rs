//! Progress-callback trait for per-derivative generation events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through a source.
//!
//! # Example
//!
//! ```rust
//! use fileset_derivatives::{DerivativeKind, GenerationProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     written: AtomicUsize,
//! }
//!
//! impl GenerationProgressCallback for CountingCallback {
//!     fn on_derivative_complete(&self, kind: DerivativeKind, page: Option<usize>) {
//!         let n = self.written.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{n}: {kind} {page:?}");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { written: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn GenerationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::classify::MediaCategory;
use crate::output::RoutineState;
use crate::pipeline::paths::DerivativeKind;
use std::sync::Arc;

/// Called by the pipeline as it generates derivatives.
///
/// Implementations must be `Send + Sync`: PDF pages are processed
/// concurrently, so `on_derivative_complete` and `on_derivative_error` may be
/// called from several threads at once. All methods default to no-ops.
pub trait GenerationProgressCallback: Send + Sync {
    /// Called once, after classification, before any work.
    ///
    /// # Arguments
    /// * `expected`: derivatives the routine will attempt, when known up
    ///   front. `None` for PDFs, whose total arrives with
    ///   [`Self::on_page_count`].
    fn on_generation_start(&self, category: MediaCategory, expected: Option<usize>) {
        let _ = (category, expected);
    }

    /// Called once for PDFs, after the pages have been counted.
    fn on_page_count(&self, pages: usize, expected: usize) {
        let _ = (pages, expected);
    }

    /// Called on every state transition, terminal states included.
    fn on_state_change(&self, state: RoutineState) {
        let _ = state;
    }

    /// Called when a derivative has been written.
    ///
    /// # Arguments
    /// * `page`: 0-based page index for per-page derivatives
    fn on_derivative_complete(&self, kind: DerivativeKind, page: Option<usize>) {
        let _ = (kind, page);
    }

    /// Called when a derivative could not be written.
    fn on_derivative_error(&self, kind: DerivativeKind, page: Option<usize>, error: &str) {
        let _ = (kind, page, error);
    }

    /// Called once after the routine finishes.
    fn on_generation_complete(&self, generated: usize, failed: usize) {
        let _ = (generated, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;
