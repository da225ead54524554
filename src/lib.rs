//! # fileset-derivatives
//!
//! Generate access derivatives (thumbnails, zoomable tile pyramids, page
//! bitmaps, full text, audio/video renditions) for uploaded repository files.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source + MIME type
//!  │
//!  ├─ 1. Classify    image | pdf | office document | audio | video
//!  ├─ 2. Preprocess  decode image to bitmap / count PDF pages / office → PDF
//!  ├─ 3. Generate    thumbnail, tile pyramid, page bitmaps, text, renditions
//!  └─ 4. Report      per-derivative outcomes, partial failures included
//! ```
//!
//! Every external tool (ImageMagick, GraphicsMagick, OpenJPEG, poppler,
//! LibreOffice, ffmpeg) is a configurable command template run through a
//! single escaping chokepoint, [`pipeline::shell::Shell`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fileset_derivatives::{generate, PipelineConfig, SourceDescriptor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .derivatives_root("/srv/derivatives")
//!         .build()?;
//!     let source = SourceDescriptor::new("upload.pdf", "application/pdf")?
//!         .with_id("f4752g72m");
//!     let report = generate(&source, &config).await?;
//!     eprintln!("{} written, {} failed", report.stats.generated, report.stats.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `derivatives` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! fileset-derivatives = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod classify;
pub mod config;
pub mod error;
pub mod generate;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod service;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use classify::MediaCategory;
pub use config::{PipelineConfig, PipelineConfigBuilder, ToolTemplates};
pub use error::{DerivativeError, StepError, ToolError};
pub use generate::{generate, generate_sync, generate_with_shell, sorted_derivative_urls};
pub use job::{run_job, RetryPolicy};
pub use output::{DerivativeOutcome, GenerationReport, GenerationStats, RoutineState};
pub use pipeline::paths::{DerivativeKind, DerivativePathResolver};
pub use pipeline::shell::{CommandTemplate, Executor, Shell, SystemShell, ToolOutput};
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use service::DerivativeService;
pub use source::SourceDescriptor;
