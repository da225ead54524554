//! Top-level entry points.
//!
//! [`generate`] is what a job worker calls: validate the configuration,
//! classify the source, run its routine with the system shell.

use crate::config::PipelineConfig;
use crate::error::DerivativeError;
use crate::output::GenerationReport;
use crate::pipeline::shell::Shell;
use crate::service::DerivativeService;
use crate::source::SourceDescriptor;

/// Generate every derivative for `source`.
///
/// # Returns
/// `Ok(GenerationReport)` once the routine has run, even if some
/// derivatives failed (check [`GenerationReport::is_success`]).
///
/// # Errors
/// Returns `Err(DerivativeError)` only for fatal errors:
/// - invalid configuration
/// - unsupported MIME type (no work is attempted)
/// - preprocessing, page counting or office conversion failed
/// - a temporary file could not be created or removed
///
/// # Example
/// ```rust,no_run
/// use fileset_derivatives::{generate, PipelineConfig, SourceDescriptor};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = SourceDescriptor::new("scan.jp2", "image/jp2")?.with_id("abc123");
/// let report = generate(&source, &PipelineConfig::default()).await?;
/// println!("{} written, {} failed", report.stats.generated, report.stats.failed);
/// # Ok(())
/// # }
/// ```
pub async fn generate(
    source: &SourceDescriptor,
    config: &PipelineConfig,
) -> Result<GenerationReport, DerivativeError> {
    generate_with_shell(source, config, Shell::system()).await
}

/// [`generate`] with a caller-supplied executor.
pub async fn generate_with_shell(
    source: &SourceDescriptor,
    config: &PipelineConfig,
    shell: Shell,
) -> Result<GenerationReport, DerivativeError> {
    config.validate()?;
    DerivativeService::new(source.clone(), config.clone(), shell)
        .create_derivatives()
        .await
}

/// Synchronous wrapper around [`generate`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(
    source: &SourceDescriptor,
    config: &PipelineConfig,
) -> Result<GenerationReport, DerivativeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DerivativeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate(source, config))
}

/// Location URLs of `source`'s existing derivatives with `extension`.
pub fn sorted_derivative_urls(
    source: &SourceDescriptor,
    config: &PipelineConfig,
    extension: &str,
) -> Result<Vec<String>, DerivativeError> {
    DerivativeService::new(source.clone(), config.clone(), Shell::system())
        .sorted_derivative_urls(extension)
}
