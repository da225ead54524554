//! Error types for the fileset-derivatives library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`DerivativeError`]: **Fatal**: the invocation cannot proceed at all
//!   (unsupported MIME type, missing source file, temp-file failure).
//!   Returned as `Err(DerivativeError)` from [`crate::generate()`] and the
//!   category routines.
//!
//! * [`ToolError`]: an external command could not be rendered, spawned, or
//!   exited non-zero. Raised by [`crate::pipeline::shell::Shell`] and turned
//!   into either a fatal error or a [`StepError`] depending on where it
//!   happened.
//!
//! * [`StepError`]: **Non-fatal**: one derivative (or one page of a PDF)
//!   failed while its siblings went ahead. Stored inside
//!   [`crate::output::DerivativeOutcome`] so the caller sees partial success.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the fileset-derivatives library.
#[derive(Debug, Error)]
pub enum DerivativeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source file was not found at the given path.
    #[error("Source file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Source path exists but is a directory, socket, etc.
    #[error("Source is not a regular file: '{path}'")]
    NotARegularFile { path: PathBuf },

    /// Process does not have read permission on the source.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    // ── Classification errors ─────────────────────────────────────────────
    /// Declared MIME type maps to none of the supported categories.
    #[error("Unsupported MIME type '{mime}'")]
    UnsupportedMimeType { mime: String },

    /// The image preprocessor has no branch for this source encoding.
    #[error("Unsupported image encoding for '{path}' (declared '{mime}')")]
    UnsupportedEncoding { path: PathBuf, mime: String },

    // ── External tool errors ──────────────────────────────────────────────
    /// An external tool failed during a step whose failure is fatal.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// The page-count tool failed or reported no pages.
    #[error("Could not determine page count of '{path}': {detail}")]
    PageCountFailed { path: PathBuf, detail: String },

    // ── Resource errors ───────────────────────────────────────────────────
    /// Creating or removing a temporary file failed.
    #[error("Temporary file error ({context}): {source}")]
    TempFile {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Could not create a derivative directory or alias.
    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Some derivatives were generated but at least one failed.
    ///
    /// Returned by [`crate::output::GenerationReport::into_result`] when the
    /// caller treats any failed derivative as a failed invocation.
    #[error("{failed}/{total} derivatives failed for '{path}'")]
    PartialFailure {
        path: PathBuf,
        failed: usize,
        total: usize,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration file could not be read or parsed.
    #[error("Failed to load configuration from '{path}': {detail}")]
    ConfigLoad { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DerivativeError {
    /// Whether re-running the whole invocation could plausibly succeed.
    ///
    /// Classification and input errors are permanent; tool, resource and
    /// partial failures may be transient (tool killed, disk full, ...).
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            DerivativeError::FileNotFound { .. }
                | DerivativeError::NotARegularFile { .. }
                | DerivativeError::PermissionDenied { .. }
                | DerivativeError::UnsupportedMimeType { .. }
                | DerivativeError::UnsupportedEncoding { .. }
                | DerivativeError::InvalidConfig(_)
                | DerivativeError::ConfigLoad { .. }
        )
    }
}

/// Failure of a single external command.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The template references a placeholder no argument was supplied for.
    #[error("Command template '{template}' has no value for '{{{name}}}'")]
    UnboundPlaceholder { template: String, name: String },

    /// The shell itself could not be started.
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited unsuccessfully.
    #[error("`{command}` exited with {}: {stderr}", exit_label(*.code))]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The command succeeded but did not produce the file it should have.
    #[error("`{command}` did not produce '{path}'")]
    MissingOutput { command: String, path: PathBuf },
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

/// A non-fatal error for a single derivative.
///
/// Stored in [`crate::output::DerivativeOutcome`]; the invocation continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum StepError {
    /// The external tool for this derivative failed.
    #[error("external tool failed: {detail}")]
    ToolFailed { detail: String },

    /// Creating directories or aliasing files for this derivative failed.
    #[error("filesystem error: {detail}")]
    Filesystem { detail: String },

    /// Not attempted because an earlier step it depends on failed.
    #[error("skipped: {reason}")]
    Skipped { reason: String },
}

impl From<DerivativeError> for StepError {
    fn from(e: DerivativeError) -> Self {
        match e {
            DerivativeError::Tool(t) => StepError::ToolFailed {
                detail: t.to_string(),
            },
            other => StepError::Filesystem {
                detail: other.to_string(),
            },
        }
    }
}
