//! Result types for one pipeline invocation.

use crate::classify::MediaCategory;
use crate::error::{DerivativeError, StepError};
use crate::pipeline::paths::DerivativeKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where an invocation is in its routine.
///
/// `NotStarted → Preprocessing → GeneratingDerivatives → Done | Failed`.
/// `Preprocessing` covers whatever must happen before any derivative can be
/// made: image decoding, page counting, office-to-PDF conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutineState {
    NotStarted,
    Preprocessing,
    GeneratingDerivatives,
    Done,
    Failed,
}

impl RoutineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RoutineState::Done | RoutineState::Failed)
    }
}

/// One attempted derivative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivativeOutcome {
    pub kind: DerivativeKind,
    /// 0-based page, for per-page derivatives of multi-page sources.
    pub page: Option<usize>,
    pub extension: String,
    /// Where the derivative was (or would have been) written.
    pub location: PathBuf,
    /// `None` when the derivative was written.
    pub error: Option<StepError>,
    pub duration_ms: u64,
}

impl DerivativeOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate counters over a report's outcomes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Pages in the source, for multi-page routines.
    pub total_pages: Option<usize>,
    pub generated: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
}

/// Everything one invocation produced, including partial failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub source: PathBuf,
    pub mime_type: String,
    pub category: MediaCategory,
    /// Terminal state of the routine.
    pub state: RoutineState,
    /// Every state entered, starting with [`RoutineState::NotStarted`].
    pub transitions: Vec<RoutineState>,
    pub outcomes: Vec<DerivativeOutcome>,
    pub stats: GenerationStats,
}

impl GenerationReport {
    /// `true` when every attempted derivative was written.
    pub fn is_success(&self) -> bool {
        self.state == RoutineState::Done && self.outcomes.iter().all(DerivativeOutcome::is_success)
    }

    /// Number of successfully written derivatives of `kind`.
    pub fn count(&self, kind: DerivativeKind) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.kind == kind && o.is_success())
            .count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &DerivativeOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Treat any failed derivative as a failed invocation.
    pub fn into_result(self) -> Result<Self, DerivativeError> {
        let failed = self.failed().count();
        if failed > 0 || self.state == RoutineState::Failed {
            return Err(DerivativeError::PartialFailure {
                path: self.source,
                failed,
                total: self.outcomes.len(),
            });
        }
        Ok(self)
    }
}
