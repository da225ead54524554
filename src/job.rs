//! Whole-invocation retries for job-queue workers.
//!
//! The pipeline never retries a single step. A worker that wants another go
//! re-runs the whole invocation; [`run_job`] does that with the queue's
//! polynomial backoff, and only for errors where a retry can help.

use crate::config::PipelineConfig;
use crate::error::DerivativeError;
use crate::generate::generate_with_shell;
use crate::output::GenerationReport;
use crate::pipeline::shell::Shell;
use crate::source::SourceDescriptor;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Retry schedule for a failed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Re-runs after the first attempt. Default: 11.
    pub max_retries: u32,
    /// Scale of the backoff curve. Default: ten seconds, which spreads the
    /// eleven default retries over roughly three days.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 11,
            backoff_unit: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0)
    }

    /// Delay before retry number `retry` (0-based): `retry⁴ + 15 + 15·(retry+1)` units.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let r = u64::from(retry);
        let units = r.pow(4) + 15 + 15 * (r + 1);
        self.backoff_unit
            .checked_mul(u32::try_from(units).unwrap_or(u32::MAX))
            .unwrap_or(Duration::MAX)
    }

    /// Sum of every delay the policy can incur.
    pub fn total_budget(&self) -> Duration {
        (0..self.max_retries)
            .map(|r| self.delay_for(r))
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(d))
    }
}

/// Run an invocation, retrying the whole thing on retryable failure.
///
/// A report with failed derivatives counts as a failure
/// ([`GenerationReport::into_result`]).
pub async fn run_job(
    source: &SourceDescriptor,
    config: &PipelineConfig,
    shell: Shell,
    policy: RetryPolicy,
) -> Result<GenerationReport, DerivativeError> {
    let mut retry = 0;
    loop {
        let attempt = generate_with_shell(source, config, shell.clone())
            .await
            .and_then(GenerationReport::into_result);

        match attempt {
            Ok(report) => {
                if retry > 0 {
                    info!("{} succeeded after {} retries", source.path().display(), retry);
                }
                return Ok(report);
            }
            Err(e) if e.is_retryable() && retry < policy.max_retries => {
                let delay = policy.delay_for(retry);
                warn!(
                    "{} failed ({}), retry {}/{} in {:?}",
                    source.path().display(),
                    e,
                    retry + 1,
                    policy.max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
