//! Table-producing pipeline stages
//!
//! A stage computes its whole output in memory and only then hands it to
//! storage, so a failed or timed-out attempt leaves the previous table intact.
//! Retries always rerun the stage from the beginning.

pub mod embedding;
pub mod extraction;

pub use embedding::{is_embeddable, run_image_embedding, run_text_embedding};
pub use extraction::{
    ExtractionOutcome, ExtractionReport, RejectedExtraction, StructuredExtraction, run_extraction,
    validate_output,
};

use crate::config::PipelineConfig;
use crate::error::{LensError, Result};
use std::future::Future;
use std::time::Duration;

/// Timeout and whole-stage retry budget
#[derive(Debug, Clone, Copy)]
pub struct StagePolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl StagePolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.stage_timeout_secs),
            max_attempts: config.max_stage_attempts.max(1),
        }
    }
}

/// Run `attempt` until it succeeds, at most `policy.max_attempts` times
pub async fn run_stage<T, F, Fut>(name: &str, policy: StagePolicy, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = String::new();

    for attempt_number in 1..=policy.max_attempts {
        log::info!(
            "Stage '{}' attempt {}/{}",
            name,
            attempt_number,
            policy.max_attempts
        );

        match tokio::time::timeout(policy.timeout, attempt()).await {
            Ok(Ok(output)) => return Ok(output),
            Ok(Err(e)) => {
                log::warn!("Stage '{}' attempt {} failed: {}", name, attempt_number, e);
                last_error = e.to_string();
            }
            Err(_) => {
                let e = LensError::Timeout(policy.timeout.as_secs());
                log::warn!("Stage '{}' attempt {} failed: {}", name, attempt_number, e);
                last_error = e.to_string();
            }
        }
    }

    Err(LensError::StageFailed {
        stage: name.to_string(),
        reason: last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32, timeout_ms: u64) -> StagePolicy {
        StagePolicy {
            timeout: Duration::from_millis(timeout_ms),
            max_attempts,
        }
    }

    #[tokio::test]
    async fn test_retries_whole_stage() {
        let calls = AtomicU32::new(0);
        let result = run_stage("flaky", policy(3, 1_000), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(LensError::Service("unavailable".into()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_report_stage() {
        let result: Result<()> = run_stage("embedding", policy(2, 1_000), || async {
            Err(LensError::Service("down".into()))
        })
        .await;

        match result {
            Err(LensError::StageFailed { stage, reason }) => {
                assert_eq!(stage, "embedding");
                assert!(reason.contains("down"));
            }
            other => panic!("Expected StageFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let result: Result<()> = run_stage("slow", policy(1, 10), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(LensError::StageFailed { .. })));
    }
}
