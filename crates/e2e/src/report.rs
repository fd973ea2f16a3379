//! Scenario verdicts and the suite report

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::corpus::CaseKind;
use crate::error::{E2eError, E2eResult};
use crate::poll::PollStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// A required element never resolved
    ElementNotFound,
    /// Output never appeared
    NoOutput,
    /// Output appeared but never matched
    Mismatch,
    /// Output stayed after the input was cleared
    NotCleared,
    /// Output did not change within the responsiveness deadline
    Responsiveness,
    Assertion,
    Navigation,
    Driver,
    Internal,
}

impl FailureClass {
    pub fn is_responsiveness(&self) -> bool {
        matches!(self, FailureClass::Responsiveness)
    }

    /// The harness or browser failed before the SUT's behaviour could be
    /// judged.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            FailureClass::ElementNotFound
                | FailureClass::Navigation
                | FailureClass::Driver
                | FailureClass::Internal
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub class: FailureClass,
    pub stage: Option<PollStage>,
    /// Last normalized output seen, for diff-style reporting
    pub last_observed: Option<String>,
    pub message: String,
}

impl From<&E2eError> for Failure {
    fn from(err: &E2eError) -> Self {
        Self {
            class: err.failure_class(),
            stage: err.stage(),
            last_observed: err.last_observed().map(str::to_string),
            message: err.to_string(),
        }
    }
}

/// Outcome of one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub id: String,
    pub kind: CaseKind,
    pub passed: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl Verdict {
    pub fn pass(id: &str, kind: CaseKind, duration_ms: u64) -> Self {
        Self {
            id: id.to_string(),
            kind,
            passed: true,
            duration_ms,
            failure: None,
        }
    }

    pub fn fail(id: &str, kind: CaseKind, duration_ms: u64, err: &E2eError) -> Self {
        Self {
            id: id.to_string(),
            kind,
            passed: false,
            duration_ms,
            failure: Some(Failure::from(err)),
        }
    }

    pub fn failure_class(&self) -> Option<FailureClass> {
        self.failure.as_ref().map(|f| f.class)
    }

    pub fn log(&self) {
        match &self.failure {
            None => info!("✓ {} ({} ms)", self.id, self.duration_ms),
            Some(f) => error!(
                "✗ {} [{:?}] {} (last observed: {:?})",
                self.id,
                f.class,
                f.message,
                f.last_observed.as_deref().unwrap_or("")
            ),
        }
    }
}

/// Result of running a corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub corpus: String,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Wrong, missing or stale output, or a failed page assertion
    pub correctness_failures: usize,
    pub responsiveness_failures: usize,
    /// Element, navigation, driver and internal failures
    pub infrastructure_failures: usize,
    pub duration_ms: u64,
    pub verdicts: Vec<Verdict>,
}

impl SuiteReport {
    pub fn from_verdicts(
        corpus: &str,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        verdicts: Vec<Verdict>,
    ) -> Self {
        let passed = verdicts.iter().filter(|v| v.passed).count();
        let failed = verdicts.len() - passed;
        let count = |pick: fn(&FailureClass) -> bool| {
            verdicts
                .iter()
                .filter(|v| v.failure_class().map(|c| pick(&c)).unwrap_or(false))
                .count()
        };
        let responsiveness_failures = count(FailureClass::is_responsiveness);
        let infrastructure_failures = count(FailureClass::is_infrastructure);

        Self {
            corpus: corpus.to_string(),
            started_at,
            total: verdicts.len(),
            passed,
            failed,
            correctness_failures: failed - responsiveness_failures - infrastructure_failures,
            responsiveness_failures,
            infrastructure_failures,
            duration_ms,
            verdicts,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts.iter().filter(|v| !v.passed)
    }

    pub fn log_summary(&self) {
        info!("");
        info!(
            "Results: {} passed, {} failed ({} correctness, {} responsiveness, {} infrastructure) in {} ms",
            self.passed,
            self.failed,
            self.correctness_failures,
            self.responsiveness_failures,
            self.infrastructure_failures,
            self.duration_ms
        );
    }

    /// Write test-results.json into `dir`
    pub fn write_json(&self, dir: &Path) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join("test-results.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
