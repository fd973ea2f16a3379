//! Error types for E2E verification

use thiserror::Error;

use crate::poll::PollStage;
use crate::report::FailureClass;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Element not found: {what} (waited {waited_ms} ms)")]
    ElementNotFound { what: String, waited_ms: u64 },

    #[error("Timeout during {stage} after {elapsed_ms} ms: {message} (last observed: {last_observed:?})")]
    Timeout {
        stage: PollStage,
        message: String,
        last_observed: String,
        elapsed_ms: u64,
    },

    #[error("UI did not respond within {limit_ms} ms: {message} (elapsed {elapsed_ms} ms, last observed: {last_observed:?})")]
    ResponsivenessTimeout {
        message: String,
        last_observed: String,
        elapsed_ms: u64,
        limit_ms: u64,
    },

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Browser operation failed: {op} - {message}")]
    Driver { op: String, message: String },

    #[error("Browser operation timed out: {op} - {message}")]
    DriverTimeout { op: String, message: String },

    #[error("Playwright bridge closed")]
    BridgeClosed,

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Fixture corpus error: {0}")]
    Corpus(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl E2eError {
    /// Browser-side failures of a single read. The poller keeps polling
    /// through these; anything else ends the poll.
    pub fn is_retryable_read(&self) -> bool {
        matches!(self, E2eError::Driver { .. } | E2eError::DriverTimeout { .. })
    }

    /// Verdict category for a scenario that ended with this error.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            E2eError::ElementNotFound { .. } => FailureClass::ElementNotFound,
            E2eError::Timeout { stage, .. } => match stage {
                PollStage::Appeared => FailureClass::NoOutput,
                PollStage::Matched => FailureClass::Mismatch,
                PollStage::Cleared => FailureClass::NotCleared,
                PollStage::Responded => FailureClass::Responsiveness,
            },
            E2eError::ResponsivenessTimeout { .. } => FailureClass::Responsiveness,
            E2eError::AssertionFailed(_) => FailureClass::Assertion,
            E2eError::Navigation(_) => FailureClass::Navigation,
            E2eError::Driver { .. }
            | E2eError::DriverTimeout { .. }
            | E2eError::BridgeClosed
            | E2eError::PlaywrightNotFound
            | E2eError::Playwright(_) => FailureClass::Driver,
            _ => FailureClass::Internal,
        }
    }

    /// Stage of the poll that produced this error, if any.
    pub fn stage(&self) -> Option<PollStage> {
        match self {
            E2eError::Timeout { stage, .. } => Some(*stage),
            E2eError::ResponsivenessTimeout { .. } => Some(PollStage::Responded),
            _ => None,
        }
    }

    /// Last normalized value seen before giving up.
    pub fn last_observed(&self) -> Option<&str> {
        match self {
            E2eError::Timeout { last_observed, .. }
            | E2eError::ResponsivenessTimeout { last_observed, .. } => Some(last_observed),
            _ => None,
        }
    }

    pub(crate) fn driver(op: impl Into<String>, message: impl Into<String>) -> Self {
        E2eError::Driver {
            op: op.into(),
            message: message.into(),
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
