//! Stabilization poller
//!
//! The SUT gives no completion signal: its output panel updates some time
//! after a debounced listener fires. We re-read the panel on a short backoff
//! until a predicate holds or a deadline passes. Success returns on the first
//! satisfying read, so latency tracks the SUT's real computation time rather
//! than the polling interval.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::normalize::normalize_str;

/// Smallest window given to a single read, even at the very end of the
/// deadline.
const MIN_READ_WINDOW: Duration = Duration::from_millis(50);

/// Which part of a scenario a poll is verifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStage {
    /// Any output at all (responsiveness before correctness)
    Appeared,
    /// Output equals the expected canonical text
    Matched,
    /// Output emptied after the input was cleared
    Cleared,
    /// Output changed from its baseline within a tight deadline
    Responded,
}

impl fmt::Display for PollStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PollStage::Appeared => "non-empty check",
            PollStage::Matched => "equality check",
            PollStage::Cleared => "clear check",
            PollStage::Responded => "responsiveness check",
        };
        f.write_str(s)
    }
}

/// Predicate shapes used by scenarios, evaluated on normalized text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    NonEmpty,
    Equals(String),
    Empty,
    ChangedFrom(String),
}

impl Expectation {
    /// Equality against the normalized form of `expected`.
    pub fn equals(expected: &str) -> Self {
        Expectation::Equals(normalize_str(expected))
    }

    pub fn holds(&self, value: &str) -> bool {
        match self {
            Expectation::NonEmpty => !value.is_empty(),
            Expectation::Equals(expected) => value == expected,
            Expectation::Empty => value.is_empty(),
            Expectation::ChangedFrom(baseline) => value != baseline,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Expectation::NonEmpty => "output is not empty".to_string(),
            Expectation::Equals(expected) => format!("output equals {:?}", expected),
            Expectation::Empty => "output is empty".to_string(),
            Expectation::ChangedFrom(baseline) => format!("output differs from {:?}", baseline),
        }
    }
}

/// Delays between reads. The last entry repeats once the schedule runs out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    schedule: Vec<Duration>,
}

impl Backoff {
    pub fn new(schedule: Vec<Duration>) -> Self {
        if schedule.is_empty() {
            return Self::default();
        }
        Self { schedule }
    }

    pub fn fixed(interval: Duration) -> Self {
        Self {
            schedule: vec![interval],
        }
    }

    /// Delay before the read following attempt `attempt` (1-based).
    pub fn delay(&self, attempt: usize) -> Duration {
        let idx = attempt.saturating_sub(1).min(self.schedule.len() - 1);
        self.schedule[idx]
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            schedule: [100, 250, 500, 1000]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub stage: PollStage,
    pub timeout: Duration,
    pub backoff: Backoff,
    /// Diagnostic reported on timeout
    pub message: String,
}

impl PollOptions {
    pub fn new(stage: PollStage, timeout: Duration, message: impl Into<String>) -> Self {
        Self {
            stage,
            timeout,
            backoff: Backoff::default(),
            message: message.into(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Result of one poll invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOutcome {
    pub satisfied: bool,
    pub last_observed: String,
    pub elapsed_ms: u64,
    pub attempts: usize,
    /// Last retryable read failure, if the final attempts failed to read
    pub last_error: Option<String>,
}

/// Poll `read` until `predicate` holds or `opts.timeout` elapses, returning
/// the outcome either way. Only non-retryable read errors are returned as
/// `Err`.
pub async fn observe_until<F, Fut, P>(
    mut read: F,
    predicate: P,
    opts: &PollOptions,
) -> E2eResult<PollOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<String>>,
    P: Fn(&str) -> bool,
{
    let start = Instant::now();
    let deadline = start + opts.timeout;
    let mut last_observed = String::new();
    let mut attempts = 0usize;

    loop {
        attempts += 1;
        let window = deadline
            .saturating_duration_since(Instant::now())
            .max(MIN_READ_WINDOW);

        let last_error = match timeout(window, read()).await {
            Ok(Ok(value)) => {
                if predicate(&value) {
                    let elapsed_ms = start.elapsed().as_millis() as u64;
                    debug!(
                        "{} satisfied after {} attempt(s), {} ms",
                        opts.stage, attempts, elapsed_ms
                    );
                    return Ok(PollOutcome {
                        satisfied: true,
                        last_observed: value,
                        elapsed_ms,
                        attempts,
                        last_error: None,
                    });
                }
                debug!("{} attempt {}: observed {:?}", opts.stage, attempts, value);
                last_observed = value;
                None
            }
            Ok(Err(e)) if e.is_retryable_read() => {
                debug!("{} attempt {}: read failed: {}", opts.stage, attempts, e);
                Some(e.to_string())
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                debug!("{} attempt {}: read exceeded {:?}", opts.stage, attempts, window);
                Some(format!("read exceeded {} ms", window.as_millis()))
            }
        };

        let now = Instant::now();
        if now >= deadline {
            return Ok(PollOutcome {
                satisfied: false,
                last_observed,
                elapsed_ms: (now - start).as_millis() as u64,
                attempts,
                last_error,
            });
        }

        sleep(opts.backoff.delay(attempts).min(deadline - now)).await;
    }
}

/// Like [`observe_until`], but an unsatisfied outcome becomes a timeout
/// error carrying the last observed value and the diagnostic message.
/// The `Responded` stage yields `ResponsivenessTimeout` so that latency
/// regressions are never reported as correctness regressions.
pub async fn poll_until<F, Fut, P>(
    read: F,
    predicate: P,
    opts: &PollOptions,
) -> E2eResult<PollOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<String>>,
    P: Fn(&str) -> bool,
{
    let outcome = observe_until(read, predicate, opts).await?;
    if outcome.satisfied {
        return Ok(outcome);
    }

    let message = match &outcome.last_error {
        Some(err) => format!("{} (last read error: {})", opts.message, err),
        None => opts.message.clone(),
    };

    Err(match opts.stage {
        PollStage::Responded => E2eError::ResponsivenessTimeout {
            message,
            last_observed: outcome.last_observed,
            elapsed_ms: outcome.elapsed_ms,
            limit_ms: opts.timeout.as_millis() as u64,
        },
        stage => E2eError::Timeout {
            stage,
            message,
            last_observed: outcome.last_observed,
            elapsed_ms: outcome.elapsed_ms,
        },
    })
}

/// [`poll_until`] with the predicate taken from an [`Expectation`].
pub async fn poll_expectation<F, Fut>(
    read: F,
    expectation: &Expectation,
    opts: &PollOptions,
) -> E2eResult<PollOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<String>>,
{
    debug!("Polling until {} ({:?})", expectation.describe(), opts.timeout);
    poll_until(read, |v| expectation.holds(v), opts).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use test_case::test_case;

    /// Reader whose value flips from `before` to `after` at `at` on the tokio
    /// clock.
    fn flip_at(
        start: Instant,
        at: Duration,
        before: &'static str,
        after: &'static str,
    ) -> impl FnMut() -> std::future::Ready<E2eResult<String>> {
        move || {
            let v = if start.elapsed() >= at { after } else { before };
            std::future::ready(Ok(v.to_string()))
        }
    }

    #[test_case(Expectation::NonEmpty, "", false)]
    #[test_case(Expectation::NonEmpty, "මම", true)]
    #[test_case(Expectation::Empty, "", true)]
    #[test_case(Expectation::Empty, "x", false)]
    #[test_case(Expectation::equals("  මම.\r\n"), "මම.", true)]
    #[test_case(Expectation::equals("මම."), "මම", false)]
    #[test_case(Expectation::ChangedFrom(String::new()), "", false)]
    #[test_case(Expectation::ChangedFrom(String::new()), "ෆ්", true)]
    fn test_expectation_holds(exp: Expectation, value: &str, holds: bool) {
        assert_eq!(exp.holds(value), holds);
    }

    #[test]
    fn test_backoff_repeats_last_delay() {
        let b = Backoff::default();
        assert_eq!(b.delay(1), Duration::from_millis(100));
        assert_eq!(b.delay(4), Duration::from_millis(1000));
        assert_eq!(b.delay(40), Duration::from_millis(1000));
        assert_eq!(Backoff::new(vec![]), Backoff::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_does_not_wait() {
        let opts = PollOptions::new(PollStage::Matched, Duration::from_secs(30), "never");
        let outcome = poll_until(|| async { Ok("මම".to_string()) }, |v| v == "මම", &opts)
            .await
            .unwrap();
        assert!(outcome.satisfied);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.elapsed_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_first_read_after_value_lands() {
        let start = Instant::now();
        let opts = PollOptions::new(PollStage::Appeared, Duration::from_secs(30), "no output");
        let outcome = poll_expectation(
            flip_at(start, Duration::from_millis(1200), "", "මම"),
            &Expectation::NonEmpty,
            &opts,
        )
        .await
        .unwrap();

        // reads at 0, 100, 350, 850, 1850
        assert_eq!(outcome.attempts, 5);
        assert!(outcome.elapsed_ms >= 1200 && outcome.elapsed_ms < 2900);
        assert_eq!(outcome.last_observed, "මම");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_carries_last_observed_and_message() {
        let opts = PollOptions::new(
            PollStage::Matched,
            Duration::from_secs(2),
            "Output did not match for Pos_Fun_0001",
        );
        let err = poll_expectation(
            || async { Ok("මම කතන්දර".to_string()) },
            &Expectation::equals("මම කතන්දර පොත බලනව."),
            &opts,
        )
        .await
        .unwrap_err();

        match err {
            E2eError::Timeout {
                stage,
                message,
                last_observed,
                elapsed_ms,
            } => {
                assert_eq!(stage, PollStage::Matched);
                assert_eq!(message, "Output did not match for Pos_Fun_0001");
                assert_eq!(last_observed, "මම කතන්දර");
                assert!((2000..2100).contains(&elapsed_ms));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_once_more_at_the_deadline() {
        let start = Instant::now();
        // lands between the 1850 ms read and the 2000 ms deadline
        let opts = PollOptions::new(PollStage::Appeared, Duration::from_secs(2), "no output");
        let outcome = poll_expectation(
            flip_at(start, Duration::from_millis(1900), "", "x"),
            &Expectation::NonEmpty,
            &opts,
        )
        .await
        .unwrap();
        assert_eq!(outcome.attempts, 6);
        assert_eq!(outcome.elapsed_ms, 2000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_responded_stage_yields_responsiveness_timeout() {
        let opts = PollOptions::new(
            PollStage::Responded,
            Duration::from_millis(2000),
            "UI did not respond within 2000ms",
        );
        let err = poll_expectation(
            || async { Ok(String::new()) },
            &Expectation::ChangedFrom(String::new()),
            &opts,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, E2eError::ResponsivenessTimeout { limit_ms: 2000, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_read_is_bounded_by_deadline() {
        let opts = PollOptions::new(PollStage::Appeared, Duration::from_millis(500), "no output");
        let start = Instant::now();
        let err = poll_until(
            || async {
                sleep(Duration::from_secs(60)).await;
                Ok("late".to_string())
            },
            |v| !v.is_empty(),
            &opts,
        )
        .await
        .unwrap_err();

        assert!(start.elapsed() < Duration::from_millis(600));
        match err {
            E2eError::Timeout { message, .. } => assert!(message.contains("read exceeded")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_errors_are_polled_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let opts = PollOptions::new(PollStage::Matched, Duration::from_secs(5), "mismatch");
        let outcome = poll_until(
            || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(E2eError::driver("innerText", "element is detached"))
                    } else {
                        Ok("ok".to_string())
                    }
                }
            },
            |v| v == "ok",
            &opts,
        )
        .await
        .unwrap();
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_aborts_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let opts = PollOptions::new(PollStage::Matched, Duration::from_secs(30), "mismatch");
        let err = poll_until(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(E2eError::BridgeClosed) }
            },
            |_| true,
            &opts,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, E2eError::BridgeClosed));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_reports_unsatisfied_without_error() {
        let opts = PollOptions::new(PollStage::Cleared, Duration::from_millis(300), "not cleared")
            .with_backoff(Backoff::fixed(Duration::from_millis(100)));
        let outcome = observe_until(|| async { Ok("stale".to_string()) }, |v| v.is_empty(), &opts)
            .await
            .unwrap();
        assert!(!outcome.satisfied);
        assert_eq!(outcome.last_observed, "stale");
        // reads at 0, 100, 200, 300
        assert_eq!(outcome.attempts, 4);
    }
}
