//! Scenario runner
//!
//! Executes one case record end to end: open the site, resolve the input,
//! apply the case input, poll the output, and turn the outcome into a
//! [`Verdict`]. Steps within a scenario are strictly sequential; whole
//! scenarios run concurrently, each in its own page.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use regex::Regex;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::corpus::{CaseKind, CaseRecord, Corpus, UiCheck};
use crate::driver::{Browser, Page, WaitUntil};
use crate::error::{E2eError, E2eResult};
use crate::locator::{resolve_input, Locator};
use crate::normalize::normalize_str;
use crate::poll::{poll_expectation, Expectation, PollOptions, PollOutcome, PollStage};
use crate::reader::read_normalized;
use crate::report::{SuiteReport, Verdict};
use crate::trigger::{apply_input, InputMode};

#[derive(Clone)]
pub struct ScenarioRunner {
    browser: Arc<dyn Browser>,
    config: Arc<HarnessConfig>,
}

impl ScenarioRunner {
    pub fn new(browser: Arc<dyn Browser>, config: HarnessConfig) -> Self {
        Self {
            browser,
            config: Arc::new(config),
        }
    }

    /// Run every case, at most `config.workers` at a time. A failing case
    /// never stops its siblings and nothing is retried. Verdicts come back
    /// in corpus order.
    pub async fn run_corpus(&self, corpus: Arc<Corpus>) -> SuiteReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let workers = self.config.workers.max(1);

        info!("Running {} scenario(s) with {} worker(s)...", corpus.len(), workers);

        let mut verdicts: Vec<(usize, Verdict)> = stream::iter(corpus.cases().iter().enumerate())
            .map(|(i, case)| async move {
                let verdict = self.run_case(case).await;
                verdict.log();
                (i, verdict)
            })
            .buffer_unordered(workers)
            .collect()
            .await;
        verdicts.sort_by_key(|(i, _)| *i);

        let report = SuiteReport::from_verdicts(
            corpus.name(),
            started_at,
            start.elapsed().as_millis() as u64,
            verdicts.into_iter().map(|(_, v)| v).collect(),
        );
        report.log_summary();
        report
    }

    /// Run the corpus, write `test-results.json` into the output directory,
    /// then shut the browser down. A failed or stalled shutdown is only
    /// logged; the written results stand.
    pub async fn run_and_record(&self, corpus: Arc<Corpus>) -> E2eResult<SuiteReport> {
        let report = self.run_corpus(corpus).await;
        report.write_json(&self.config.output_dir)?;

        if let Err(e) = self.act("closeBrowser", self.browser.close()).await {
            warn!("Browser shutdown failed: {}", e);
        }
        Ok(report)
    }

    /// Run one case in a fresh page. Never fails: errors become a failed
    /// verdict carrying the diagnostic.
    pub async fn run_case(&self, case: &CaseRecord) -> Verdict {
        let start = Instant::now();
        debug!("Running scenario: {}", case.id);

        let result = match self.act("newPage", self.browser.new_page()).await {
            Ok(page) => {
                let result = self.execute(page.as_ref(), case).await;
                if let Err(e) = self.act("closePage", page.close()).await {
                    warn!("Failed to close page for {}: {}", case.id, e);
                }
                result
            }
            Err(e) => Err(e),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(()) => Verdict::pass(&case.id, case.kind, duration_ms),
            Err(e) => Verdict::fail(&case.id, case.kind, duration_ms, &e),
        }
    }

    async fn execute(&self, page: &dyn Page, case: &CaseRecord) -> E2eResult<()> {
        self.open(page).await?;

        match (case.kind, &case.check) {
            (CaseKind::Positive | CaseKind::Negative, _) => {
                self.check_translation(page, case).await
            }
            (CaseKind::UiBehavior, Some(UiCheck::ClearsOutput { seed })) => {
                self.check_clears_output(page, case, seed).await
            }
            (CaseKind::UiBehavior, Some(UiCheck::RespondsWithin { limit_ms })) => {
                self.check_responsiveness(page, case, *limit_ms).await
            }
            (CaseKind::UiBehavior, Some(UiCheck::SiteIdentity { title_pattern })) => {
                self.check_site_identity(page, title_pattern).await
            }
            (CaseKind::UiBehavior, None) => Err(E2eError::Corpus(format!(
                "{}: ui_behavior case without a check",
                case.id
            ))),
        }
    }

    /// Proceed once the document is parsed; the input is usable before the
    /// page's remaining resources finish loading.
    async fn open(&self, page: &dyn Page) -> E2eResult<()> {
        let url = &self.config.site_url;
        let limit = self.config.timeouts.navigation();
        match timeout(limit, page.goto(url, WaitUntil::DomContentLoaded, limit)).await {
            Ok(result) => result,
            Err(_) => Err(E2eError::Navigation(format!(
                "{}: no response within {} ms",
                url,
                limit.as_millis()
            ))),
        }
    }

    /// Run one browser step under the action deadline.
    async fn act<T>(&self, op: &str, step: impl Future<Output = E2eResult<T>>) -> E2eResult<T> {
        self.bounded(op, self.config.timeouts.action(), step).await
    }

    async fn bounded<T>(
        &self,
        op: &str,
        limit: Duration,
        step: impl Future<Output = E2eResult<T>>,
    ) -> E2eResult<T> {
        match timeout(limit, step).await {
            Ok(result) => result,
            Err(_) => Err(E2eError::DriverTimeout {
                op: op.to_string(),
                message: format!("no reply within {} ms", limit.as_millis()),
            }),
        }
    }

    /// Clear, fill or type, and trigger, under one deadline. Typing is given
    /// its per-character delays on top of the action deadline.
    async fn enter(
        &self,
        page: &dyn Page,
        input: &Locator,
        text: &str,
        mode: InputMode,
        force: bool,
    ) -> E2eResult<()> {
        let mut limit = self.config.timeouts.action();
        if let InputMode::Type { delay_ms } = mode {
            let chars = text.chars().count() as u64;
            limit += Duration::from_millis(delay_ms.saturating_mul(chars));
        }
        self.bounded("input", limit, apply_input(page, input, text, mode, force)).await
    }

    async fn poll(
        &self,
        page: &dyn Page,
        output: &Locator,
        expectation: &Expectation,
        opts: PollOptions,
    ) -> E2eResult<PollOutcome> {
        let read_timeout = self.config.timeouts.read();
        let read = move || read_normalized(page, output, read_timeout);
        poll_expectation(read, expectation, &opts).await
    }

    /// Positive: output appears, then equals expected.
    /// Negative: output equals expected.
    async fn check_translation(&self, page: &dyn Page, case: &CaseRecord) -> E2eResult<()> {
        let timeouts = &self.config.timeouts;
        let locators = &self.config.locators;

        let input = resolve_input(page, locators, timeouts.element_visible()).await?;
        let output = locators.output();

        self.enter(page, &input, &case.input, case.input_mode, case.forces_reevaluation())
            .await?;

        let expected = normalize_str(&case.expected);

        // An empty expected value would make the non-empty check spin to
        // its deadline.
        if case.kind == CaseKind::Positive && !expected.is_empty() {
            self.poll(
                page,
                &output,
                &Expectation::NonEmpty,
                PollOptions::new(
                    PollStage::Appeared,
                    timeouts.appear(),
                    format!("No output produced for {}", case.id),
                ),
            )
            .await?;
        }

        let match_timeout = match case.kind {
            CaseKind::Positive => timeouts.matched(),
            _ => timeouts.negative_match(),
        };
        let outcome = self
            .poll(
                page,
                &output,
                &Expectation::Equals(expected),
                PollOptions::new(
                    PollStage::Matched,
                    match_timeout,
                    format!("Output did not match for {}", case.id),
                ),
            )
            .await?;

        debug!("{} matched after {} ms", case.id, outcome.elapsed_ms);
        Ok(())
    }

    /// The SUT must clear stale output once the input is emptied.
    async fn check_clears_output(
        &self,
        page: &dyn Page,
        case: &CaseRecord,
        seed: &str,
    ) -> E2eResult<()> {
        let timeouts = &self.config.timeouts;
        let locators = &self.config.locators;

        let input = resolve_input(page, locators, timeouts.element_visible()).await?;
        let output = locators.output();

        self.enter(page, &input, seed, case.input_mode, case.forces_reevaluation())
            .await?;
        self.poll(
            page,
            &output,
            &Expectation::NonEmpty,
            PollOptions::new(PollStage::Appeared, timeouts.seed_appear(), "No output produced"),
        )
        .await?;

        self.enter(page, &input, "", InputMode::Fill, case.forces_reevaluation())
            .await?;
        self.poll(
            page,
            &output,
            &Expectation::Empty,
            PollOptions::new(
                PollStage::Cleared,
                timeouts.clear(),
                "Output did not clear after clearing the input",
            ),
        )
        .await?;
        Ok(())
    }

    /// Output must move off its baseline quickly, whatever it moves to.
    /// The poll runs to the tighter of the case limit and the configured
    /// deadline; elapsed time since the input started is asserted separately
    /// since input entry itself counts against the limit.
    async fn check_responsiveness(
        &self,
        page: &dyn Page,
        case: &CaseRecord,
        limit_ms: u64,
    ) -> E2eResult<()> {
        let timeouts = &self.config.timeouts;
        let locators = &self.config.locators;
        let limit_ms = limit_ms.min(timeouts.responsiveness_ms);

        let input = resolve_input(page, locators, timeouts.element_visible()).await?;
        let output = locators.output();

        let baseline = self
            .bounded("read", timeouts.read(), read_normalized(page, &output, timeouts.read()))
            .await?;
        let start = Instant::now();

        self.enter(page, &input, &case.input, case.input_mode, case.forces_reevaluation())
            .await?;
        let outcome = self
            .poll(
                page,
                &output,
                &Expectation::ChangedFrom(baseline),
                PollOptions::new(
                    PollStage::Responded,
                    Duration::from_millis(limit_ms),
                    format!("output unchanged for {}", case.id),
                ),
            )
            .await?;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        if elapsed_ms > limit_ms {
            return Err(E2eError::ResponsivenessTimeout {
                message: format!("output changed only after {} ms", elapsed_ms),
                last_observed: outcome.last_observed,
                elapsed_ms,
                limit_ms,
            });
        }

        debug!("{} responded in {} ms", case.id, elapsed_ms);
        Ok(())
    }

    async fn check_site_identity(&self, page: &dyn Page, title_pattern: &str) -> E2eResult<()> {
        let url = self.act("url", page.url()).await?;
        if !same_url(&url, &self.config.site_url) {
            return Err(E2eError::AssertionFailed(format!(
                "expected URL {}, got {}",
                self.config.site_url, url
            )));
        }

        let title = self.act("title", page.title()).await?;
        let pattern = Regex::new(title_pattern)?;
        if !pattern.is_match(&title) {
            return Err(E2eError::AssertionFailed(format!(
                "title {:?} does not match {}",
                title, title_pattern
            )));
        }

        info!("Page title is: {}", title);
        Ok(())
    }
}

fn same_url(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}
