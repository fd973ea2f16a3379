//! In-memory stand-in for the SwiftTranslator page
//!
//! Implements the browser seam over a lookup table with a debounce delay.
//! Output becomes visible only once the debounce has elapsed on the tokio
//! clock, so paused-time tests see the same "no completion signal" behaviour
//! as the real site.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::corpus::{CaseKind, Corpus};
use crate::driver::{Browser, Page, WaitUntil};
use crate::error::{E2eError, E2eResult};
use crate::locator::{Locator, SiteLocators};

/// What the simulated SUT renders for inputs missing from its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unknown {
    /// Render the input unchanged
    #[default]
    Echo,
    /// Render nothing
    Blank,
}

#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Input text -> rendered output
    pub table: HashMap<String, String>,
    pub unknown: Unknown,
    /// Debounce between the last input event and the output update
    pub latency: Duration,
    /// Whether a bulk fill fires the input listener
    pub fill_fires_listener: bool,
    /// Make `inner_text` fail so readers must fall back to `text_content`
    pub inner_text_unavailable: bool,
    /// Render output with CRLF line endings and padding whitespace
    pub decorate_output: bool,
    pub input_present: bool,
    /// When false the output never updates
    pub responds: bool,
    /// When false emptying the input leaves the last output in place
    pub clears_on_empty: bool,
    pub title: String,
    pub locators: SiteLocators,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            table: HashMap::new(),
            unknown: Unknown::Echo,
            latency: Duration::from_millis(300),
            fill_fires_listener: true,
            inner_text_unavailable: false,
            decorate_output: false,
            input_present: true,
            responds: true,
            clears_on_empty: true,
            title: "SwiftTranslator - Singlish to Sinhala Translator".to_string(),
            locators: SiteLocators::default(),
        }
    }
}

impl SimulatedConfig {
    /// A site that renders every corpus case's expected output.
    pub fn from_corpus(corpus: &Corpus) -> Self {
        let mut table = HashMap::new();
        for case in corpus.cases() {
            if matches!(case.kind, CaseKind::Positive | CaseKind::Negative) {
                table.insert(case.input.clone(), case.expected.clone());
            }
        }
        Self {
            table,
            ..Self::default()
        }
    }

    pub fn with_entry(mut self, input: &str, output: &str) -> Self {
        self.table.insert(input.to_string(), output.to_string());
        self
    }

    fn render(&self, input: &str) -> String {
        if input.trim().is_empty() {
            return String::new();
        }
        let out = match self.table.get(input) {
            Some(out) => out.clone(),
            None => match self.unknown {
                Unknown::Echo => input.to_string(),
                Unknown::Blank => String::new(),
            },
        };
        if self.decorate_output && !out.is_empty() {
            format!("\r\n  {}  \r\n", out.replace('\n', "\r\n"))
        } else {
            out
        }
    }
}

/// Browser handing out pages of the simulated site.
#[derive(Debug, Clone)]
pub struct SimulatedSite {
    config: Arc<SimulatedConfig>,
    pages_opened: Arc<AtomicUsize>,
    pages_open: Arc<AtomicUsize>,
}

impl SimulatedSite {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config: Arc::new(config),
            pages_opened: Arc::new(AtomicUsize::new(0)),
            pages_open: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn pages_opened(&self) -> usize {
        self.pages_opened.load(Ordering::SeqCst)
    }

    /// Pages not yet closed.
    pub fn pages_open(&self) -> usize {
        self.pages_open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Browser for SimulatedSite {
    async fn new_page(&self) -> E2eResult<Box<dyn Page>> {
        self.pages_opened.fetch_add(1, Ordering::SeqCst);
        self.pages_open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimulatedPage {
            config: self.config.clone(),
            open: self.pages_open.clone(),
            state: Mutex::new(PageState::default()),
        }))
    }

    async fn close(&self) -> E2eResult<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PageState {
    url: Option<String>,
    input: String,
    output: String,
    pending: Option<(String, Instant)>,
    closed: bool,
}

pub struct SimulatedPage {
    config: Arc<SimulatedConfig>,
    open: Arc<AtomicUsize>,
    state: Mutex<PageState>,
}

enum Target {
    Input,
    Output,
}

impl SimulatedPage {
    fn target(&self, locator: &Locator) -> E2eResult<Target> {
        let state = self.state.lock();
        if state.closed {
            return Err(E2eError::driver("resolve", "page has been closed"));
        }
        if state.url.is_none() {
            return Err(E2eError::driver("resolve", "no document loaded"));
        }
        drop(state);

        if *locator == self.config.locators.input() && self.config.input_present {
            Ok(Target::Input)
        } else if *locator == self.config.locators.output() {
            Ok(Target::Output)
        } else {
            Err(E2eError::driver("resolve", format!("no element matches {}", locator)))
        }
    }

    fn input_only(&self, locator: &Locator, op: &str) -> E2eResult<()> {
        match self.target(locator)? {
            Target::Input => Ok(()),
            Target::Output => Err(E2eError::driver(op, "output region is not editable")),
        }
    }

    /// Input listener: restart the debounce with the current input.
    fn on_input(&self, state: &mut PageState) {
        if !self.config.responds {
            return;
        }
        if !self.config.clears_on_empty && state.input.trim().is_empty() {
            state.pending = None;
            return;
        }
        let rendered = self.config.render(&state.input);
        state.pending = Some((rendered, Instant::now() + self.config.latency));
    }

    fn settled_output(&self) -> String {
        let mut state = self.state.lock();
        let ready = matches!(&state.pending, Some((_, at)) if Instant::now() >= *at);
        if ready {
            if let Some((rendered, _)) = state.pending.take() {
                state.output = rendered;
            }
        }
        state.output.clone()
    }
}

#[async_trait]
impl Page for SimulatedPage {
    async fn goto(&self, url: &str, wait_until: WaitUntil, _timeout: Duration) -> E2eResult<()> {
        debug!("simulated goto {} ({})", url, wait_until);
        let mut state = self.state.lock();
        if state.closed {
            return Err(E2eError::Navigation("page has been closed".into()));
        }
        *state = PageState {
            url: Some(url.to_string()),
            ..PageState::default()
        };
        Ok(())
    }

    async fn title(&self) -> E2eResult<String> {
        Ok(self.config.title.clone())
    }

    async fn url(&self) -> E2eResult<String> {
        Ok(self.state.lock().url.clone().unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn wait_visible(&self, locator: &Locator, timeout: Duration) -> E2eResult<()> {
        match self.target(locator) {
            Ok(_) => Ok(()),
            Err(_) => {
                sleep(timeout).await;
                Err(E2eError::DriverTimeout {
                    op: "waitFor".into(),
                    message: format!("{} not visible after {} ms", locator, timeout.as_millis()),
                })
            }
        }
    }

    async fn inner_text(&self, locator: &Locator, _timeout: Duration) -> E2eResult<String> {
        let target = self.target(locator)?;
        if self.config.inner_text_unavailable {
            return Err(E2eError::driver(
                "innerText",
                "innerText is not available in this rendering state",
            ));
        }
        match target {
            Target::Output => Ok(self.settled_output()),
            Target::Input => Ok(self.state.lock().input.clone()),
        }
    }

    async fn text_content(
        &self,
        locator: &Locator,
        _timeout: Duration,
    ) -> E2eResult<Option<String>> {
        match self.target(locator)? {
            Target::Output => {
                let out = self.settled_output();
                Ok(if out.is_empty() { None } else { Some(out) })
            }
            Target::Input => Ok(None),
        }
    }

    async fn fill(&self, locator: &Locator, value: &str) -> E2eResult<()> {
        self.input_only(locator, "fill")?;
        let mut state = self.state.lock();
        state.input = value.to_string();
        if self.config.fill_fires_listener {
            self.on_input(&mut state);
        }
        Ok(())
    }

    async fn press(&self, locator: &Locator, key: &str) -> E2eResult<()> {
        self.input_only(locator, "press")?;
        let mut state = self.state.lock();
        match key {
            "Space" => state.input.push(' '),
            "Backspace" => {
                state.input.pop();
            }
            other => return Err(E2eError::driver("press", format!("unsupported key {}", other))),
        }
        self.on_input(&mut state);
        Ok(())
    }

    async fn type_text(&self, locator: &Locator, text: &str, delay: Duration) -> E2eResult<()> {
        self.input_only(locator, "type")?;
        for ch in text.chars() {
            {
                let mut state = self.state.lock();
                state.input.push(ch);
                self.on_input(&mut state);
            }
            sleep(delay).await;
        }
        Ok(())
    }

    async fn close(&self) -> E2eResult<()> {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
