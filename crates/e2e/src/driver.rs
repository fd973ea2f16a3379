//! Browser seam
//!
//! The harness only talks to the SUT through these two traits. The
//! Playwright bridge implements them for real browsers and
//! [`crate::simulated`] implements them in memory.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;
use crate::locator::Locator;

/// Navigation completion signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    /// Document parsed; scripts may still be loading
    #[default]
    DomContentLoaded,
    Load,
    NetworkIdle,
}

impl WaitUntil {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::Load => "load",
            WaitUntil::NetworkIdle => "networkidle",
        }
    }
}

impl fmt::Display for WaitUntil {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A browser able to hand out isolated pages.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a page in a fresh browsing context.
    async fn new_page(&self) -> E2eResult<Box<dyn Page>>;

    async fn close(&self) -> E2eResult<()>;
}

/// A single page inside its own browsing context.
///
/// Every method taking a [`Locator`] resolves it against the live document at
/// call time.
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str, wait_until: WaitUntil, timeout: Duration) -> E2eResult<()>;

    async fn title(&self) -> E2eResult<String>;

    async fn url(&self) -> E2eResult<String>;

    /// Resolves once the element is visible, `DriverTimeout` otherwise.
    async fn wait_visible(&self, locator: &Locator, timeout: Duration) -> E2eResult<()>;

    /// Rendered (visible) text.
    async fn inner_text(&self, locator: &Locator, timeout: Duration) -> E2eResult<String>;

    /// Raw DOM text content.
    async fn text_content(&self, locator: &Locator, timeout: Duration)
        -> E2eResult<Option<String>>;

    /// Replace the whole value in one assignment.
    async fn fill(&self, locator: &Locator, value: &str) -> E2eResult<()>;

    async fn press(&self, locator: &Locator, key: &str) -> E2eResult<()>;

    /// Type per character with a delay between keystrokes.
    async fn type_text(&self, locator: &Locator, text: &str, delay: Duration) -> E2eResult<()>;

    async fn close(&self) -> E2eResult<()>;
}
