//! Output extraction with a rendered-text / raw-content fallback chain

use std::time::Duration;

use tracing::warn;

use crate::driver::Page;
use crate::error::E2eResult;
use crate::locator::Locator;
use crate::normalize::{normalize_str, unify_line_endings};

/// Default bound on a single extraction attempt.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Current text of the element: rendered text first, raw text content if the
/// rendered text capability fails on the browser side. Transport failures
/// are returned as is.
pub async fn read_output(
    page: &dyn Page,
    locator: &Locator,
    timeout: Duration,
) -> E2eResult<String> {
    let text = match page.inner_text(locator, timeout).await {
        Ok(text) => text,
        Err(e) if e.is_retryable_read() => {
            warn!("innerText unavailable on {}: {}; falling back to textContent", locator.name, e);
            page.text_content(locator, timeout).await?.unwrap_or_default()
        }
        Err(e) => return Err(e),
    };
    Ok(unify_line_endings(&text))
}

/// [`read_output`] followed by normalization.
pub async fn read_normalized(
    page: &dyn Page,
    locator: &Locator,
    timeout: Duration,
) -> E2eResult<String> {
    read_output(page, locator, timeout).await.map(|t| normalize_str(&t))
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::driver::WaitUntil;
    use crate::error::E2eError;

    /// Page whose output reads are scripted per capability.
    struct ScriptedPage {
        inner: fn() -> E2eResult<String>,
        content: fn() -> E2eResult<Option<String>>,
    }

    #[async_trait]
    impl Page for ScriptedPage {
        async fn goto(&self, _: &str, _: WaitUntil, _: Duration) -> E2eResult<()> {
            Ok(())
        }
        async fn title(&self) -> E2eResult<String> {
            Ok(String::new())
        }
        async fn url(&self) -> E2eResult<String> {
            Ok(String::new())
        }
        async fn wait_visible(&self, _: &Locator, _: Duration) -> E2eResult<()> {
            Ok(())
        }
        async fn inner_text(&self, _: &Locator, _: Duration) -> E2eResult<String> {
            (self.inner)()
        }
        async fn text_content(&self, _: &Locator, _: Duration) -> E2eResult<Option<String>> {
            (self.content)()
        }
        async fn fill(&self, _: &Locator, _: &str) -> E2eResult<()> {
            Ok(())
        }
        async fn press(&self, _: &Locator, _: &str) -> E2eResult<()> {
            Ok(())
        }
        async fn type_text(&self, _: &Locator, _: &str, _: Duration) -> E2eResult<()> {
            Ok(())
        }
        async fn close(&self) -> E2eResult<()> {
            Ok(())
        }
    }

    fn output() -> Locator {
        Locator::new("output").css(".out")
    }

    #[tokio::test]
    async fn test_rendered_text_wins() {
        let page = ScriptedPage {
            inner: || Ok("  මම\r\nයමි ".into()),
            content: || panic!("fallback must not run"),
        };
        let raw = read_output(&page, &output(), DEFAULT_READ_TIMEOUT).await.unwrap();
        assert_eq!(raw, "  මම\nයමි ");
        let normalized = read_normalized(&page, &output(), DEFAULT_READ_TIMEOUT).await.unwrap();
        assert_eq!(normalized, "මම\nයමි");
    }

    #[tokio::test]
    async fn test_falls_back_to_raw_content() {
        let page = ScriptedPage {
            inner: || Err(E2eError::driver("innerText", "not rendered")),
            content: || Ok(Some("අපි\r\n".into())),
        };
        assert_eq!(read_output(&page, &output(), DEFAULT_READ_TIMEOUT).await.unwrap(), "අපි\n");
    }

    #[tokio::test]
    async fn test_absent_content_reads_empty() {
        let page = ScriptedPage {
            inner: || Err(E2eError::DriverTimeout {
                op: "innerText".into(),
                message: "timed out".into(),
            }),
            content: || Ok(None),
        };
        assert_eq!(read_output(&page, &output(), DEFAULT_READ_TIMEOUT).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_masked() {
        let page = ScriptedPage {
            inner: || Err(E2eError::BridgeClosed),
            content: || Ok(Some("stale".into())),
        };
        let err = read_output(&page, &output(), DEFAULT_READ_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, E2eError::BridgeClosed));
    }
}
