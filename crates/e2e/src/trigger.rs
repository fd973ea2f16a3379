//! Input application and the forced re-evaluation workaround
//!
//! The SUT recomputes its output from a listener bound to typing events.
//! A bulk value assignment does not always fire it, so after a fill we press
//! a space and delete it again. The workaround lives only here; if the SUT's
//! event model changes, drop [`trigger_reevaluation`] and the `Fill` path
//! keeps working unchanged.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::driver::Page;
use crate::error::E2eResult;
use crate::locator::Locator;

/// How the case text reaches the input region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InputMode {
    /// Clear, then assign the whole value at once
    #[default]
    Fill,
    /// Clear, then type per character
    Type {
        #[serde(default = "default_type_delay")]
        delay_ms: u64,
    },
}

fn default_type_delay() -> u64 {
    50
}

/// No-op edit (insert a space, delete it) to make the input listener fire.
pub async fn trigger_reevaluation(page: &dyn Page, input: &Locator) -> E2eResult<()> {
    debug!("Forcing re-evaluation on {}", input.name);
    page.press(input, "Space").await?;
    page.press(input, "Backspace").await
}

/// Set the input to `text`, clearing prior content first.
///
/// `force` applies [`trigger_reevaluation`] after a fill. It is ignored for
/// typed input, which fires the listener naturally.
pub async fn apply_input(
    page: &dyn Page,
    input: &Locator,
    text: &str,
    mode: InputMode,
    force: bool,
) -> E2eResult<()> {
    match mode {
        InputMode::Fill => {
            page.fill(input, text).await?;
            if force {
                trigger_reevaluation(page, input).await?;
            }
        }
        InputMode::Type { delay_ms } => {
            page.fill(input, "").await?;
            page.type_text(input, text, Duration::from_millis(delay_ms)).await?;
        }
    }
    Ok(())
}
