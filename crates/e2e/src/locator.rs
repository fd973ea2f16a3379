//! Element locator strategy
//!
//! A [`Locator`] is a description of how to find an element, not a handle to
//! a node. Every driver call resolves it again against the live document, so
//! the SUT re-rendering its output panel can never leave us holding a stale
//! node.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::driver::Page;
use crate::error::{E2eError, E2eResult};

/// One refinement applied to the current match set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum LocatorStep {
    /// Elements whose placeholder text matches
    Placeholder { text: String },
    /// Descendants matching a CSS selector
    Css { selector: String },
    /// Keep only elements containing the given text
    HasText { text: String },
    /// Keep only the first match
    First,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    /// Human-readable name used in diagnostics
    pub name: String,
    pub steps: Vec<LocatorStep>,
}

impl Locator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn placeholder(mut self, text: impl Into<String>) -> Self {
        self.steps.push(LocatorStep::Placeholder { text: text.into() });
        self
    }

    pub fn css(mut self, selector: impl Into<String>) -> Self {
        self.steps.push(LocatorStep::Css {
            selector: selector.into(),
        });
        self
    }

    pub fn has_text(mut self, text: impl Into<String>) -> Self {
        self.steps.push(LocatorStep::HasText { text: text.into() });
        self
    }

    pub fn first(mut self) -> Self {
        self.steps.push(LocatorStep::First);
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.name)?;
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, " >> ")?;
            }
            match step {
                LocatorStep::Placeholder { text } => write!(f, "placeholder={:?}", text)?,
                LocatorStep::Css { selector } => write!(f, "css={}", selector)?,
                LocatorStep::HasText { text } => write!(f, "has-text={:?}", text)?,
                LocatorStep::First => write!(f, "first")?,
            }
        }
        write!(f, "]")
    }
}

/// The two handles the harness needs from the SUT document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteLocators {
    /// Placeholder text of the editable input region
    pub input_placeholder: String,

    /// Language name labelling the output panel
    pub panel_label: String,

    /// Selector of the panel container
    pub panel_selector: String,

    /// Styling marker class carried by the output region
    pub output_marker_class: String,
}

impl Default for SiteLocators {
    fn default() -> Self {
        Self {
            input_placeholder: "Input Your Singlish Text Here.".to_string(),
            panel_label: "Sinhala".to_string(),
            panel_selector: ".card".to_string(),
            output_marker_class: "bg-slate-50".to_string(),
        }
    }
}

impl SiteLocators {
    pub fn input(&self) -> Locator {
        Locator::new("input").placeholder(&self.input_placeholder)
    }

    /// First marker-class descendant of the panel labelled with the language.
    pub fn output(&self) -> Locator {
        Locator::new("output")
            .css(&self.panel_selector)
            .has_text(&self.panel_label)
            .css(format!(".{}", self.output_marker_class))
            .first()
    }
}

/// Wait for the input region to become visible.
///
/// Not retried: a missing input means the page is not the SUT we expect.
pub async fn resolve_input(
    page: &dyn Page,
    locators: &SiteLocators,
    timeout: Duration,
) -> E2eResult<Locator> {
    let input = locators.input();
    debug!("Resolving {}", input);

    let not_found = |input: &Locator| E2eError::ElementNotFound {
        what: input.to_string(),
        waited_ms: timeout.as_millis() as u64,
    };
    match tokio::time::timeout(timeout, page.wait_visible(&input, timeout)).await {
        Ok(Ok(())) => Ok(input),
        Ok(Err(E2eError::DriverTimeout { .. })) | Err(_) => Err(not_found(&input)),
        Ok(Err(e)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_input_locator() {
        let input = SiteLocators::default().input();
        assert_eq!(
            input.steps,
            vec![LocatorStep::Placeholder {
                text: "Input Your Singlish Text Here.".into()
            }]
        );
    }

    #[test]
    fn test_output_scoped_to_labelled_panel() {
        let output = SiteLocators::default().output();
        assert_eq!(
            output.steps,
            vec![
                LocatorStep::Css {
                    selector: ".card".into()
                },
                LocatorStep::HasText {
                    text: "Sinhala".into()
                },
                LocatorStep::Css {
                    selector: ".bg-slate-50".into()
                },
                LocatorStep::First,
            ]
        );
        assert_eq!(
            output.to_string(),
            r#"output [css=.card >> has-text="Sinhala" >> css=.bg-slate-50 >> first]"#
        );
    }

    #[test]
    fn test_locator_wire_format() {
        let json = serde_json::to_value(SiteLocators::default().output()).unwrap();
        assert_eq!(json["steps"][0]["by"], "css");
        assert_eq!(json["steps"][1]["by"], "has_text");
        assert_eq!(json["steps"][3]["by"], "first");
    }
}
