//! SwiftTranslator E2E Verification Harness
//!
//! This crate treats the SwiftTranslator Singlish to Sinhala converter as a
//! black box reached through a browser and checks that:
//! - a case's input, typed or bulk-filled, eventually renders the expected
//!   Sinhala output
//! - clearing the input clears the output
//! - the output reacts to input within a tight latency ceiling
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   ScenarioRunner (per case)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  goto(site, domcontentloaded)                               │
//! │  resolve_input(placeholder)          -> ElementNotFound     │
//! │  apply_input(fill | type) + trigger_reevaluation            │
//! │  poll_until(read -> normalize -> predicate, deadline)       │
//! │    ├── NonEmpty        (responsiveness before correctness)  │
//! │    ├── Equals(expected)                                     │
//! │    ├── Empty           (clear check)                        │
//! │    └── ChangedFrom(b)  (latency ceiling)                    │
//! │  Verdict { id, passed, failure { class, last_observed } }   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Browser / Page traits                                      │
//! │    ├── PlaywrightBrowser (node bridge, JSON lines)          │
//! │    └── SimulatedSite     (in-memory debounced SUT)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod corpus;
pub mod driver;
pub mod error;
pub mod locator;
pub mod normalize;
pub mod playwright;
pub mod poll;
pub mod reader;
pub mod report;
pub mod scenario;
pub mod simulated;
pub mod trigger;

pub use config::HarnessConfig;
pub use corpus::{CaseKind, CaseRecord, Corpus, UiCheck};
pub use error::{E2eError, E2eResult};
pub use normalize::normalize;
pub use poll::{poll_until, Expectation, PollOptions, PollOutcome, PollStage};
pub use report::{SuiteReport, Verdict};
pub use scenario::ScenarioRunner;
