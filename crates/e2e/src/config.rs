//! Harness configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::locator::SiteLocators;
use crate::playwright::BrowserKind;

/// Upper bound on the responsiveness deadline; anything looser stops
/// measuring debounce latency.
pub const MAX_RESPONSIVENESS_MS: u64 = 2000;

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Navigation target
    pub site_url: String,

    /// Browser engine
    pub browser: BrowserKind,

    /// Run without a visible window
    pub headless: bool,

    /// Viewport size for every page
    pub viewport: Viewport,

    /// Scenarios allowed to run at once
    pub workers: usize,

    /// Directory for test-results.json
    pub output_dir: PathBuf,

    /// Directory whose node_modules provides `playwright`
    pub node_project_dir: PathBuf,

    /// Element locators
    pub locators: SiteLocators,

    /// Per-stage deadlines
    pub timeouts: Timeouts,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            site_url: "https://www.swifttranslator.com/".to_string(),
            browser: BrowserKind::Chromium,
            headless: true,
            viewport: Viewport::default(),
            workers: 4,
            output_dir: PathBuf::from("test-results"),
            node_project_dir: PathBuf::from("."),
            locators: SiteLocators::default(),
            timeouts: Timeouts::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Deadlines in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Input region must become visible within this
    pub element_visible_ms: u64,

    /// Positive cases: any output must appear
    pub appear_ms: u64,

    /// Positive cases: output must equal expected
    pub match_ms: u64,

    /// Negative cases: output must equal expected
    pub negative_match_ms: u64,

    /// Clear check: output from the seed text must appear
    pub seed_appear_ms: u64,

    /// Clear check: output must empty after the input is cleared
    pub clear_ms: u64,

    /// Responsiveness check: output must change from baseline
    pub responsiveness_ms: u64,

    pub navigation_ms: u64,

    /// Bound on a single output read
    pub read_ms: u64,

    /// Bound on any other browser step: opening and closing a page, filling,
    /// key presses, reading the title or URL. Typed input adds its per
    /// character delay on top.
    pub action_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            element_visible_ms: 10_000,
            appear_ms: 30_000,
            match_ms: 30_000,
            negative_match_ms: 20_000,
            seed_appear_ms: 20_000,
            clear_ms: 15_000,
            responsiveness_ms: 2_000,
            navigation_ms: 30_000,
            read_ms: 1_000,
            action_ms: 10_000,
        }
    }
}

impl Timeouts {
    pub fn element_visible(&self) -> Duration {
        Duration::from_millis(self.element_visible_ms)
    }

    pub fn appear(&self) -> Duration {
        Duration::from_millis(self.appear_ms)
    }

    pub fn matched(&self) -> Duration {
        Duration::from_millis(self.match_ms)
    }

    pub fn negative_match(&self) -> Duration {
        Duration::from_millis(self.negative_match_ms)
    }

    pub fn seed_appear(&self) -> Duration {
        Duration::from_millis(self.seed_appear_ms)
    }

    pub fn clear(&self) -> Duration {
        Duration::from_millis(self.clear_ms)
    }

    pub fn responsiveness(&self) -> Duration {
        Duration::from_millis(self.responsiveness_ms)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }

    pub fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    fn all(&self) -> [(&'static str, u64); 10] {
        [
            ("element_visible_ms", self.element_visible_ms),
            ("appear_ms", self.appear_ms),
            ("match_ms", self.match_ms),
            ("negative_match_ms", self.negative_match_ms),
            ("seed_appear_ms", self.seed_appear_ms),
            ("clear_ms", self.clear_ms),
            ("responsiveness_ms", self.responsiveness_ms),
            ("navigation_ms", self.navigation_ms),
            ("read_ms", self.read_ms),
            ("action_ms", self.action_ms),
        ]
    }
}

impl HarnessConfig {
    /// Load configuration from file. A missing file yields the defaults.
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> E2eResult<()> {
        if !(self.site_url.starts_with("http://") || self.site_url.starts_with("https://")) {
            return Err(E2eError::Config(format!(
                "site_url must be an http(s) URL, got {:?}",
                self.site_url
            )));
        }
        if self.workers == 0 {
            return Err(E2eError::Config("workers must be at least 1".into()));
        }
        for (name, value) in self.timeouts.all() {
            if value == 0 {
                return Err(E2eError::Config(format!("timeouts.{} must be positive", name)));
            }
        }
        if self.timeouts.responsiveness_ms > MAX_RESPONSIVENESS_MS {
            return Err(E2eError::Config(format!(
                "timeouts.responsiveness_ms must be at most {} ms",
                MAX_RESPONSIVENESS_MS
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = HarnessConfig::default();
        config.validate().unwrap();
        assert_eq!(config.timeouts.element_visible(), Duration::from_secs(10));
        assert_eq!(config.timeouts.clear(), Duration::from_secs(15));
        assert_eq!(config.timeouts.responsiveness(), Duration::from_millis(2000));
        assert_eq!(config.timeouts.action(), Duration::from_secs(10));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.site_url, "https://www.swifttranslator.com/");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.toml");
        std::fs::write(
            &path,
            r#"
site_url = "http://127.0.0.1:5173/"
workers = 2

[timeouts]
match_ms = 45000
"#,
        )
        .unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.site_url, "http://127.0.0.1:5173/");
        assert_eq!(config.workers, 2);
        assert_eq!(config.timeouts.match_ms, 45_000);
        assert_eq!(config.timeouts.appear_ms, 30_000);
        assert_eq!(config.locators.panel_label, "Sinhala");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/harness.toml");
        let mut config = HarnessConfig::default();
        config.browser = BrowserKind::Firefox;
        config.save(&path).unwrap();

        let loaded = HarnessConfig::load(&path).unwrap();
        assert_eq!(loaded.browser, BrowserKind::Firefox);
    }

    #[test]
    fn test_validate_rejects_loose_responsiveness_deadline() {
        let mut config = HarnessConfig::default();
        config.timeouts.responsiveness_ms = 5_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout_and_workers() {
        let mut config = HarnessConfig::default();
        config.timeouts.clear_ms = 0;
        assert!(config.validate().unwrap_err().to_string().contains("clear_ms"));

        let mut config = HarnessConfig::default();
        config.workers = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.site_url = "swifttranslator.com".into();
        assert!(config.validate().is_err());
    }
}
