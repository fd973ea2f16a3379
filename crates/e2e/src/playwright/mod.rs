//! Playwright browser automation
//!
//! A long-lived `node` process runs `bridge.js` and executes one Playwright
//! call per JSON request line. Replies carry the request id, so any number of
//! pages can have calls in flight at once.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command as TokioCommand};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::driver::{Browser, Page, WaitUntil};
use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;

const BRIDGE_SCRIPT: &str = include_str!("bridge.js");

/// Grace period for the bridge to exit after `close` before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrowserKind {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" | "safari" => Ok(BrowserKind::Webkit),
            other => Err(E2eError::Config(format!("unknown browser: {}", other))),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: BrowserKind,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Working directory of the bridge; `playwright` is resolved from here
    pub node_project_dir: PathBuf,
    pub node_binary: PathBuf,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: BrowserKind::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_project_dir: PathBuf::from("."),
            node_binary: PathBuf::from("node"),
        }
    }
}

impl From<&HarnessConfig> for PlaywrightConfig {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            browser: config.browser,
            headless: config.headless,
            viewport_width: config.viewport.width,
            viewport_height: config.viewport.height,
            node_project_dir: config.node_project_dir.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: u64,
    op: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct Reply {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<ReplyError>,
}

#[derive(Debug, Deserialize)]
struct ReplyError {
    kind: String,
    message: String,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// The running node process and its request multiplexer.
struct Bridge {
    stdin: AsyncMutex<ChildStdin>,
    child: AsyncMutex<Child>,
    pending: Pending,
    next_id: AtomicU64,
    // Holds bridge.js on disk for the lifetime of the process
    _script_dir: tempfile::TempDir,
}

impl Bridge {
    async fn spawn(config: &PlaywrightConfig) -> E2eResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        debug!("Starting Playwright bridge: {}", script_path.display());

        let mut child = TokioCommand::new(&config.node_binary)
            .arg(&script_path)
            .current_dir(&config.node_project_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                E2eError::Playwright(format!(
                    "failed to spawn {}: {}",
                    config.node_binary.display(),
                    e
                ))
            })?;

        let stdin = child.stdin.take().ok_or(E2eError::BridgeClosed)?;
        let stdout = child.stdout.take().ok_or(E2eError::BridgeClosed)?;
        let stderr = child.stderr.take().ok_or(E2eError::BridgeClosed)?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        let routes = pending.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<Reply>(&line) {
                    Ok(reply) => {
                        if let Some(tx) = routes.lock().remove(&reply.id) {
                            let _ = tx.send(reply);
                        }
                    }
                    Err(_) => debug!("[bridge] {}", line),
                }
            }
            // Dropping the senders wakes every waiter with BridgeClosed
            routes.lock().clear();
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!("[bridge] {}", line);
            }
        });

        Ok(Self {
            stdin: AsyncMutex::new(stdin),
            child: AsyncMutex::new(child),
            pending,
            next_id: AtomicU64::new(1),
            _script_dir: script_dir,
        })
    }

    async fn call(&self, op: &str, params: Value) -> E2eResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let mut line = serde_json::to_string(&Request { id, op, params })?;
        line.push('\n');

        {
            let mut stdin = self.stdin.lock().await;
            let written = match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                self.pending.lock().remove(&id);
                debug!("Bridge write failed for {}: {}", op, e);
                return Err(E2eError::BridgeClosed);
            }
        }

        let reply = rx.await.map_err(|_| E2eError::BridgeClosed)?;
        if reply.ok {
            return Ok(reply.result);
        }

        let (kind, message) = match reply.error {
            Some(err) => (err.kind, err.message),
            None => ("error".to_string(), "no error detail".to_string()),
        };
        let op = op.to_string();
        Err(if kind == "timeout" {
            E2eError::DriverTimeout { op, message }
        } else {
            E2eError::Driver { op, message }
        })
    }

    async fn shutdown(&self) -> E2eResult<()> {
        match tokio::time::timeout(SHUTDOWN_GRACE, self.call("close", json!({}))).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("Bridge close request failed: {}", e),
            Err(_) => warn!("Bridge ignored close request for {:?}", SHUTDOWN_GRACE),
        }

        let mut child = self.child.lock().await;
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(status) => {
                debug!("Bridge exited: {:?}", status?);
            }
            Err(_) => {
                warn!("Bridge did not exit within {:?}; killing it", SHUTDOWN_GRACE);
                child.kill().await?;
            }
        }
        Ok(())
    }
}

/// Browser driven through Playwright.
pub struct PlaywrightBrowser {
    bridge: Arc<Bridge>,
    config: PlaywrightConfig,
}

impl PlaywrightBrowser {
    /// Verify Playwright is installed, start the bridge and launch the
    /// browser.
    pub async fn launch(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed()?;

        let bridge = Arc::new(Bridge::spawn(&config).await?);
        let launched = bridge
            .call(
                "launch",
                json!({ "browser": config.browser.as_str(), "headless": config.headless }),
            )
            .await
            .map_err(|e| {
                E2eError::Playwright(format!("failed to launch {}: {}", config.browser, e))
            })?;

        info!(
            "Launched {} {} (headless: {})",
            config.browser,
            launched["version"].as_str().unwrap_or("?"),
            config.headless
        );

        Ok(Self { bridge, config })
    }

    /// Check if Playwright is installed
    fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }
}

#[async_trait]
impl Browser for PlaywrightBrowser {
    async fn new_page(&self) -> E2eResult<Box<dyn Page>> {
        let result = self
            .bridge
            .call(
                "newPage",
                json!({
                    "viewport": {
                        "width": self.config.viewport_width,
                        "height": self.config.viewport_height,
                    }
                }),
            )
            .await?;

        let id = result["page"]
            .as_str()
            .ok_or_else(|| E2eError::Playwright("newPage returned no page id".into()))?
            .to_string();

        debug!("Opened page {}", id);
        Ok(Box::new(PlaywrightPage {
            bridge: self.bridge.clone(),
            id,
        }))
    }

    async fn close(&self) -> E2eResult<()> {
        self.bridge.shutdown().await
    }
}

/// One page in its own browser context.
pub struct PlaywrightPage {
    bridge: Arc<Bridge>,
    id: String,
}

impl PlaywrightPage {
    async fn call(&self, op: &str, mut params: Value) -> E2eResult<Value> {
        params["page"] = Value::String(self.id.clone());
        self.bridge.call(op, params).await
    }

    async fn call_on(&self, op: &str, locator: &Locator, mut params: Value) -> E2eResult<Value> {
        params["locator"] = serde_json::to_value(locator)?;
        self.call(op, params).await
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

#[async_trait]
impl Page for PlaywrightPage {
    async fn goto(&self, url: &str, wait_until: WaitUntil, timeout: Duration) -> E2eResult<()> {
        self.call(
            "goto",
            json!({ "url": url, "waitUntil": wait_until.as_str(), "timeoutMs": millis(timeout) }),
        )
        .await
        .map(|_| ())
        .map_err(|e| match e {
            E2eError::Driver { message, .. } | E2eError::DriverTimeout { message, .. } => {
                E2eError::Navigation(format!("{}: {}", url, message))
            }
            other => other,
        })
    }

    async fn title(&self) -> E2eResult<String> {
        let result = self.call("title", json!({})).await?;
        Ok(result["value"].as_str().unwrap_or_default().to_string())
    }

    async fn url(&self) -> E2eResult<String> {
        let result = self.call("url", json!({})).await?;
        Ok(result["value"].as_str().unwrap_or_default().to_string())
    }

    async fn wait_visible(&self, locator: &Locator, timeout: Duration) -> E2eResult<()> {
        self.call_on("waitVisible", locator, json!({ "timeoutMs": millis(timeout) }))
            .await
            .map(|_| ())
    }

    async fn inner_text(&self, locator: &Locator, timeout: Duration) -> E2eResult<String> {
        let result = self
            .call_on("innerText", locator, json!({ "timeoutMs": millis(timeout) }))
            .await?;
        result["value"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| E2eError::driver("innerText", "no text returned"))
    }

    async fn text_content(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> E2eResult<Option<String>> {
        let result = self
            .call_on("textContent", locator, json!({ "timeoutMs": millis(timeout) }))
            .await?;
        Ok(result["value"].as_str().map(str::to_string))
    }

    async fn fill(&self, locator: &Locator, value: &str) -> E2eResult<()> {
        self.call_on("fill", locator, json!({ "value": value })).await.map(|_| ())
    }

    async fn press(&self, locator: &Locator, key: &str) -> E2eResult<()> {
        self.call_on("press", locator, json!({ "key": key })).await.map(|_| ())
    }

    async fn type_text(&self, locator: &Locator, text: &str, delay: Duration) -> E2eResult<()> {
        self.call_on("type", locator, json!({ "text": text, "delayMs": millis(delay) }))
            .await
            .map(|_| ())
    }

    async fn close(&self) -> E2eResult<()> {
        debug!("Closing page {}", self.id);
        self.call("closePage", json!({})).await.map(|_| ())
    }
}
