//! swift-e2e: run the SwiftTranslator verification corpus
//!
//! Exit codes: 0 all scenarios passed, 1 some scenario failed, 2 the harness
//! itself could not run.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swifttranslator_e2e::corpus::Selection;
use swifttranslator_e2e::driver::Browser;
use swifttranslator_e2e::playwright::{BrowserKind, PlaywrightBrowser, PlaywrightConfig};
use swifttranslator_e2e::simulated::{SimulatedConfig, SimulatedSite};
use swifttranslator_e2e::{CaseKind, Corpus, HarnessConfig, ScenarioRunner};

#[derive(Parser, Debug)]
#[command(name = "swift-e2e")]
#[command(about = "E2E verification harness for SwiftTranslator")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "swift-e2e.toml")]
    config: PathBuf,

    /// Fixture file or directory (defaults to the built-in corpus)
    #[arg(short, long)]
    fixtures: Option<PathBuf>,

    /// Run only cases of this kind (positive, negative, ui)
    #[arg(short, long)]
    kind: Vec<CaseKind>,

    /// Run only the case with this id (repeatable)
    #[arg(short, long)]
    id: Vec<String>,

    /// Site to test
    #[arg(long, env = "SWIFT_E2E_SITE_URL")]
    site_url: Option<String>,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long)]
    browser: Option<BrowserKind>,

    /// Run in headless mode
    #[arg(long)]
    headless: Option<bool>,

    /// Scenarios to run concurrently
    #[arg(short, long)]
    workers: Option<usize>,

    /// Output directory for results
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Run against the in-memory simulated site instead of a browser
    #[arg(long)]
    simulate: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(url) = &self.site_url {
            config.site_url = url.clone();
        }
        if let Some(browser) = self.browser {
            config.browser = browser;
        }
        if let Some(headless) = self.headless {
            config.headless = headless;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
    }
}

fn main() {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    match rt.block_on(async_main(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> anyhow::Result<bool> {
    let mut config = HarnessConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate()?;

    let corpus = match &args.fixtures {
        Some(path) => Corpus::load(path)
            .with_context(|| format!("loading fixtures from {}", path.display()))?,
        None => Corpus::builtin()?,
    };
    let corpus = Arc::new(corpus.select(&Selection {
        kinds: args.kind.clone(),
        ids: args.id.clone(),
    })?);

    info!("Corpus '{}': {} case(s)", corpus.name(), corpus.len());

    let browser: Arc<dyn Browser> = if args.simulate {
        info!("Using simulated site");
        Arc::new(SimulatedSite::new(SimulatedConfig {
            locators: config.locators.clone(),
            ..SimulatedConfig::from_corpus(&corpus)
        }))
    } else {
        Arc::new(PlaywrightBrowser::launch(PlaywrightConfig::from(&config)).await?)
    };

    let runner = ScenarioRunner::new(browser, config);
    let report = runner.run_and_record(corpus).await?;

    Ok(report.all_passed())
}
