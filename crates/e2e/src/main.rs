//! E2E runner entry point
//!
//! Runs the built-in Task Manager Pro suite (plus any YAML suites) against a
//! headless browser. Environment: `CI`, `BASE_URL`, `PERCY_SERVER_ADDRESS`,
//! `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;
use clap::Parser;
use regex::Regex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use taskpro_e2e::config::Workers;
use taskpro_e2e::playwright::{Browser, PlaywrightBrowser, PlaywrightConfig};
use taskpro_e2e::snapshot::PercyProvider;
use taskpro_e2e::visual::{BaselineProvider, VisualConfig};
use taskpro_e2e::{scenarios, E2eError, E2eResult, RunConfig, Suite, TestRunner};

#[derive(Parser, Debug)]
#[command(name = "taskpro-e2e")]
#[command(author, version, about = "E2E test runner for Task Manager Pro", long_about = None)]
struct Args {
    /// Only run scenarios whose "<suite> <scenario>" title matches this regex
    #[arg(short, long)]
    grep: Option<String>,

    /// Directory with additional YAML suites
    #[arg(long)]
    suite_dir: Option<PathBuf>,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long, default_value = "chromium")]
    browser: String,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Override the worker count
    #[arg(short, long)]
    workers: Option<usize>,

    /// Override the retry count
    #[arg(long)]
    retries: Option<u32>,

    /// Output directory for results, traces and screenshots
    #[arg(short, long, default_value = "test-results")]
    output: PathBuf,

    /// Directory whose node_modules provides playwright
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Send DOM snapshots to the local Percy agent
    #[arg(long)]
    percy: bool,

    /// Compare screenshots against local baselines
    #[arg(long)]
    baselines: bool,

    /// Overwrite local baselines with this run's screenshots
    #[arg(long, requires = "baselines")]
    update_baselines: bool,

    /// Visual diff threshold (percentage)
    #[arg(long, default_value = "0.5")]
    visual_threshold: f64,

    /// List the scenarios that would run and exit
    #[arg(long)]
    list: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

fn load_suites(args: &Args) -> E2eResult<Vec<Suite>> {
    let mut suites = vec![scenarios::task_manager_suite()];
    if let Some(dir) = &args.suite_dir {
        suites.extend(Suite::load_all(dir)?);
    }

    if let Some(pattern) = &args.grep {
        let re = Regex::new(pattern)
            .map_err(|e| E2eError::SpecParse(format!("invalid --grep pattern: {}", e)))?;
        suites = suites.into_iter().map(|s| s.filter(&re)).collect();
    }
    Ok(suites)
}

fn run_config(args: &Args) -> RunConfig {
    let mut config = RunConfig::from_env();
    if let Some(workers) = args.workers {
        config.workers = Workers::Fixed(workers);
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }
    config
}

async fn async_main(args: Args) -> E2eResult<bool> {
    let suites = load_suites(&args)?;

    if args.list {
        for suite in &suites {
            for scenario in &suite.scenarios {
                println!("{}", suite.full_title(scenario));
            }
        }
        return Ok(true);
    }

    let config = run_config(&args);
    let browser: Browser = args.browser.parse()?;
    let playwright = PlaywrightBrowser::new(PlaywrightConfig {
        browser,
        headless: !args.headed,
        viewport_width: config.project.viewport_width,
        viewport_height: config.project.viewport_height,
        action_timeout: config.action_timeout,
        project_dir: args.project_dir.clone(),
        ..Default::default()
    })?;

    info!("Target: {} ({})", config.base_url, config.project.name);
    let mut runner = TestRunner::new(config, Arc::new(playwright)).with_output_dir(&args.output);

    if args.percy {
        runner = runner.with_snapshot_provider(Arc::new(PercyProvider::from_env()?));
    }
    if args.baselines {
        let visual = BaselineProvider::new(VisualConfig {
            threshold: args.visual_threshold,
            update_baselines: args.update_baselines,
            ..VisualConfig::under(&args.output)
        })?;
        runner = runner.with_snapshot_provider(Arc::new(visual));
    }

    let report = runner.run(suites).await?;
    report.log_summary();
    report.write_json(&args.output)?;

    Ok(report.success())
}
