// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments and build the run configuration
// 2. Set up logging, the HTTP client and Ctrl-C cancellation
// 3. Prepare the output folder and run the mirror
// 4. Print the report and exit (0 = run finished, 2 = setup error)
// =============================================================================

mod cli;
mod config;
mod convert;
mod fetch;
mod mirror;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::Cli;
use fetch::Fetcher;
use mirror::{Mirror, MirrorReport};

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.to_config()?;
    config.validate()?;
    let start = config.start_url()?;

    let fetcher = Fetcher::new(config.request_timeout()).context("failed to build HTTP client")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping the crawl now");
                cancel.cancel();
            }
        }
    });

    let mirror = Mirror::new(&config, fetcher, cancel)?;
    mirror
        .prepare_output(config.clear)
        .await
        .with_context(|| format!("failed to prepare {:?}", mirror.site_folder()))?;

    info!(
        "Mirroring {} from {} into {:?} (max {} pages)",
        config.domain,
        start,
        mirror.site_folder(),
        config.max_pages
    );

    let report = mirror.run(start).await;
    print_report(&report, cli.json)?;

    Ok(0)
}

// Logs go to stderr so --json output on stdout stays parseable
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_report(report: &MirrorReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print_summary(report);
    }
    Ok(())
}

fn print_summary(report: &MirrorReport) {
    println!();
    println!("📊 Summary:");
    println!("   📄 Pages written: {}", report.pages_written);
    println!("   🖼️  Images downloaded: {}", report.images_downloaded);
    println!("   ♻️  Images reused: {}", report.images_reused);
    println!("   🔁 Duplicates skipped: {}", report.duplicates_skipped);
    println!("   🚫 Pages ignored: {}", report.pages_filtered);
    println!("   📦 Non-HTML links skipped: {}", report.pages_not_html);
    println!("   🔗 Links discovered: {}", report.links_discovered);
    println!("   ❌ Failed: {} page(s), {} image(s)", report.pages_failed, report.images_failed);

    if report.limit_reached {
        println!("   ⚠️  Page limit reached, the mirror is incomplete");
    }
    if report.cancelled {
        println!("   ⏹️  Cancelled before the crawl finished");
    }
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why does main() not return Result?
//    - We want our own exit codes: 0 when the run finished (even if some
//      pages failed, those are in the summary) and 2 when setup failed
//    - std::process::exit() lets us pick the code explicitly
//
// 2. What is a CancellationToken?
//    - A cheap, cloneable flag from tokio-util
//    - The Ctrl-C task calls cancel(); the crawl checks it between pages and
//      abandons in-flight requests through tokio::select!
//
// 3. Why EnvFilter?
//    - RUST_LOG=site_mirror=debug (or any tracing filter) overrides --verbose
//      without a rebuild
// -----------------------------------------------------------------------------
