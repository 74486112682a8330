mod config;
mod console;
mod error;
mod models;
mod output;
mod scrapers;

use anyhow::{bail, Context};
use clap::Parser;
use config::Settings;
use console::Console;
use models::ListingLink;
use scrapers::orchestrator::{Confirmation, RunReport};
use scrapers::{
    AutoClickResolver, CancelToken, ChromeBrowser, CompositeResolver, InterstitialResolver,
    ManualPromptResolver, Orchestrator, PageLoader, RunOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Collects rental listings from immobilienscout24 search results
#[derive(Parser, Debug)]
#[command(name = "expose-scout", version)]
#[command(about = "Browser-driven scraper for real-estate listing pages", long_about = None)]
struct Args {
    /// JSON settings file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Search result URL to walk (repeatable, replaces configured searches)
    #[arg(short, long)]
    search: Vec<String>,

    /// Maximum links collected per search
    #[arg(short, long)]
    limit: Option<usize>,

    /// Where to write the JSON array of records
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write one JSON file per record into this directory
    #[arg(long)]
    raw_dir: Option<PathBuf>,

    /// Show the browser window even if the settings ask for headless
    #[arg(long)]
    headed: bool,

    /// Visit listings without asking after link collection
    #[arg(short, long)]
    yes: bool,

    /// Never prompt; interstitials are clicked away or waited out
    #[arg(long)]
    unattended: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the effective settings as JSON and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if !self.search.is_empty() {
            settings.searches = self.search.clone();
        }
        if let Some(limit) = self.limit {
            settings.limit = limit;
        }
        if let Some(output) = &self.output {
            settings.output = output.clone();
        }
        if self.raw_dir.is_some() {
            settings.raw_dir = self.raw_dir.clone();
        }
        if self.headed {
            settings.headless = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    args.apply(&mut settings);

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }
    settings.validate()?;

    info!("🏠 Expose Scout");
    info!("==========================================");
    info!(
        "{} searches, up to {} listings each",
        settings.searches.len(),
        settings.limit
    );

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if signal.is_ok() {
                        warn!("⛔ Ctrl-C received, finishing the current step...");
                        cancel.cancel();
                    }
                }
                _ = cancel.cancelled() => {}
            }
        });
    }

    let run_settings = settings.clone();
    let interactive = !args.unattended;
    let confirm = interactive && !args.yes;
    let report = tokio::task::spawn_blocking(move || {
        scrape(&run_settings, interactive, confirm, cancel)
    })
    .await
    .context("Scrape task panicked")??;

    // partial results are kept; a run stopped before any listing leaves old output alone
    if report.has_output() {
        output::write_records(&settings.output, &report.records).await?;
        if let Some(dir) = &settings.raw_dir {
            output::write_raw(dir, &report.records).await?;
        }
    } else {
        info!("Nothing collected, leaving {} untouched", settings.output.display());
    }

    match report.outcome {
        RunOutcome::Completed => {
            info!("✅ Done: {} records", report.stats.records);
            Ok(())
        }
        RunOutcome::Cancelled => {
            info!("Stopped early with {} records", report.stats.records);
            Ok(())
        }
        RunOutcome::Aborted(reason) => bail!("Scrape aborted: {reason}"),
    }
}

/// Launch Chrome and run both scrape stages; blocks until the run ends
fn scrape(
    settings: &Settings,
    interactive: bool,
    confirm: bool,
    cancel: CancelToken,
) -> anyhow::Result<RunReport> {
    let spec = settings.field_spec()?;
    let searches = settings.search_configs()?;
    let gate = settings.completeness_gate();

    let browser = ChromeBrowser::launch(&settings.chrome_options())?;
    let console = Arc::new(Console::new());

    let resolver: Box<dyn InterstitialResolver + Send + Sync> = if interactive {
        Box::new(CompositeResolver::new(
            Box::new(AutoClickResolver::new(settings.interstitials.clone())),
            Box::new(ManualPromptResolver::new(console.clone())),
        ))
    } else {
        Box::new(AutoClickResolver::new(settings.interstitials.clone()))
    };
    info!("Interstitials handled by the {} resolver", resolver.name());

    let loader = PageLoader::new(
        &browser,
        resolver.as_ref(),
        &settings.interstitials,
        settings.load_settings(),
        cancel.clone(),
    );

    let mut orchestrator = Orchestrator::new(&loader, &settings.site, &spec, &gate, settings.limits());
    if confirm {
        let confirmation: Confirmation = Box::new(move |links: &[ListingLink]| {
            console.confirm_continue(
                &format!("Collected {} listing links. Visit them now?", links.len()),
                &cancel,
            )
        });
        orchestrator = orchestrator.with_confirmation(confirmation);
    }

    Ok(orchestrator.run(&searches))
}
