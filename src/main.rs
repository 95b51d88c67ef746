use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use jobscout::config::Config;
use jobscout::discovery::{DiscoveryDriver, HostRateLimiter, HttpSearchBrowser};
use jobscout::domain::{Preferences, ResumeSource, RunInput, RunPhase, RunState, RunSummary};
use jobscout::llm::{AnthropicClient, LlmClient};
use jobscout::orchestrator::{CheckpointStore, FileCheckpointStore, Orchestrator};
use jobscout::planner::QueryPlanner;
use jobscout::profile::ProfileBuilder;
use jobscout::scoring::{FitScorer, KeywordFitScorer, LlmFitScorer, ScoringBackend};
use jobscout::storage::{Deduplicator, export_results, open_store};

mod cli;

use cli::Cli;
use cli::commands::Commands;

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jobscout")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("jobscout.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn build_orchestrator(config: &Config, cancel: CancellationToken) -> Result<Orchestrator> {
    let store = open_store(config.storage.backend, &config.storage.listings_dir()).context("Failed to open listing store")?;
    let checkpoints =
        Arc::new(FileCheckpointStore::new(config.storage.runs_dir()).context("Failed to open checkpoint directory")?);

    let browser = HttpSearchBrowser::new(
        config.browser.endpoint.clone(),
        std::time::Duration::from_millis(config.browser.timeout_ms),
    )
    .context("Failed to create browse client")?;
    let limiter = Arc::new(HostRateLimiter::new(config.rate_limit()));
    let driver = DiscoveryDriver::new(Arc::new(browser), limiter, config.retry_policy());

    let needs_llm = config.llm.enabled || config.scoring.backend == ScoringBackend::Llm;
    let llm: Option<Arc<dyn LlmClient>> = if needs_llm {
        let client = AnthropicClient::new(config.llm.anthropic()).context("Failed to create model client")?;
        Some(Arc::new(client))
    } else {
        None
    };

    let mut profiles = ProfileBuilder::new();
    let mut planner = QueryPlanner::new(config.run.max_reissue);
    if config.llm.enabled
        && let Some(llm) = &llm
    {
        profiles = ProfileBuilder::with_llm(llm.clone());
        planner = planner.with_llm(llm.clone());
    }

    let scorer: Arc<dyn FitScorer> = match (config.scoring.backend, &llm) {
        (ScoringBackend::Llm, Some(llm)) => Arc::new(
            LlmFitScorer::new(llm.clone())
                .with_batch_size(config.scoring.batch_size)
                .with_model_weight(config.scoring.model_weight),
        ),
        _ => Arc::new(KeywordFitScorer),
    };

    Ok(Orchestrator::new(driver, Deduplicator::new(store), scorer, checkpoints)
        .with_settings(config.run_settings())
        .with_profile_builder(profiles)
        .with_planner(planner)
        .with_cancel_token(cancel))
}

fn load_preferences(path: &Path) -> Result<Preferences> {
    let content = fs::read_to_string(path).context(format!("Failed to read preferences {}", path.display()))?;
    serde_yaml::from_str(&content).context(format!("Failed to parse preferences {}", path.display()))
}

fn load_run(config: &Config, run_id: &str) -> Result<RunState> {
    let checkpoints = FileCheckpointStore::new(config.storage.runs_dir()).context("Failed to open checkpoint directory")?;
    checkpoints
        .load(run_id)
        .context("Failed to read checkpoint")?
        .ok_or_else(|| eyre::eyre!("No run named {}", run_id))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling...".yellow());
            token.cancel();
        }
    });
    cancel
}

fn print_summary(summary: &RunSummary) {
    let phase = match summary.phase {
        RunPhase::Done => summary.phase.as_str().green(),
        RunPhase::Failed => summary.phase.as_str().red(),
        RunPhase::Cancelled => summary.phase.as_str().yellow(),
        _ => summary.phase.as_str().cyan(),
    };
    println!("{} {}", "Run".bold(), summary.run_id.bold());
    println!("  phase:    {}", phase);
    if let Some(reason) = summary.stop_reason {
        println!("  stopped:  {}", reason);
    }
    println!(
        "  queries:  {} attempted / {} planned, {} failed",
        summary.queries_attempted, summary.queries_planned, summary.queries_failed
    );
    println!(
        "  listings: {} discovered, {} accepted, {} scored, {} unscored",
        summary.listings_discovered, summary.listings_accepted, summary.listings_scored, summary.listings_unscored
    );
    if let Some(err) = &summary.error {
        println!("  {} {}", "error:".red(), err);
    }
}

fn print_top(state: &RunState, limit: usize) {
    let mut scored: Vec<_> = state.scored.iter().collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.key.cmp(&b.key)));
    for s in scored.into_iter().take(limit) {
        println!(
            "  {:>3}  {} @ {} ({})",
            s.score.to_string().green(),
            s.listing.title,
            s.listing.company,
            s.listing.location
        );
    }
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run { resume, prefs, run_id } => {
            let preferences = load_preferences(prefs)?;
            let orchestrator = build_orchestrator(config, cancel_on_ctrl_c())?;
            let input = RunInput {
                resume: ResumeSource::File(resume.clone()),
                preferences,
            };
            let summary = orchestrator
                .execute(run_id.clone(), input)
                .await
                .context("Run failed")?;
            print_summary(&summary);
        }
        Commands::Resume { run_id } => {
            let orchestrator = build_orchestrator(config, cancel_on_ctrl_c())?;
            let state = orchestrator.resume(run_id).context("Failed to resume run")?;
            let summary = orchestrator.run(state).await.context("Run failed")?;
            print_summary(&summary);
        }
        Commands::Status { run_id } => {
            let state = load_run(config, run_id)?;
            print_summary(&state.summary());
            print_top(&state, 5);
        }
        Commands::Rescore { run_id } => {
            let orchestrator = build_orchestrator(config, cancel_on_ctrl_c())?;
            let mut state = orchestrator.resume(run_id).context("Failed to load run")?;
            let recovered = orchestrator
                .rescore_unscored(&mut state)
                .await
                .context("Rescore failed")?;
            println!(
                "{} {} listings rescored, {} still unscored",
                "Rescore:".green(),
                recovered,
                state.unscored.len()
            );
        }
        Commands::Export { run_id, out } => {
            let store = open_store(config.storage.backend, &config.storage.listings_dir())
                .context("Failed to open listing store")?;
            let count = export_results(store.as_ref(), run_id, out).context("Export failed")?;
            println!("{} {} results to {}", "Exported".green(), count, out.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
