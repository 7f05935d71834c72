//! LeadScout command-line interface.
//!
//! Thin host around `leadscout-core`: loads configuration, constructs
//! the HTTP adapters, runs the orchestrator, and prints a summary.
//! Exit codes: 0 for an `ok` run, 2 for `partial`, 1 for `failed` or a
//! startup error.

mod sink;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use leadscout_core::adapters::{
    CrmHttpClient, CrmReader, DatasetFilter, DatasetHttpClient, GenAiHttpClient, GenerativeText,
    ProfileScraper, RetryPolicy, ScraperHttpClient, SearchHttpClient, WebSearch,
};
use leadscout_core::artifact::FsArtifactStore;
use leadscout_core::config::Config;
use leadscout_core::model::{AccountRef, PipelineRun, RunStatus};
use leadscout_core::pipeline::{Adapters, DiscoveryMode, Orchestrator, PendingUpdateSink, RunOptions};

use sink::FileUpdateSink;

#[derive(Parser)]
#[command(name = "leadscout", version, about = "Prospect discovery pipeline")]
struct Cli {
    /// Path to the config file (default: ./leadscout.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the discovery pipeline for one account.
    Run(RunArgs),
    /// Load and validate the configuration, then exit.
    CheckConfig,
}

#[derive(clap::Args)]
struct RunArgs {
    /// CRM account id to resolve and run.
    #[arg(long, conflicts_with = "name")]
    account_id: Option<String>,

    /// Account name, for running without a CRM lookup.
    #[arg(long)]
    name: Option<String>,

    /// Parent organization name (with --name).
    #[arg(long, requires = "name")]
    parent: Option<String>,

    /// City (with --name).
    #[arg(long, requires = "name")]
    city: Option<String>,

    /// State or region (with --name).
    #[arg(long, requires = "name")]
    state: Option<String>,

    /// Discovery mode: dataset, search, or combined.
    #[arg(long)]
    mode: Option<DiscoveryMode>,

    /// Minimum qualification score (0-100).
    #[arg(long)]
    min_score: Option<u8>,

    /// Maximum prospects to qualify.
    #[arg(long)]
    max_prospects: Option<usize>,

    /// Stop after ranking; enqueue nothing.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("leadscout=info")),
        )
        .init();

    let cli = Cli::parse();
    let code = match run_command(cli).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run_command(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Command::CheckConfig => {
            match Config::load_and_validate(cli.config.as_deref()) {
                Ok(_) => {
                    println!("configuration ok");
                    Ok(0)
                }
                Err(errors) => {
                    for error in errors {
                        eprintln!("config error: {error}");
                    }
                    Ok(1)
                }
            }
        }
        Command::Run(args) => {
            let config = Config::load_and_validate(cli.config.as_deref())
                .map_err(|errors| {
                    anyhow::anyhow!(
                        errors
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join("; ")
                    )
                })
                .context("configuration invalid")?;

            let run = execute_run(&config, args).await?;
            print_summary(&run);

            Ok(match run.status {
                RunStatus::Ok => 0,
                RunStatus::Partial => 2,
                RunStatus::Failed => 1,
            })
        }
    }
}

async fn execute_run(config: &Config, args: RunArgs) -> anyhow::Result<PipelineRun> {
    let orchestrator = build_orchestrator(config);
    let opts = build_options(config, &args);

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            ctrl_c_cancel.cancel();
        }
    });

    let run = if let Some(account_id) = &args.account_id {
        orchestrator.run(account_id, opts, cancel).await
    } else if let Some(name) = &args.name {
        let account = AccountRef {
            account_id: format!("local:{name}"),
            name: name.clone(),
            parent_name: args.parent.clone(),
            city: args.city.clone(),
            state: args.state.clone(),
            industry: None,
        };
        orchestrator.run_account(account, opts, cancel).await
    } else {
        anyhow::bail!("pass --account-id or --name");
    };

    Ok(run)
}

fn build_orchestrator(config: &Config) -> Orchestrator {
    let retry = RetryPolicy {
        max_attempts: config.retry.max_attempts,
        base_delay_ms: config.retry.base_delay_ms,
        max_delay_ms: config.retry.max_delay_ms,
    };
    let timeout = Duration::from_secs(config.retry.request_timeout_secs);
    let a = &config.adapters;

    let adapters = Adapters {
        dataset: Arc::new(DatasetHttpClient::new(
            a.dataset_base_url.clone(),
            a.dataset_api_token.clone(),
            a.dataset_id.clone(),
            retry.clone(),
            timeout,
        )) as Arc<dyn DatasetFilter>,
        search: Arc::new(SearchHttpClient::new(
            a.search_base_url.clone(),
            a.search_api_key.clone(),
            retry.clone(),
            timeout,
        )) as Arc<dyn WebSearch>,
        scraper: Arc::new(ScraperHttpClient::new(
            a.scraper_base_url.clone(),
            a.scraper_api_token.clone(),
            retry.clone(),
            timeout,
        )) as Arc<dyn ProfileScraper>,
        genai: Arc::new(GenAiHttpClient::new(
            a.genai_base_url.clone(),
            a.genai_api_key.clone(),
            a.genai_model.clone(),
            retry.clone(),
            timeout,
        )) as Arc<dyn GenerativeText>,
        crm: Arc::new(CrmHttpClient::new(
            a.crm_base_url.clone(),
            a.crm_api_token.clone(),
            retry,
            timeout,
        )) as Arc<dyn CrmReader>,
        sink: Arc::new(FileUpdateSink::new(
            std::path::Path::new(&config.artifacts_dir).join("pending_updates.jsonl"),
        )) as Arc<dyn PendingUpdateSink>,
    };

    Orchestrator::new(adapters, Arc::new(FsArtifactStore::new(&config.artifacts_dir)))
}

fn build_options(config: &Config, args: &RunArgs) -> RunOptions {
    let mut opts = config.run_options();
    if let Some(mode) = args.mode {
        opts.mode = mode;
    }
    if let Some(min_score) = args.min_score {
        opts.min_score = min_score;
    }
    if let Some(max_prospects) = args.max_prospects {
        opts.max_prospects = max_prospects;
    }
    opts.dry_run = args.dry_run;
    opts
}

fn print_summary(run: &PipelineRun) {
    println!("run {} for {}", run.run_id, run.account.name);
    println!("status: {:?}", run.status);
    if let Some(error) = &run.first_error {
        println!("first error: {error}");
    }
    if let Some(recommendation) = &run.recommendation {
        println!("recommendation: {recommendation}");
    }
    println!(
        "cost: {:.2} units across {} stages",
        run.total_cost,
        run.stages.len()
    );
    for report in &run.stages {
        println!(
            "  {:<8} found {:<4} rejected {:<4} in {} ms (cost {:.2})",
            report.stage.to_string(),
            report.found,
            report.rejected,
            report.duration_ms,
            report.cost,
        );
    }
    for prospect in &run.stage3_qualified {
        println!(
            "  [{:>3}] {} — {} ({})",
            prospect.score,
            prospect
                .profile
                .full_name
                .as_deref()
                .unwrap_or("(unnamed)"),
            prospect.profile.job_title.as_deref().unwrap_or("(no title)"),
            prospect.url,
        );
    }
    if !run.queued_updates.is_empty() {
        println!("queued {} pending updates", run.queued_updates.len());
    }
}
