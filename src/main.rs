use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use litscreen::batch::{BatchOrchestrator, CheckpointStore};
use litscreen::config::ScreeningConfig;
use litscreen::engine::ScreeningEngine;
use litscreen::report::{summary_path, write_records, write_summary, RunSummary};
use litscreen::sources;

#[derive(Parser, Debug)]
#[command(name = "litscreen")]
#[command(about = "Screen papers against eligibility criteria with one or two LLM engines")]
#[command(version)]
struct Args {
    /// Screening configuration (TOML)
    #[arg(short, long, env = "LITSCREEN_CONFIG")]
    config: PathBuf,

    /// Paper collection: .ris, .json or .jsonl; globs allowed, repeatable
    #[arg(short, long = "input", required = true)]
    inputs: Vec<String>,

    /// Results file (JSON lines); the summary is written next to it
    #[arg(short, long)]
    output: PathBuf,

    /// Use only the first N configured engines
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    engines: Option<u8>,

    /// Papers screened at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Screen at most this many papers
    #[arg(long)]
    max_papers: Option<usize>,

    /// SQLite checkpoint ledger; completed papers are skipped on rerun
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Disable the follow-up pass for every engine
    #[arg(long)]
    no_followup: bool,

    /// Time budget for one engine on one paper
    #[arg(long, value_name = "SECS")]
    paper_timeout: Option<u64>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "litscreen=debug"
    } else {
        "litscreen=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ScreeningConfig::load(&args.config)?;
    if let Some(count) = args.engines {
        config.select_engines(usize::from(count))?;
    }
    if let Some(concurrency) = args.concurrency {
        config.batch.concurrency = concurrency;
    }
    if let Some(secs) = args.paper_timeout {
        config.batch.paper_timeout_secs = secs;
    }
    if args.no_followup {
        for engine in &mut config.engines {
            engine.followup = false;
        }
    }
    config.validate()?;

    let rubric = Arc::new(config.rubric()?);
    let engines = config
        .engines
        .iter()
        .map(|e| ScreeningEngine::from_config(e, Arc::clone(&rubric), &config.prompts))
        .collect::<Result<Vec<_>, _>>()?;
    let engine_ids: Vec<String> = config.engines.iter().map(|e| e.id.clone()).collect();

    let papers = sources::load_papers(&args.inputs, args.max_papers)?;
    if papers.is_empty() {
        anyhow::bail!("no papers with a title found in {:?}", args.inputs);
    }
    info!(
        papers = papers.len(),
        rubric = rubric.name(),
        criteria = rubric.len(),
        mode = rubric.mode().label(),
        engines = ?engine_ids,
        "litscreen v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut orchestrator = BatchOrchestrator::new(engines, config.batch.clone())?;
    if let Some(path) = &args.checkpoint {
        let path = shellexpand::tilde(&path.to_string_lossy()).into_owned();
        let store = CheckpointStore::open(&path)
            .with_context(|| format!("opening checkpoint {}", path))?;
        orchestrator = orchestrator.with_checkpoint(store)?;
    }

    let report = orchestrator.run_to_completion(papers).await?;

    write_records(&args.output, &report.records)
        .with_context(|| format!("writing {}", args.output.display()))?;
    let summary = RunSummary::new(&report, rubric.name(), engine_ids);
    let summary_file = summary_path(&args.output);
    write_summary(&summary_file, &summary)
        .with_context(|| format!("writing {}", summary_file.display()))?;

    let analysis = &summary.analysis;
    info!(
        total = analysis.total_papers,
        completed = analysis.completed,
        errors = analysis.errors,
        needs_review = analysis.review_count(),
        agreement_rate = analysis.agreement.as_ref().map(|a| a.agreement_rate),
        output = %args.output.display(),
        "Screening complete"
    );
    Ok(())
}
