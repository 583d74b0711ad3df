//! CLI binary for running structured-output benchmarks.

mod persist;
mod table;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use schemabench_engine::{
    BenchConfig, BenchmarkRunner, CancelHandle, FanoutObserver, LlmGenerator, Phase,
    ProgressObserver, StatusBoard, TracingObserver,
};
use schemabench_llm::{CostTrackingMiddleware, LlmClient, LoggingMiddleware, ModelCatalog};

#[derive(Parser)]
#[command(name = "schemabench", version, about = "Structured-output reliability benchmarks for LLM providers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark
    Run {
        /// JSON config file; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Model to benchmark (catalog id or provider:model). Repeatable.
        #[arg(short, long = "model")]
        models: Vec<String>,

        /// Scenario number 1-4. Repeatable.
        #[arg(short, long = "scenario")]
        scenarios: Vec<u8>,

        /// Runs per scenario
        #[arg(long)]
        runs: Option<u32>,

        #[arg(long)]
        temperature: Option<f32>,

        /// Retries after the first attempt
        #[arg(long)]
        max_retries: Option<u32>,

        #[arg(long)]
        max_tokens: Option<u32>,

        /// Report file (default: results/benchmark-<timestamp>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List known models with provider and pricing
    Models,

    /// Recompute and print summaries from a saved report
    Summarize {
        /// Path to a report JSON file
        report: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    match cli.command {
        Commands::Run {
            config,
            models,
            scenarios,
            runs,
            temperature,
            max_retries,
            max_tokens,
            output,
        } => {
            let mut config = match config {
                Some(path) => BenchConfig::from_json_file(&path)?,
                None => BenchConfig::default(),
            };
            if !models.is_empty() {
                config.models = models;
            }
            if !scenarios.is_empty() {
                config.scenarios = scenarios;
            }
            if let Some(runs) = runs {
                config.runs_per_scenario = runs;
            }
            if let Some(temperature) = temperature {
                config.temperature = temperature;
            }
            if let Some(max_retries) = max_retries {
                config.max_retries = max_retries;
            }
            if let Some(max_tokens) = max_tokens {
                config.max_tokens = max_tokens;
            }
            cmd_run(config, output).await?;
        }
        Commands::Models => {
            print!("{}", table::render_models(&ModelCatalog::new()));
        }
        Commands::Summarize { report } => {
            let report = persist::load_report(&report)?;
            println!(
                "Execution {} ({:?}), started {}",
                report.execution_id,
                report.termination,
                report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            print!("{}", table::render_summary(&report.results));
        }
    }

    Ok(())
}

async fn cmd_run(config: BenchConfig, output: Option<PathBuf>) -> anyhow::Result<()> {
    let catalog = ModelCatalog::new();
    let mut plan = config.resolve(&catalog)?;

    let usage = CostTrackingMiddleware::new();
    let client = LlmClient::from_env()?
        .with_middleware(LoggingMiddleware)
        .with_middleware(usage.clone());

    plan.retain_servable(&client)?;

    println!(
        "Benchmarking {} model(s) x {} scenario(s), {} run(s) each, up to {} retries",
        plan.models.len(),
        plan.scenarios.len(),
        plan.settings.runs_per_scenario,
        plan.settings.max_retries
    );

    let board = Arc::new(StatusBoard::new(plan.log_capacity));
    let observers: Vec<Arc<dyn ProgressObserver>> = vec![Arc::new(TracingObserver), board.clone()];
    let runner = BenchmarkRunner::new(
        Arc::new(LlmGenerator::new(Arc::new(client))),
        config.prompts.clone(),
        Arc::new(FanoutObserver::new(observers)),
    )
    .with_catalog(catalog);

    let cancel = CancelHandle::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, finishing the in-flight attempt");
                cancel.cancel();
            }
        });
    }

    let poller = {
        let board = board.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                let status = board.snapshot();
                if status.phase == Phase::Finished {
                    break;
                }
                if let Some(position) = &status.current_attempt {
                    let done = status.runs.iter().filter(|r| r.success.is_some()).count();
                    tracing::info!(
                        model = %position.model,
                        scenario = position.scenario.name(),
                        run = position.run,
                        stage = position.stage.label(),
                        attempt = position.attempt,
                        runs_done = done,
                        scenarios_done = status.completed_scenarios.len(),
                        "Progress"
                    );
                }
            }
        })
    };

    let report = runner.run(&plan, &cancel).await;
    poller.abort();

    println!();
    print!("{}", table::render_summary(&report.results));
    println!(
        "\nTermination: {:?}\nTokens reported by providers: {} in / {} out\nEstimated cost: ${:.4}",
        report.termination,
        usage.total_input_tokens(),
        usage.total_output_tokens(),
        report.estimated_cost_usd()
    );

    let path = output.unwrap_or_else(|| persist::default_report_path(&report));
    persist::save_report(&report, &path)?;
    println!("Report written to {}", path.display());

    Ok(())
}
