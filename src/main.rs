use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dataset;
mod dispatch;
mod error;
mod judge;
mod label;
mod models;
mod output;
mod prompt;
mod report;
mod runner;
mod stats;

use crate::config::Config;
use crate::judge::OpenAiJudge;
use crate::output::OutputFormat;
use crate::runner::Runner;

/// Judge-model evaluation CLI - grade model outputs against reference answers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(required_unless_present = "check_report")]
    run_file: Option<PathBuf>,

    /// Re-aggregate a written report and fail if its stat_info no longer matches
    #[arg(long, value_name = "REPORT", conflicts_with_all = ["run_file", "question"])]
    check_report: Option<PathBuf>,

    /// Output format: plain or json
    #[arg(short, long, default_value = "plain")]
    output: OutputFormat,

    /// Verbose output - log every judged item
    #[arg(short, long)]
    verbose: bool,

    /// Judge a single question instead of the configured datasets
    #[arg(long, requires_all = ["llm_output", "correct_answer"])]
    question: Option<String>,

    /// Model output to judge (with --question)
    #[arg(long, requires = "question")]
    llm_output: Option<String>,

    /// Reference answer (with --question)
    #[arg(long, requires = "question")]
    correct_answer: Option<String>,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Some(report_path) = &args.check_report {
        let report = report::verify(report_path)
            .with_context(|| format!("Report check failed for {}", report_path.display()))?;
        output::print_check(report_path, &report.stat_info, args.output);
        return Ok(());
    }

    let Some(run_file) = &args.run_file else {
        anyhow::bail!("a run file is required");
    };
    let config = Config::from_file(run_file)?;
    let judge = Arc::new(OpenAiJudge::from_config(&config.judge)?);
    let runner = Runner::new(config, judge);

    if let (Some(question), Some(llm_output), Some(correct_answer)) =
        (&args.question, &args.llm_output, &args.correct_answer)
    {
        let judgment = runner.judge_single(question, llm_output, correct_answer).await?;
        output::print_judgment(&judgment, args.output);
        return Ok(());
    }

    let outcomes = runner.run_evaluations().await?;

    output::print_results(&outcomes, args.output);

    Ok(())
}
