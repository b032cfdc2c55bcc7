use crate::config::{Config, EvaluationConfig};
use crate::dataset;
use crate::dispatch::Dispatcher;
use crate::error::{EvalError, EvalResult};
use crate::judge::JudgeClient;
use crate::label::LabelResult;
use crate::models::{JudgedRecord, Record, Report, RunInfo};
use crate::prompt::PromptRenderer;
use crate::report;
use crate::stats::{Statistics, aggregate};
use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span};

/// Stages of one evaluation run, in the only order they may occur
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunStage {
    Idle,
    Loaded,
    Prompted,
    Dispatched,
    Aggregated,
    Reported,
    Done,
}

impl RunStage {
    fn next(self) -> Self {
        match self {
            RunStage::Idle => RunStage::Loaded,
            RunStage::Loaded => RunStage::Prompted,
            RunStage::Prompted => RunStage::Dispatched,
            RunStage::Dispatched => RunStage::Aggregated,
            RunStage::Aggregated => RunStage::Reported,
            RunStage::Reported | RunStage::Done => RunStage::Done,
        }
    }

    /// Move to the following stage
    fn advance(&mut self) {
        *self = self.next();
        debug!(stage = %self, "run advanced");
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a finished run hands back to its caller
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub dataset: String,
    pub data_num: usize,
    pub report_path: PathBuf,
    pub stat_info: Statistics,
}

/// Evaluates datasets against one judge model
pub struct EvaluationRun {
    client: Arc<dyn JudgeClient>,
    renderer: PromptRenderer,
    dispatcher: Dispatcher,
}

impl EvaluationRun {
    pub fn new(client: Arc<dyn JudgeClient>, renderer: PromptRenderer, process_num: usize) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&client), process_num);
        Self {
            client,
            renderer,
            dispatcher,
        }
    }

    /// Run the full pipeline over the dataset at `data_path` and write one
    /// report into `output_dir`. Nothing is written unless every earlier
    /// stage succeeded.
    pub async fn evaluate(
        &self,
        data_path: &Path,
        output_dir: &Path,
        data_size: Option<i64>,
    ) -> EvalResult<RunOutcome> {
        let mut stage = RunStage::Idle;

        let records = dataset::load(data_path, data_size)?;
        if records.is_empty() {
            return Err(EvalError::EmptyDataset);
        }
        let dataset = dataset::dataset_name(data_path);
        let info = RunInfo {
            llm: self.client.settings().clone(),
            dataset: dataset.clone(),
            data_num: records.len(),
            datetime: Local::now().naive_local(),
        };
        stage.advance();
        info!(dataset = %dataset, items = records.len(), "dataset loaded");

        let prompts = self.renderer.render_all(&records)?;
        stage.advance();

        let span = info_span!("batch", model = %info.llm.model_name, dataset = %dataset);
        let judgments = self.dispatcher.run_batch(&prompts).instrument(span).await;
        stage.advance();

        let (judged, stat_info) = judge_and_aggregate(records, prompts, judgments)?;
        stage.advance();
        info!(
            valid = stat_info.valid_count,
            correct = stat_info.correct_count,
            incorrect = stat_info.incorrect_count,
            accuracy = stat_info.accuracy,
            "statistics computed"
        );

        let data_num = info.data_num;
        let report = Report::new(info, stat_info.clone(), judged);
        let report_path = report::write(&report, output_dir)?;
        stage.advance();

        stage.advance();
        debug_assert_eq!(stage, RunStage::Done);

        Ok(RunOutcome {
            dataset,
            data_num,
            report_path,
            stat_info,
        })
    }

    /// Judge a single item and return the raw judgment, without
    /// normalization or persistence
    pub async fn evaluate_one(&self, question: &str, llm_output: &str, correct_answer: &str) -> Result<String> {
        let prompt = self
            .renderer
            .render(&Record::new(question, llm_output, correct_answer))
            .context("Failed to render judgment prompt")?;

        self.client.request(&prompt).await
    }
}

/// Pair each record with its prompt and judgment, then aggregate the labels
fn judge_and_aggregate(
    records: Vec<Record>,
    prompts: Vec<String>,
    judgments: Vec<String>,
) -> EvalResult<(Vec<JudgedRecord>, Statistics)> {
    let judged: Vec<JudgedRecord> = records
        .into_iter()
        .zip(prompts)
        .zip(judgments)
        .map(|((record, prompt), judgment)| JudgedRecord::new(record, prompt, judgment))
        .collect();

    let labels: Vec<LabelResult> = judged.iter().map(JudgedRecord::label).collect();
    let stat_info = aggregate(&labels)?;

    Ok((judged, stat_info))
}

/// Main runner that works through every evaluation in the configuration
pub struct Runner {
    config: Config,
    client: Arc<dyn JudgeClient>,
}

impl Runner {
    /// Create a new runner with the given configuration and judge
    pub fn new(config: Config, client: Arc<dyn JudgeClient>) -> Self {
        Self { config, client }
    }

    /// Run all evaluations defined in the configuration, stopping at the first failure
    pub async fn run_evaluations(&self) -> Result<Vec<RunOutcome>> {
        let mut outcomes = Vec::new();
        let total_evaluations = self.config.evaluations.len();

        for (eval_index, eval_config) in self.config.evaluations.iter().enumerate() {
            let eval_num = eval_index + 1;
            info!(
                "Running evaluation {}/{}: {}",
                eval_num,
                total_evaluations,
                eval_config.data_path.display()
            );

            let outcome = self
                .run_single_evaluation(eval_config)
                .await
                .with_context(|| format!("Evaluation {} failed: {}", eval_num, eval_config.data_path.display()))?;
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    /// Run evaluation for a single configuration
    async fn run_single_evaluation(&self, config: &EvaluationConfig) -> Result<RunOutcome> {
        let run = self.build_run(config.prompt_template.as_deref(), config.process_num)?;
        let outcome = run
            .evaluate(&config.data_path, &config.output_dir, config.data_size)
            .await?;
        Ok(outcome)
    }

    /// Judge one item using the first evaluation's prompt template, if any
    pub async fn judge_single(&self, question: &str, llm_output: &str, correct_answer: &str) -> Result<String> {
        let template = self
            .config
            .evaluations
            .first()
            .and_then(|evaluation| evaluation.prompt_template.as_deref());
        let run = self.build_run(template, 1)?;
        run.evaluate_one(question, llm_output, correct_answer).await
    }

    fn build_run(&self, template: Option<&str>, process_num: usize) -> Result<EvaluationRun> {
        let renderer = PromptRenderer::with_template(template).context("Invalid prompt template")?;
        Ok(EvaluationRun::new(Arc::clone(&self.client), renderer, process_num))
    }
}
