use crate::judge::JudgeSettings;
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Connection and sampling settings for the judge model
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JudgeConfig {
    /// OpenAI-compatible API endpoint
    pub api_endpoint: String,
    /// Environment variable name containing the API key
    pub env_var_api_key: String,
    /// Judge model name
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    /// Client-side rate limit in requests per second, 0 disables it
    #[serde(default)]
    pub rate_limit_rps: f64,
    /// Per-request timeout for the HTTP client
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// Optional system message sent before each judgment prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl JudgeConfig {
    pub fn settings(&self) -> JudgeSettings {
        JudgeSettings {
            model_name: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
        }
    }
}

/// One dataset to evaluate
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvaluationConfig {
    /// Dataset file (.json array or .jsonl)
    pub data_path: PathBuf,
    /// Directory receiving the report file
    pub output_dir: PathBuf,
    /// Number of records to evaluate; unset or negative means all
    #[serde(default)]
    pub data_size: Option<i64>,
    /// Number of concurrent judge workers
    #[serde(default = "default_process_num")]
    pub process_num: usize,
    /// Custom judgment prompt using {question}, {output} and {answer}
    #[serde(default)]
    pub prompt_template: Option<String>,
}

fn default_temperature() -> f64 {
    0.1
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_top_p() -> f64 {
    0.7
}

fn default_process_num() -> usize {
    5
}

/// Root configuration: one judge, any number of evaluations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub judge: JudgeConfig,
    #[serde(default)]
    pub evaluations: Vec<EvaluationConfig>,
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config: {}", path.display()))?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let judge = &self.judge;
        ensure!(
            (0.0..=2.0).contains(&judge.temperature),
            "judge temperature must be within [0, 2], got {}",
            judge.temperature
        );
        ensure!(
            judge.top_p > 0.0 && judge.top_p <= 1.0,
            "judge top_p must be within (0, 1], got {}",
            judge.top_p
        );
        ensure!(judge.max_tokens >= 1, "judge max_tokens must be at least 1");

        for (index, evaluation) in self.evaluations.iter().enumerate() {
            ensure!(
                evaluation.process_num >= 1,
                "evaluation {} ({}): process_num must be at least 1",
                index + 1,
                evaluation.data_path.display()
            );
        }

        Ok(())
    }
}
