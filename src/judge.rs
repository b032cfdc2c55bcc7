use crate::config::JudgeConfig;
use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Sampling settings of the judge model, recorded in every report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeSettings {
    pub model_name: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
}

/// A model that turns a judgment prompt into a verdict.
///
/// Implementations are shared by all dispatcher workers, so they must be
/// usable through `&self` from several tasks at once.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    fn settings(&self) -> &JudgeSettings;

    async fn request(&self, prompt: &str) -> Result<String>;
}

/// Judge backed by an OpenAI-compatible chat completion endpoint, with
/// optional client-side rate limiting
pub struct OpenAiJudge {
    client: Client<OpenAIConfig>,
    settings: JudgeSettings,
    system_prompt: Option<String>,
    /// Minimum spacing between request starts; `None` when rate limiting is off
    min_interval: Option<Duration>,
    /// Start time handed to the most recent request
    last_slot: Mutex<Option<Instant>>,
}

impl OpenAiJudge {
    /// Create a judge, reading the API key from the configured environment variable
    pub fn from_config(config: &JudgeConfig) -> Result<Self> {
        let api_key = std::env::var(&config.env_var_api_key)
            .with_context(|| format!("Environment variable {} not found", config.env_var_api_key))?;

        Self::new(config, api_key)
    }

    /// Create a judge with an explicit API key
    pub fn new(config: &JudgeConfig, api_key: String) -> Result<Self> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.api_endpoint);

        let mut client = Client::with_config(openai_config);
        if let Some(timeout_secs) = config.request_timeout_secs {
            let http_client = reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .context("Failed to build HTTP client")?;
            client = client.with_http_client(http_client);
        }

        Ok(Self {
            client,
            settings: config.settings(),
            system_prompt: config.system_prompt.clone(),
            min_interval: min_interval(config.rate_limit_rps),
            last_slot: Mutex::new(None),
        })
    }

    /// Wait until this request may start.
    ///
    /// One judge serves every dispatcher worker, so the slot bookkeeping is
    /// global to the judge: the limit holds for the whole pool, not per
    /// worker. The lock is only held while a slot is reserved, so waiting
    /// workers queue up on their own timers.
    async fn wait_for_slot(&self) {
        let Some(interval) = self.min_interval else {
            return;
        };

        let start = {
            let mut last_slot = self.last_slot.lock().await;
            reserve_slot(&mut last_slot, interval, Instant::now())
        };
        sleep_until(start).await;
    }

    /// Build the chat completion request for one judgment
    fn build_request(&self, prompt: &str) -> Result<CreateChatCompletionRequest> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(2);

        if let Some(system_prompt) = &self.system_prompt {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt.clone())
                    .build()
                    .context("Failed to build system message")?
                    .into(),
            );
        }

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.to_string())
                .build()
                .context("Failed to build user message")?
                .into(),
        );

        CreateChatCompletionRequestArgs::default()
            .model(&self.settings.model_name)
            .messages(messages)
            .temperature(self.settings.temperature as f32)
            .top_p(self.settings.top_p as f32)
            .max_tokens(self.settings.max_tokens)
            .build()
            .context("Failed to build chat completion request")
    }

    /// Text of the first choice, empty when the endpoint returned none
    fn extract_content(response: CreateChatCompletionResponse) -> String {
        match response.choices.into_iter().next() {
            Some(choice) => choice.message.content.unwrap_or_default(),
            None => String::new(),
        }
    }
}

/// Spacing between request starts for `rate_limit_rps`; zero, negative or
/// unrepresentable rates disable the limit
fn min_interval(rate_limit_rps: f64) -> Option<Duration> {
    if rate_limit_rps > 0.0 {
        Duration::try_from_secs_f64(1.0 / rate_limit_rps).ok()
    } else {
        None
    }
}

/// Reserve the earliest start time at least `interval` after the previous
/// reservation and record it
fn reserve_slot(last_slot: &mut Option<Instant>, interval: Duration, now: Instant) -> Instant {
    let start = match *last_slot {
        Some(previous) => now.max(previous + interval),
        None => now,
    };
    *last_slot = Some(start);
    start
}

#[async_trait]
impl JudgeClient for OpenAiJudge {
    fn settings(&self) -> &JudgeSettings {
        &self.settings
    }

    async fn request(&self, prompt: &str) -> Result<String> {
        self.wait_for_slot().await;

        let request = self.build_request(prompt)?;
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .context("Failed to get judgment from judge model")?;

        if let Some(usage) = &response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "judge request completed"
            );
        }

        Ok(Self::extract_content(response))
    }
}
