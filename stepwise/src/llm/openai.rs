//! OpenAI-compatible chat completions backend.
//!
//! Uses `OPENAI_API_KEY` (and `OPENAI_BASE_URL` / `OPENAI_API_BASE` for logging) from the
//! environment by default, or an explicit [`OpenAIConfig`]. Proposal output is split into
//! non-empty lines, which become the ordered fragment sequence the step normalizer reads.
//! Score calls return the raw completion text for unwrapping.

use async_trait::async_trait;
use tracing::{debug, trace};

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs,
    },
    Client,
};

use crate::config::{GenerationConfig, ValueRange};
use crate::error::BackendError;
use crate::llm::{ModelBackend, ScoreResponse};

/// Chat-completions client implementing [`ModelBackend`].
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model: String,
    /// Generation parameters for score calls (deterministic by default).
    score_generation: GenerationConfig,
}

impl OpenAiBackend {
    /// Client with default config (API key from `OPENAI_API_KEY`).
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            score_generation: Self::default_score_generation(),
        }
    }

    /// Client with custom config (e.g. local server base URL).
    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(config),
            model: model.into(),
            score_generation: Self::default_score_generation(),
        }
    }

    /// Overrides generation parameters used for score calls.
    pub fn with_score_generation(mut self, generation: GenerationConfig) -> Self {
        self.score_generation = generation;
        self
    }

    fn default_score_generation() -> GenerationConfig {
        GenerationConfig {
            do_sample: false,
            max_new_tokens: 32,
            ..GenerationConfig::default()
        }
    }

    fn chat_completions_url() -> String {
        let base = std::env::var("OPENAI_BASE_URL")
            .or_else(|_| std::env::var("OPENAI_API_BASE"))
            .unwrap_or_else(|_| "https://api.openai.com".to_string());
        let base = base.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    /// Splits completion text into ordered, trimmed, non-empty fragments.
    fn split_fragments(content: &str) -> Vec<String> {
        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    async fn complete(
        &self,
        prompt: &str,
        generation: &GenerationConfig,
    ) -> Result<String, BackendError> {
        let trace_id = uuid::Uuid::new_v4().to_string();
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(vec![ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage::from(prompt),
        )]);
        let temperature = if generation.do_sample {
            generation.temperature
        } else {
            0.0
        };
        args.temperature(temperature);
        args.max_completion_tokens(generation.max_new_tokens);
        args.seed(generation.seed);

        let request = args
            .build()
            .map_err(|e| BackendError::Request(format!("request build failed: {}", e)))?;

        let url = Self::chat_completions_url();
        debug!(
            trace_id = %trace_id,
            url = %url,
            model = %self.model,
            temperature = temperature,
            max_new_tokens = generation.max_new_tokens,
            "chat completion create"
        );
        if let Ok(js) = serde_json::to_string_pretty(&request) {
            trace!(trace_id = %trace_id, request = %js, "request body");
        }

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| BackendError::Request(format!("API error: {}", e)))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(BackendError::NoChoices)?;
        let content = choice.message.content.unwrap_or_default();
        trace!(trace_id = %trace_id, content = %content, "completion content");
        Ok(content)
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    async fn propose(
        &self,
        prompt: &str,
        generation: &GenerationConfig,
    ) -> Result<Vec<String>, BackendError> {
        let content = self.complete(prompt, generation).await?;
        Ok(Self::split_fragments(&content))
    }

    async fn score(&self, prompt: &str, _range: ValueRange) -> Result<ScoreResponse, BackendError> {
        let content = self.complete(prompt, &self.score_generation).await?;
        Ok(ScoreResponse::Text(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_fragments_drops_blank_lines_and_trims() {
        let out = OpenAiBackend::split_fragments("  Step 1: add  \n\n Next step: 2 + 2 = 4\n");
        assert_eq!(out, vec!["Step 1: add", "Next step: 2 + 2 = 4"]);
    }

    #[test]
    fn split_fragments_of_empty_content_is_empty() {
        assert!(OpenAiBackend::split_fragments("\n  \n").is_empty());
    }

    #[test]
    fn chat_completions_url_respects_v1_suffix() {
        let prev = std::env::var("OPENAI_BASE_URL").ok();
        std::env::set_var("OPENAI_BASE_URL", "http://localhost:8000/v1/");
        let url = OpenAiBackend::chat_completions_url();
        match prev {
            Some(p) => std::env::set_var("OPENAI_BASE_URL", p),
            None => std::env::remove_var("OPENAI_BASE_URL"),
        }
        assert_eq!(url, "http://localhost:8000/v1/chat/completions");
    }
}
