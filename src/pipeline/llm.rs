//! LLM-backed services: outline structuring and frame scoring.
//!
//! Both adapters are thin wrappers over one `edgequake-llm` chat call. All
//! prompt wording lives in [`crate::prompts`]; all fallback policy lives in
//! the stages that call them ([`super::structure`], [`super::matcher`]).
//! Each call is a single attempt: a failure is reported as a
//! [`ServiceError`] and the stage falls back deterministically.

use crate::config::TutorialConfig;
use crate::error::{ServiceError, TutorialError};
use crate::prompts::{frame_label, STRUCTURING_SYSTEM_PROMPT};
use crate::services::{Scorer, Structurer};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// [`Structurer`] over a chat-capable provider.
pub struct LlmStructurer {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
}

impl LlmStructurer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &TutorialConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| STRUCTURING_SYSTEM_PROMPT.to_string()),
            options: build_options(config.structuring_temperature, config.structuring_max_tokens),
        }
    }
}

#[async_trait]
impl Structurer for LlmStructurer {
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(prompt),
        ];
        chat(&self.provider, &messages, &self.options, "text").await
    }
}

/// [`Scorer`] over a vision-capable provider.
pub struct LlmScorer {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmScorer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &TutorialConfig) -> Self {
        Self {
            provider,
            options: build_options(config.scoring_temperature, config.scoring_max_tokens),
        }
    }
}

#[async_trait]
impl Scorer for LlmScorer {
    async fn score(&self, step_description: &str, images: &[&str]) -> Result<String, ServiceError> {
        // Attachments carry no captions of their own, so the ordinals are
        // spelled out in the text.
        let labels: Vec<String> = (1..=images.len()).map(frame_label).collect();
        let text = format!(
            "{}\n\nThe images are attached in this order: {}.",
            step_description,
            labels.join(", ")
        );
        let attachments = images
            .iter()
            .map(|b64| ImageData::new(b64.to_string(), "image/jpeg").with_detail("low"))
            .collect();

        let messages = vec![ChatMessage::user_with_images(text, attachments)];
        chat(&self.provider, &messages, &self.options, "vision").await
    }
}

async fn chat(
    provider: &Arc<dyn LLMProvider>,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    service: &'static str,
) -> Result<String, ServiceError> {
    let start = Instant::now();
    let response = provider
        .chat(messages, Some(options))
        .await
        .map_err(|e| ServiceError::RequestFailed {
            service,
            detail: e.to_string(),
        })?;

    debug!(
        "{} call: {} input tokens, {} output tokens, {:?}",
        service,
        response.prompt_tokens,
        response.completion_tokens,
        start.elapsed()
    );

    if response.content.trim().is_empty() {
        return Err(ServiceError::EmptyResponse { service });
    }
    Ok(response.content)
}

fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, TutorialError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        TutorialError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    honoured only when both are set.
/// 4. **OpenAI** when `OPENAI_API_KEY` is present, so users with several
///    keys default to the provider the speech-to-text adapter also uses.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &TutorialConfig) -> Result<Arc<dyn LLMProvider>, TutorialError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TutorialError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
