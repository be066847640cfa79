//! Hosted-provider adapter built on `edgequake-llm`.
//!
//! `CompletionOptions` carries temperature, `top_p` and `max_tokens`. The
//! other [`SamplingOptions`] fields have no slot there; they are reported
//! once with a warning when the adapter is built and otherwise ignored.

use super::chat::{ChatModel, ChatReply, UserContent};
use super::{ModelConfig, SamplingOptions};
use crate::error::{OcrError, ProviderError};
use crate::usage::TokenUsage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, LLMResponse, ProviderFactory};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Chat model backed by an `edgequake_llm` provider (OpenAI, Anthropic, Bedrock).
pub struct EdgequakeChatModel {
    provider: Arc<dyn LLMProvider>,
    provider_name: &'static str,
    model_name: String,
    temperature: f32,
    top_p: Option<f32>,
    max_tokens: Option<u32>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for EdgequakeChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgequakeChatModel")
            .field("provider", &self.provider_name)
            .field("model_name", &self.model_name)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl EdgequakeChatModel {
    /// Create the underlying provider client. Reads credentials from the
    /// environment but makes no network call.
    pub fn new(config: &ModelConfig) -> Result<Self, OcrError> {
        let info = config.provider().info();
        let provider = ProviderFactory::create_llm_provider(info.factory_name, config.model_name())
            .map_err(|e| OcrError::InvalidConfig(format!("{} provider: {e}", config.provider())))?;

        Ok(Self::from_provider(provider, config))
    }

    /// Wrap an already-constructed provider.
    pub fn from_provider(provider: Arc<dyn LLMProvider>, config: &ModelConfig) -> Self {
        let sampling = config.sampling();
        let dropped = unforwarded_fields(sampling);
        if !dropped.is_empty() {
            warn!(
                provider = config.provider().as_str(),
                fields = ?dropped,
                "Sampling options not supported by this provider are ignored"
            );
        }
        Self {
            provider,
            provider_name: config.provider().as_str(),
            model_name: config.model_name().to_string(),
            temperature: config.temperature(),
            top_p: sampling.top_p,
            max_tokens: sampling.max_tokens,
            timeout: config.timeout(),
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            top_p: self.top_p,
            max_tokens: self.max_tokens.map(|t| t as usize),
            ..Default::default()
        }
    }
}

/// Names of set sampling fields that `CompletionOptions` cannot carry.
fn unforwarded_fields(s: &SamplingOptions) -> Vec<&'static str> {
    [
        ("num_ctx", s.num_ctx.is_some()),
        ("num_predict", s.num_predict.is_some()),
        ("repeat_last_n", s.repeat_last_n.is_some()),
        ("repeat_penalty", s.repeat_penalty.is_some()),
        ("mirostat", s.mirostat.is_some()),
        ("mirostat_eta", s.mirostat_eta.is_some()),
        ("mirostat_tau", s.mirostat_tau.is_some()),
        ("tfs_z", s.tfs_z.is_some()),
        ("top_k", s.top_k.is_some()),
        ("seed", s.seed.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, set)| set.then_some(name))
    .collect()
}

/// Usage counters reported on an `edgequake_llm` response.
///
/// Cache hits are billed as cache reads; thinking tokens are reasoning.
pub(crate) fn usage_from_response(response: &LLMResponse) -> TokenUsage {
    TokenUsage {
        input_tokens: response.prompt_tokens as u64,
        output_tokens: response.completion_tokens as u64,
        total_tokens: response.total_tokens as u64,
        cache_read: response.cache_hit_tokens.unwrap_or(0) as u64,
        reasoning: response.thinking_tokens.unwrap_or(0) as u64,
        tool_calls: response.tool_calls.len() as u64,
        ..TokenUsage::default()
    }
}

#[async_trait]
impl ChatModel for EdgequakeChatModel {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn invoke(&self, system_prompt: &str, content: &UserContent) -> Result<ChatReply, ProviderError> {
        let image = ImageData::new(content.image.data.clone(), content.image.media_type).with_detail("high");
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user_with_images(&content.text, vec![image]),
        ];
        let options = self.options();

        let call = self.provider.chat(&messages, Some(&options));
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ProviderError::Timeout { secs: limit.as_secs() })?,
            None => call.await,
        };
        let response = result.map_err(|e| classify_error(self.provider_name, &e.to_string()))?;

        let usage = usage_from_response(&response);
        debug!(
            model = %self.model_name,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cache_read = usage.cache_read,
            reasoning = usage.reasoning,
            "chat completion"
        );

        Ok(ChatReply {
            text: response.content,
            usage,
        })
    }
}

/// Map a provider error message onto the page-level error kinds.
pub(crate) fn classify_error(provider: &str, message: &str) -> ProviderError {
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("rate_limit") {
        ProviderError::RateLimited {
            provider: provider.to_string(),
            retry_after_secs: None,
        }
    } else if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("invalid api key")
        || lower.contains("authentication")
    {
        ProviderError::Auth {
            provider: provider.to_string(),
            detail: message.to_string(),
        }
    } else if lower.contains("timed out") || lower.contains("timeout") {
        ProviderError::Api(format!("request timed out: {message}"))
    } else {
        ProviderError::Api(message.to_string())
    }
}
