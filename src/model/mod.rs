//! Model configuration: one immutable description of an invocation target.
//!
//! A [`ModelConfig`] is built once per request through
//! [`ModelConfigBuilder`], which enforces the provider/mode/base-URL rules
//! from the registry in [`crate::providers`]. After `build()` succeeds the
//! value never changes; derive a variant with [`ModelConfig::to_builder`].
//!
//! [`ModelConfig::resolve`] turns the description into a [`ChatModelHandle`]
//! without touching the network:
//!
//! | Provider  | `base_url` | Adapter                     |
//! |-----------|------------|-----------------------------|
//! | OpenAI    | unset      | [`EdgequakeChatModel`]      |
//! | OpenAI    | set        | [`OpenAiCompatibleChatModel`] |
//! | Anthropic | -          | [`EdgequakeChatModel`]      |
//! | Bedrock   | -          | [`EdgequakeChatModel`]      |
//! | LlamaCpp  | required   | [`OpenAiCompatibleChatModel`] |

pub mod chat;
pub mod edgequake;
pub mod openai_compat;

pub use chat::{ChatModel, ChatModelHandle, ChatReply, UserContent};
pub use edgequake::EdgequakeChatModel;
pub use openai_compat::OpenAiCompatibleChatModel;

use crate::error::OcrError;
use crate::providers::LlmProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Tag written by [`ModelConfig::to_json`] and checked by [`ModelConfig::from_json`].
const CLASS_NAME: &str = "ModelConfig";

/// What kind of model handle a config describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LlmMode {
    /// Plain text completion.
    Base,
    /// Chat completion with multimodal messages. (default)
    #[default]
    Chat,
    /// Vector embeddings.
    Embeddings,
}

impl fmt::Display for LlmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LlmMode::Base => "Base",
            LlmMode::Chat => "Chat",
            LlmMode::Embeddings => "Embeddings",
        })
    }
}

/// Optional sampling controls, forwarded verbatim to adapters that accept them.
///
/// Names follow the Ollama / llama.cpp vocabulary; each adapter documents
/// which of them its provider understands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    /// Context window size.
    pub num_ctx: Option<u32>,
    /// Maximum tokens to predict (-1 infinite, -2 fill context).
    pub num_predict: Option<i32>,
    /// How far back to look when penalising repetition.
    pub repeat_last_n: Option<i32>,
    pub repeat_penalty: Option<f32>,
    /// 0 disabled, 1 Mirostat, 2 Mirostat 2.0.
    pub mirostat: Option<u8>,
    pub mirostat_eta: Option<f32>,
    pub mirostat_tau: Option<f32>,
    /// Tail-free sampling; 1.0 disables.
    pub tfs_z: Option<f32>,
    pub top_k: Option<u32>,
    pub top_p: Option<f32>,
    pub seed: Option<i64>,
    pub max_tokens: Option<u32>,
}

/// Immutable description of one LLM invocation target.
///
/// Safe to share read-only across page tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    provider: LlmProvider,
    model_name: String,
    #[serde(default)]
    mode: LlmMode,
    #[serde(default)]
    temperature: f32,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(flatten)]
    sampling: SamplingOptions,
}

impl ModelConfig {
    /// Start a builder for `provider`; every other field has a default.
    pub fn builder(provider: LlmProvider) -> ModelConfigBuilder {
        ModelConfigBuilder {
            config: ModelConfig {
                provider,
                model_name: String::new(),
                mode: LlmMode::default(),
                temperature: 0.0,
                base_url: None,
                timeout_secs: None,
                sampling: SamplingOptions::default(),
            },
        }
    }

    /// Builder pre-filled with this config, for cloning with overrides.
    pub fn to_builder(&self) -> ModelConfigBuilder {
        ModelConfigBuilder {
            config: self.clone(),
        }
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn mode(&self) -> LlmMode {
        self.mode
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn sampling(&self) -> &SamplingOptions {
        &self.sampling
    }

    /// True when the provider needs no credential or its env var is set.
    pub fn is_api_key_set(&self) -> bool {
        self.provider.is_api_key_set()
    }

    /// Serialise, tagged with `class_name`.
    pub fn to_json(&self) -> Result<serde_json::Value, OcrError> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| OcrError::Internal(format!("ModelConfig serialisation: {e}")))?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("class_name".into(), CLASS_NAME.into());
        }
        Ok(value)
    }

    /// Deserialise a value produced by [`Self::to_json`], re-running validation.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, OcrError> {
        match value.get("class_name").and_then(|v| v.as_str()) {
            Some(CLASS_NAME) => {}
            other => {
                return Err(OcrError::InvalidConfig(format!(
                    "Invalid config class: {}",
                    other.unwrap_or("<missing>")
                )))
            }
        }
        let config: ModelConfig = serde_json::from_value(value.clone())
            .map_err(|e| OcrError::InvalidConfig(format!("ModelConfig: {e}")))?;
        config.to_builder().build()
    }

    /// Build a chat handle for this config. No network I/O happens here.
    pub fn resolve(&self) -> Result<ChatModelHandle, OcrError> {
        if self.mode != LlmMode::Chat {
            return Err(OcrError::InvalidConfig(format!(
                "LLM mode '{}' cannot produce a chat model for provider '{}'",
                self.mode, self.provider
            )));
        }

        let handle: ChatModelHandle = if self.base_url.is_some() {
            Arc::new(OpenAiCompatibleChatModel::new(self)?)
        } else {
            Arc::new(EdgequakeChatModel::new(self)?)
        };
        Ok(handle)
    }
}

/// Builder for [`ModelConfig`].
#[derive(Debug, Clone)]
pub struct ModelConfigBuilder {
    config: ModelConfig,
}

impl ModelConfigBuilder {
    pub fn provider(mut self, provider: LlmProvider) -> Self {
        self.config.provider = provider;
        self
    }

    /// Empty means "the provider's registered vision model".
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.config.model_name = name.into();
        self
    }

    pub fn mode(mut self, mode: LlmMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t;
        self
    }

    /// Empty strings are treated as unset.
    pub fn base_url(mut self, url: Option<String>) -> Self {
        self.config.base_url = url.filter(|u| !u.trim().is_empty());
        self
    }

    pub fn timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn sampling(mut self, sampling: SamplingOptions) -> Self {
        self.config.sampling = sampling;
        self
    }

    pub fn top_p(mut self, v: f32) -> Self {
        self.config.sampling.top_p = Some(v);
        self
    }

    pub fn top_k(mut self, v: u32) -> Self {
        self.config.sampling.top_k = Some(v);
        self
    }

    pub fn seed(mut self, v: i64) -> Self {
        self.config.sampling.seed = Some(v);
        self
    }

    pub fn max_tokens(mut self, v: u32) -> Self {
        self.config.sampling.max_tokens = Some(v);
        self
    }

    /// Validate against the provider registry and freeze the config.
    pub fn build(mut self) -> Result<ModelConfig, OcrError> {
        let c = &mut self.config;
        let info = c.provider.info();

        if !c.provider.supports_mode(c.mode) {
            return Err(OcrError::UnsupportedMode {
                provider: c.provider.to_string(),
                mode: c.mode.to_string(),
            });
        }

        match (&c.base_url, info.supports_base_url, info.requires_base_url) {
            (None, _, true) => {
                return Err(OcrError::BaseUrlRequired {
                    provider: c.provider.to_string(),
                })
            }
            (Some(url), false, _) => {
                return Err(OcrError::BaseUrlNotSupported {
                    provider: c.provider.to_string(),
                    base_url: url.clone(),
                })
            }
            _ => {}
        }

        if !(0.0..=2.0).contains(&c.temperature) {
            return Err(OcrError::InvalidConfig(format!(
                "temperature must be 0.0–2.0, got {}",
                c.temperature
            )));
        }
        if c.timeout_secs == Some(0) {
            return Err(OcrError::InvalidConfig("timeout must be ≥ 1 second".into()));
        }

        if c.model_name.trim().is_empty() {
            // Chat handles carry page images; other modes never do.
            c.model_name = match c.mode {
                LlmMode::Chat => info.vision_model,
                LlmMode::Base | LlmMode::Embeddings => info.default_model,
            }
            .to_string();
        }

        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_model_defaults_to_vision_model() {
        let c = ModelConfig::builder(LlmProvider::OpenAi).build().unwrap();
        assert_eq!(c.model_name(), "gpt-4o");
        assert_eq!(c.mode(), LlmMode::Chat);
        assert_eq!(c.temperature(), 0.0);

        let c = ModelConfig::builder(LlmProvider::Anthropic).build().unwrap();
        assert_eq!(c.model_name(), LlmProvider::Anthropic.info().vision_model);
    }

    #[test]
    fn empty_model_for_non_chat_mode_uses_default_model() {
        let c = ModelConfig::builder(LlmProvider::Bedrock)
            .mode(LlmMode::Base)
            .build()
            .unwrap();
        assert_eq!(c.model_name(), "anthropic.claude-3-5-sonnet-20240620-v1:0");
        assert_ne!(c.model_name(), LlmProvider::Bedrock.info().vision_model);
    }

    #[test]
    fn unsupported_mode_is_a_construction_error() {
        let err = ModelConfig::builder(LlmProvider::Anthropic)
            .mode(LlmMode::Embeddings)
            .build()
            .unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedMode { .. }));
        assert!(err.is_configuration_error());
        assert_eq!(err.to_string(), "Anthropic provider does not support mode Embeddings");
    }

    #[test]
    fn base_url_rules() {
        let err = ModelConfig::builder(LlmProvider::LlamaCpp).build().unwrap_err();
        assert!(matches!(err, OcrError::BaseUrlRequired { .. }));

        let err = ModelConfig::builder(LlmProvider::Anthropic)
            .base_url(Some("http://localhost:9999".into()))
            .build()
            .unwrap_err();
        assert!(matches!(err, OcrError::BaseUrlNotSupported { .. }));

        // Blank override counts as unset.
        let c = ModelConfig::builder(LlmProvider::Anthropic)
            .base_url(Some("  ".into()))
            .build()
            .unwrap();
        assert_eq!(c.base_url(), None);
    }

    #[test]
    fn temperature_and_timeout_validation() {
        assert!(ModelConfig::builder(LlmProvider::OpenAi)
            .temperature(3.5)
            .build()
            .is_err());
        assert!(ModelConfig::builder(LlmProvider::OpenAi)
            .timeout_secs(Some(0))
            .build()
            .is_err());
        let c = ModelConfig::builder(LlmProvider::OpenAi)
            .timeout_secs(Some(30))
            .build()
            .unwrap();
        assert_eq!(c.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn clone_with_overrides_leaves_original_untouched() {
        let base = ModelConfig::builder(LlmProvider::OpenAi)
            .model_name("gpt-4o-mini")
            .top_p(0.9)
            .build()
            .unwrap();
        let variant = base.to_builder().model_name("gpt-4o").seed(7).build().unwrap();
        assert_eq!(base.model_name(), "gpt-4o-mini");
        assert_eq!(base.sampling().seed, None);
        assert_eq!(variant.model_name(), "gpt-4o");
        assert_eq!(variant.sampling().top_p, Some(0.9));
        assert_eq!(variant.sampling().seed, Some(7));
    }

    #[test]
    fn json_round_trip_checks_class_name() {
        let c = ModelConfig::builder(LlmProvider::OpenAi)
            .base_url(Some("http://127.0.0.1:8080/v1".into()))
            .max_tokens(2048)
            .build()
            .unwrap();
        let v = c.to_json().unwrap();
        assert_eq!(v["class_name"], "ModelConfig");
        assert_eq!(v["provider"], "OpenAI");
        assert_eq!(v["max_tokens"], 2048);
        assert_eq!(ModelConfig::from_json(&v).unwrap(), c);

        let mut bad = v.clone();
        bad["class_name"] = "LlmConfig".into();
        assert!(ModelConfig::from_json(&bad).is_err());
    }

    #[test]
    fn resolve_requires_chat_mode() {
        let c = ModelConfig::builder(LlmProvider::OpenAi)
            .mode(LlmMode::Embeddings)
            .build()
            .unwrap();
        assert!(matches!(c.resolve(), Err(OcrError::InvalidConfig(_))));
    }

    #[test]
    fn resolve_with_base_url_uses_openai_compatible_adapter() {
        let c = ModelConfig::builder(LlmProvider::LlamaCpp)
            .base_url(Some("http://127.0.0.1:8080/v1".into()))
            .build()
            .unwrap();
        let handle = c.resolve().unwrap();
        assert_eq!(handle.model_name(), "llava");
    }
}
