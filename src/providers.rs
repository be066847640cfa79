//! Provider registry: the closed set of LLM vendors and their static facts.
//!
//! Every provider-specific branch in the crate keys off [`LlmProvider`] and
//! the [`ProviderInfo`] row returned by [`LlmProvider::info`]; nothing
//! inspects handle types at runtime.

use crate::error::OcrError;
use crate::model::LlmMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LlmProvider {
    /// OpenAI API (or any OpenAI-compatible endpoint via `base_url`).
    #[serde(rename = "OpenAI")]
    OpenAi,
    /// Anthropic Claude API.
    Anthropic,
    /// AWS Bedrock.
    Bedrock,
    /// Local llama.cpp server speaking the OpenAI chat protocol.
    LlamaCpp,
}

/// Static registry row for one provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderInfo {
    /// Model used when the caller gives none for a non-chat mode.
    pub default_model: &'static str,
    /// Vision-capable model used for page extraction by default.
    pub vision_model: &'static str,
    /// Credential environment variable, if the provider needs one.
    pub env_key: Option<&'static str>,
    /// Modes the provider can serve.
    pub modes: &'static [LlmMode],
    /// Whether a `base_url` override is accepted.
    pub supports_base_url: bool,
    /// Whether a `base_url` must be given.
    pub requires_base_url: bool,
    /// Identifier understood by `edgequake_llm::ProviderFactory`.
    pub factory_name: &'static str,
}

const OPENAI: ProviderInfo = ProviderInfo {
    default_model: "gpt-4o",
    vision_model: "gpt-4o",
    env_key: Some("OPENAI_API_KEY"),
    modes: &[LlmMode::Base, LlmMode::Chat, LlmMode::Embeddings],
    supports_base_url: true,
    requires_base_url: false,
    factory_name: "openai",
};

const ANTHROPIC: ProviderInfo = ProviderInfo {
    default_model: "claude-3-5-sonnet-20240620",
    vision_model: "claude-3-5-sonnet-20241022",
    env_key: Some("ANTHROPIC_API_KEY"),
    modes: &[LlmMode::Chat],
    supports_base_url: false,
    requires_base_url: false,
    factory_name: "anthropic",
};

const BEDROCK: ProviderInfo = ProviderInfo {
    default_model: "anthropic.claude-3-5-sonnet-20240620-v1:0",
    vision_model: "anthropic.claude-3-5-sonnet-20241022-v2:0",
    env_key: Some("BEDROCK_API_KEY"),
    modes: &[LlmMode::Base, LlmMode::Chat, LlmMode::Embeddings],
    supports_base_url: false,
    requires_base_url: false,
    factory_name: "bedrock",
};

const LLAMACPP: ProviderInfo = ProviderInfo {
    default_model: "default",
    vision_model: "llava",
    env_key: None,
    modes: &[LlmMode::Base, LlmMode::Chat],
    supports_base_url: true,
    requires_base_url: true,
    factory_name: "openai",
};

impl LlmProvider {
    /// All providers, in registry order.
    pub const ALL: [LlmProvider; 4] = [
        LlmProvider::OpenAi,
        LlmProvider::Anthropic,
        LlmProvider::Bedrock,
        LlmProvider::LlamaCpp,
    ];

    /// Registry row for this provider.
    pub fn info(self) -> &'static ProviderInfo {
        match self {
            LlmProvider::OpenAi => &OPENAI,
            LlmProvider::Anthropic => &ANTHROPIC,
            LlmProvider::Bedrock => &BEDROCK,
            LlmProvider::LlamaCpp => &LLAMACPP,
        }
    }

    /// Display name, e.g. `"OpenAI"`.
    pub fn as_str(self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "OpenAI",
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::Bedrock => "Bedrock",
            LlmProvider::LlamaCpp => "LlamaCpp",
        }
    }

    pub fn supports_mode(self, mode: LlmMode) -> bool {
        self.info().modes.contains(&mode)
    }

    /// The credential value, if the provider needs one and it is set.
    pub fn api_key(self) -> Option<String> {
        self.info()
            .env_key
            .and_then(|k| std::env::var(k).ok())
            .filter(|v| !v.is_empty())
    }

    /// True when no credential is needed or the credential env var is non-empty.
    pub fn is_api_key_set(self) -> bool {
        self.info().env_key.is_none() || self.api_key().is_some()
    }

    /// Fail with [`OcrError::MissingCredential`] unless [`Self::is_api_key_set`].
    pub fn require_api_key(self) -> Result<(), OcrError> {
        match self.info().env_key {
            Some(env_key) if self.api_key().is_none() => Err(OcrError::MissingCredential {
                provider: self.as_str().to_string(),
                env_key: env_key.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = OcrError;

    /// Case-insensitive exact match first, then unambiguous-by-order prefix
    /// match (`"anth"` → Anthropic). `"llama.cpp"` is accepted as an alias.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('.', "");
        if wanted.is_empty() {
            return Err(OcrError::UnknownProvider {
                name: s.to_string(),
            });
        }
        for p in Self::ALL {
            let name = p.as_str().to_lowercase();
            if name == wanted || name.starts_with(&wanted) {
                return Ok(p);
            }
        }
        Err(OcrError::UnknownProvider {
            name: s.to_string(),
        })
    }
}
