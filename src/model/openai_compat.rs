//! Adapter for OpenAI-compatible `/chat/completions` endpoints.
//!
//! Used whenever a config carries a `base_url`: self-hosted OpenAI proxies,
//! LM Studio, and llama.cpp's server. Request building and reply parsing are
//! plain functions over `serde_json::Value` so they can be tested without a
//! server.

use super::chat::{ChatModel, ChatReply, UserContent};
use super::{ModelConfig, SamplingOptions};
use crate::error::{OcrError, ProviderError};
use crate::providers::LlmProvider;
use crate::usage::TokenUsage;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};

#[derive(Debug)]
pub struct OpenAiCompatibleChatModel {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    provider: LlmProvider,
    model_name: String,
    temperature: f32,
    sampling: SamplingOptions,
    timeout_secs: Option<u64>,
}

impl OpenAiCompatibleChatModel {
    pub fn new(config: &ModelConfig) -> Result<Self, OcrError> {
        let base_url = config.base_url().ok_or_else(|| OcrError::BaseUrlRequired {
            provider: config.provider().to_string(),
        })?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| OcrError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: config.provider().api_key(),
            provider: config.provider(),
            model_name: config.model_name().to_string(),
            temperature: config.temperature(),
            sampling: config.sampling().clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, system_prompt: &str, content: &UserContent) -> Value {
        build_request_body(
            self.provider,
            &self.model_name,
            self.temperature,
            &self.sampling,
            system_prompt,
            content,
        )
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleChatModel {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn invoke(&self, system_prompt: &str, content: &UserContent) -> Result<ChatReply, ProviderError> {
        let body = self.request_body(system_prompt, content);

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    secs: self.timeout_secs.unwrap_or_default(),
                }
            } else {
                ProviderError::Api(format!("{} request failed: {e}", self.provider))
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(ProviderError::RateLimited {
                provider: self.provider.to_string(),
                retry_after_secs,
            });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth {
                provider: self.provider.to_string(),
                detail: format!("{status}: {detail}"),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("{} returned {status}: {text}", self.provider)));
        }

        let raw = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Api(format!("{} read error: {e}", self.provider)))?;
        let payload: Value = serde_json::from_slice(&raw).map_err(|e| {
            tracing::error!(
                provider = %self.provider,
                raw_response = %String::from_utf8_lossy(&raw),
                "failed to parse chat completion JSON"
            );
            ProviderError::MalformedResponse(e.to_string())
        })?;

        parse_reply(&payload)
    }
}

/// Request body for one page. Sampling fields are forwarded only when set,
/// and only those the target server understands.
pub(crate) fn build_request_body(
    provider: LlmProvider,
    model_name: &str,
    temperature: f32,
    sampling: &SamplingOptions,
    system_prompt: &str,
    content: &UserContent,
) -> Value {
    let mut body = Map::new();
    body.insert("model".into(), json!(model_name));
    body.insert(
        "messages".into(),
        json!([
            { "role": "system", "content": system_prompt },
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": content.text },
                    { "type": "image_url", "image_url": { "url": content.image.data_uri(), "detail": "high" } }
                ]
            }
        ]),
    );
    body.insert("temperature".into(), json!(temperature));
    body.insert("stream".into(), json!(false));

    let mut put = |key: &str, value: Option<Value>| {
        if let Some(v) = value {
            body.insert(key.to_string(), v);
        }
    };
    put("top_p", sampling.top_p.map(|v| json!(v)));
    put("seed", sampling.seed.map(|v| json!(v)));
    put("max_tokens", sampling.max_tokens.map(|v| json!(v)));

    if provider == LlmProvider::LlamaCpp {
        // llama.cpp server names. Servers started with a fixed context ignore num_ctx.
        put("num_ctx", sampling.num_ctx.map(|v| json!(v)));
        put("top_k", sampling.top_k.map(|v| json!(v)));
        put("repeat_penalty", sampling.repeat_penalty.map(|v| json!(v)));
        put("repeat_last_n", sampling.repeat_last_n.map(|v| json!(v)));
        put("mirostat", sampling.mirostat.map(|v| json!(v)));
        put("mirostat_eta", sampling.mirostat_eta.map(|v| json!(v)));
        put("mirostat_tau", sampling.mirostat_tau.map(|v| json!(v)));
        put("tfs_z", sampling.tfs_z.map(|v| json!(v)));
        put("n_predict", sampling.num_predict.map(|v| json!(v)));
    }

    Value::Object(body)
}

/// Extract text and usage from a chat completion payload.
pub(crate) fn parse_reply(payload: &Value) -> Result<ChatReply, ProviderError> {
    let message = payload
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| ProviderError::MalformedResponse("no choices[0].message in reply".into()))?;

    let text = match message.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        Some(Value::Null) | None => String::new(),
        Some(other) => {
            return Err(ProviderError::MalformedResponse(format!(
                "unexpected message content: {other}"
            )))
        }
    };

    Ok(ChatReply {
        text,
        usage: TokenUsage::from_payload(payload.get("usage").unwrap_or(&Value::Null)),
    })
}
