//! The chat-model seam between the extractor and concrete provider clients.
//!
//! The extractor only ever sees a [`ChatModelHandle`]. Tests plug in scripted
//! implementations; production code gets one from
//! [`crate::model::ModelConfig::resolve`].

use crate::error::ProviderError;
use crate::pipeline::encode::EncodedImage;
use crate::usage::TokenUsage;
use async_trait::async_trait;
use std::sync::Arc;

/// The user turn of a page request: instruction text plus the page image.
#[derive(Debug, Clone)]
pub struct UserContent {
    pub text: String,
    pub image: EncodedImage,
}

/// A successful model reply.
#[derive(Debug, Clone, Default)]
pub struct ChatReply {
    /// Raw assistant text, before any post-processing.
    pub text: String,
    /// Usage normalised by the adapter.
    pub usage: TokenUsage,
}

/// A chat-capable model, safe to invoke concurrently from many page tasks.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier used for pricing lookup and logging.
    fn model_name(&self) -> &str;

    /// Send a system message and one multimodal user message.
    async fn invoke(&self, system_prompt: &str, content: &UserContent) -> Result<ChatReply, ProviderError>;
}

/// Shared handle passed to every page task.
pub type ChatModelHandle = Arc<dyn ChatModel>;
