//! Text generation for personas and podcast scripts.
//!
//! The model is reached through any OpenAI-compatible chat completion API.
//! Output is treated as free-form text: personas are passed through to the
//! script prompt without being interpreted, and the script is handed to the
//! parser as-is apart from stripping reasoning blocks.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::{PodcastError, UpstreamError};

/// One prompt to the text-generation service.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A text-generation collaborator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError>;
}

/// Chat-completion backed generator.
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(
        api_base: &str,
        api_key: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PodcastError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                PodcastError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        Ok(Self {
            client: Client::with_config(config).with_http_client(http_client),
            model: model.into(),
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: request.system.clone().into(),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: request.prompt.clone().into(),
                name: None,
            }),
        ];

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_completion_tokens(request.max_tokens)
            .temperature(request.temperature)
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(chat_request).await?;
        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        let content = strip_reasoning(&content);
        if content.is_empty() {
            return Err(UpstreamError::EmptyResponse);
        }
        Ok(content)
    }
}

/// Persona descriptors as returned by the model.
///
/// Kept opaque: the only processing is removing a markdown code fence and,
/// when the payload is valid JSON, pretty-printing it for the script prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Personas {
    raw: String,
    json: Option<serde_json::Value>,
}

impl Personas {
    pub fn from_response(response: &str) -> Option<Self> {
        let raw = strip_code_fence(response).to_string();
        if raw.is_empty() {
            return None;
        }
        let json = serde_json::from_str(&raw).ok();
        Some(Self { raw, json })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        self.json.as_ref()
    }

    /// Text inserted into the script prompt.
    pub fn prompt_text(&self) -> String {
        self.json
            .as_ref()
            .and_then(|v| serde_json::to_string_pretty(v).ok())
            .unwrap_or_else(|| self.raw.clone())
    }
}

fn strip_code_fence(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string (```json) along with the fence.
        text = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        text = text.trim_end();
        text = text.strip_suffix("```").unwrap_or(text);
    }
    text.trim()
}

static REASONING_BLOCKS: LazyLock<Vec<regex::Regex>> = LazyLock::new(|| {
    [
        "thinking",
        "think",
        "reflection",
        "reflect",
        "reasoning",
        "thought",
        "scratchpad",
        "analysis",
    ]
    .iter()
    .filter_map(|tag| regex::Regex::new(&format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag)).ok())
    .collect()
});

/// Remove reasoning blocks some models emit before their answer.
///
/// Unlike free-form chat, a script may carry markup meant for the speech
/// service (`<phoneme>` tags), so only known reasoning tags are removed and
/// whitespace inside the text is left alone.
pub fn strip_reasoning(response: &str) -> String {
    let mut result = response.to_string();
    for re in REASONING_BLOCKS.iter() {
        result = re.replace_all(&result, "").into_owned();
    }
    result.trim().to_string()
}
