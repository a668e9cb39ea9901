//! Hosted model backends over HTTP.

use super::{ChatRole, ContentGenerator, GenerationRequest};
use crate::config::ReportConfig;
use crate::error::{Error, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Anthropic requires an explicit output limit.
const ANTHROPIC_DEFAULT_MAX_TOKENS: u32 = 4096;

/// Which hosted model family drives a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmChoice {
    #[default]
    Gpt,
    Claude,
}

impl LlmChoice {
    pub fn default_model(self) -> &'static str {
        match self {
            LlmChoice::Gpt => "gpt-4o",
            LlmChoice::Claude => "claude-3-opus-20240229",
        }
    }

    /// Environment variable that overrides the model name.
    pub fn model_env(self) -> &'static str {
        match self {
            LlmChoice::Gpt => "GPT_MODEL",
            LlmChoice::Claude => "CLAUDE_MODEL",
        }
    }
}

impl FromStr for LlmChoice {
    type Err = std::convert::Infallible;

    /// Unknown names select the default backend.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => LlmChoice::Claude,
            _ => LlmChoice::Gpt,
        })
    }
}

impl fmt::Display for LlmChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmChoice::Gpt => write!(f, "gpt"),
            LlmChoice::Claude => write!(f, "claude"),
        }
    }
}

/// Build the backend selected by the config.
pub fn build_generator(config: &ReportConfig) -> Result<Arc<dyn ContentGenerator>, Error> {
    let generator: Arc<dyn ContentGenerator> = match config.llm {
        LlmChoice::Gpt => Arc::new(OpenAiClient::from_env(config)?),
        LlmChoice::Claude => Arc::new(AnthropicClient::from_env(config)?),
    };
    Ok(generator)
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::Http(e.to_string()))
}

fn map_send_error(err: reqwest::Error, base_url: &str, timeout: Duration) -> LlmError {
    if err.is_connect() {
        LlmError::Http(format!("cannot connect to {}", base_url))
    } else if err.is_timeout() {
        LlmError::Http(format!("request timed out after {}s", timeout.as_secs()))
    } else {
        LlmError::Http(err.to_string())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, LlmError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Status {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|e| LlmError::Malformed(e.to_string()))
}

// ---------------------------------------------------------------------------
// OpenAI chat completions
// ---------------------------------------------------------------------------

/// OpenAI-compatible chat completions client.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout: Duration,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiContent,
}

#[derive(Deserialize)]
struct OpenAiContent {
    content: Option<String>,
}

impl<'a> OpenAiRequest<'a> {
    fn from_request(
        model: &'a str,
        request: &'a GenerationRequest,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Self {
        Self {
            model,
            messages: request
                .messages
                .iter()
                .map(|m| OpenAiMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature,
            max_tokens,
        }
    }
}

impl OpenAiResponse {
    /// Content of the first choice.
    fn into_text(self) -> Result<String, LlmError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, config: &ReportConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client(config.request_timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.request_timeout,
        })
    }

    /// Client using `OPENAI_API_KEY` and, if set, `OPENAI_BASE_URL`.
    pub fn from_env(config: &ReportConfig) -> Result<Self, LlmError> {
        let api_key =
            env::var("OPENAI_API_KEY").map_err(|_| LlmError::MissingApiKey("OPENAI_API_KEY"))?;
        let base_url = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| OPENAI_BASE_URL.to_string());
        Self::new(&base_url, &api_key, config)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ContentGenerator for OpenAiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = OpenAiRequest::from_request(&self.model, request, self.temperature, self.max_tokens);

        tracing::debug!(purpose = %request.purpose, model = %self.model, "OpenAI request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(e, &self.base_url, self.timeout))?;

        read_json::<OpenAiResponse>(response).await?.into_text()
    }
}

// ---------------------------------------------------------------------------
// Anthropic messages
// ---------------------------------------------------------------------------

/// Anthropic messages API client.
pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: u32,
    timeout: Duration,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<OpenAiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl<'a> AnthropicRequest<'a> {
    // System prompts travel in their own field
    fn from_request(
        model: &'a str,
        max_tokens: u32,
        request: &'a GenerationRequest,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            model,
            max_tokens,
            system: request.system_prompt(),
            messages: request
                .messages
                .iter()
                .filter(|m| m.role != ChatRole::System)
                .map(|m| OpenAiMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature,
        }
    }
}

impl AnthropicResponse {
    /// The text blocks joined in order; other block types are skipped.
    fn into_text(self) -> Result<String, LlmError> {
        let text: String = self
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();

        if text.trim().is_empty() {
            Err(LlmError::EmptyResponse)
        } else {
            Ok(text)
        }
    }
}

impl AnthropicClient {
    pub fn new(base_url: &str, api_key: &str, config: &ReportConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client(config.request_timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens.unwrap_or(ANTHROPIC_DEFAULT_MAX_TOKENS),
            timeout: config.request_timeout,
        })
    }

    /// Client using `ANTHROPIC_API_KEY` and, if set, `ANTHROPIC_BASE_URL`.
    pub fn from_env(config: &ReportConfig) -> Result<Self, LlmError> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .map_err(|_| LlmError::MissingApiKey("ANTHROPIC_API_KEY"))?;
        let base_url =
            env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| ANTHROPIC_BASE_URL.to_string());
        Self::new(&base_url, &api_key, config)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ContentGenerator for AnthropicClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body =
            AnthropicRequest::from_request(&self.model, self.max_tokens, request, self.temperature);

        tracing::debug!(purpose = %request.purpose, model = %self.model, "Anthropic request");
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(e, &self.base_url, self.timeout))?;

        read_json::<AnthropicResponse>(response).await?.into_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Purpose;

    #[test]
    fn test_llm_choice_parsing() {
        assert_eq!("claude".parse::<LlmChoice>().unwrap(), LlmChoice::Claude);
        assert_eq!(" Claude ".parse::<LlmChoice>().unwrap(), LlmChoice::Claude);
        assert_eq!("gpt".parse::<LlmChoice>().unwrap(), LlmChoice::Gpt);
        assert_eq!("something".parse::<LlmChoice>().unwrap(), LlmChoice::Gpt);
        assert_eq!(LlmChoice::Claude.to_string(), "claude");
    }

    #[test]
    fn test_openai_body_shape() {
        let request = GenerationRequest::new(Purpose::Skeleton)
            .system("sys")
            .user("hello");
        let body = OpenAiRequest::from_request("gpt-4o", &request, Some(0.5), None);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
        assert_eq!(json["temperature"], 0.5);
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_anthropic_body_moves_system_prompt() {
        let request = GenerationRequest::new(Purpose::Skeleton)
            .system("sys")
            .user("hello");
        let body = AnthropicRequest::from_request("claude-3-opus-20240229", 4096, &request, None);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["system"], "sys");
        assert_eq!(json["max_tokens"], 4096);
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_openai_response_takes_first_choice() {
        let parsed: OpenAiResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": "<p>a</p>"}}, {"message": {"content": "<p>b</p>"}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.into_text().unwrap(), "<p>a</p>");

        let blank: OpenAiResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": "  "}}]}"#).unwrap();
        assert_eq!(blank.into_text(), Err(LlmError::EmptyResponse));
        let none: OpenAiResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert_eq!(none.into_text(), Err(LlmError::EmptyResponse));
    }

    #[test]
    fn test_anthropic_response_joins_text_blocks() {
        let raw = r#"{"content": [
            {"type": "text", "text": "<h2>A</h2>"},
            {"type": "tool_use", "id": "x"},
            {"type": "text", "text": "<p>b</p>"}
        ]}"#;
        let parsed: AnthropicResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.into_text().unwrap(), "<h2>A</h2><p>b</p>");

        let only_tools: AnthropicResponse =
            serde_json::from_str(r#"{"content": [{"type": "tool_use", "id": "x"}]}"#).unwrap();
        assert_eq!(only_tools.into_text(), Err(LlmError::EmptyResponse));
    }

    #[test]
    fn test_missing_key_is_reported() {
        let config = ReportConfig::new(LlmChoice::Gpt);
        if env::var("OPENAI_API_KEY").is_err() {
            assert!(matches!(
                OpenAiClient::from_env(&config),
                Err(LlmError::MissingApiKey("OPENAI_API_KEY"))
            ));
        }
    }
}
