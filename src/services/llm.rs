use crate::core::state::{ApiKey, TokenUsage};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Models offered in the preference form; the first is the default.
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    #[serde(default)]
    pub openai: Option<OpenAIConfig>,
    #[serde(default)]
    pub ollama: Option<OllamaConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            models: default_models(),
            openai: None,
            ollama: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct OpenAIConfig {
    pub base_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_models() -> Vec<String> {
    vec!["gpt-4o-mini".to_string(), "gpt-4o".to_string()]
}

impl LlmConfig {
    pub fn default_model(&self) -> String {
        self.models
            .first()
            .cloned()
            .unwrap_or_else(|| "gpt-4o-mini".to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait LlmClient: Send + Sync + Debug {
    /// One user-role message in, generated text and token counts out.
    async fn chat(&self, key: Option<&ApiKey>, request: &ChatRequest) -> Result<ChatResponse>;
}

pub fn create_llm(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        "openai" => {
            let base_url = config.openai.as_ref().and_then(|c| c.base_url.as_deref());
            Ok(Box::new(OpenAIClient::new(base_url)))
        }
        "ollama" => {
            let cfg = config.ollama.as_ref().context("Ollama config missing")?;
            Ok(Box::new(OllamaClient::new(&cfg.base_url)))
        }
        _ => Err(anyhow!("Unknown LLM provider: {}", config.provider)),
    }
}

// --- OpenAI ---

#[derive(Debug)]
struct OpenAIClient {
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIClient {
    fn new(base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl OpenAIResponse {
    fn into_chat_response(self) -> Result<ChatResponse> {
        let usage = self.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });
        let text = self
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("OpenAI response empty or missing content"))?;
        Ok(ChatResponse { text, usage })
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn chat(&self, key: Option<&ApiKey>, request: &ChatRequest) -> Result<ChatResponse> {
        let key = key.context("An API key is required for the OpenAI provider")?;
        let url = format!("{}/chat/completions", self.base_url);

        let request_body = OpenAIRequest {
            model: request.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", key.expose()))
            .json(&request_body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await?;
            return Err(anyhow!("OpenAI API error ({}): {}", status, error_text));
        }

        let result: OpenAIResponse = resp.json().await?;
        result.into_chat_response()
    }
}

// --- Ollama ---

#[derive(Debug)]
struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessageResponse,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct OllamaMessageResponse {
    content: String,
}

impl OllamaResponse {
    fn into_chat_response(self) -> ChatResponse {
        let usage = match (self.prompt_eval_count, self.eval_count) {
            (None, None) => None,
            (p, c) => Some(TokenUsage {
                prompt_tokens: p.unwrap_or(0),
                completion_tokens: c.unwrap_or(0),
            }),
        };
        ChatResponse {
            text: self.message.content,
            usage,
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(&self, _key: Option<&ApiKey>, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/api/chat", self.base_url);

        let request_body = OllamaRequest {
            model: request.model.clone(),
            messages: vec![OllamaMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            stream: false,
            options: OllamaOptions {
                num_predict: request.max_tokens,
                temperature: request.temperature,
            },
        };

        let resp = self.client.post(&url).json(&request_body).send().await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("Ollama API error: {}", error_text));
        }

        let result: OllamaResponse = resp.json().await?;
        Ok(result.into_chat_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_response_parsing_success() {
        let json = r#"{
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1677652288,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "SCENE 1: A fox wakes up."
                },
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 9,
                "completion_tokens": 12,
                "total_tokens": 21
            }
        }"#;

        let result: OpenAIResponse = serde_json::from_str(json).unwrap();
        let chat = result.into_chat_response().unwrap();
        assert_eq!(chat.text, "SCENE 1: A fox wakes up.");
        assert_eq!(
            chat.usage,
            Some(TokenUsage {
                prompt_tokens: 9,
                completion_tokens: 12
            })
        );
    }

    #[test]
    fn test_openai_response_without_content_is_error() {
        let json = r#"{ "choices": [{ "message": { "role": "assistant", "content": null } }] }"#;
        let result: OpenAIResponse = serde_json::from_str(json).unwrap();
        assert!(result.into_chat_response().is_err());

        let json = r#"{ "choices": [] }"#;
        let result: OpenAIResponse = serde_json::from_str(json).unwrap();
        assert!(result.into_chat_response().is_err());
    }

    #[test]
    fn test_ollama_response_usage() {
        let json = r#"{
            "model": "llama3",
            "message": { "role": "assistant", "content": "CHAPTER 1: ..." },
            "done": true,
            "prompt_eval_count": 26,
            "eval_count": 290
        }"#;
        let result: OllamaResponse = serde_json::from_str(json).unwrap();
        let chat = result.into_chat_response();
        assert_eq!(chat.usage.unwrap().total(), 316);

        let json = r#"{ "message": { "role": "assistant", "content": "x" } }"#;
        let result: OllamaResponse = serde_json::from_str(json).unwrap();
        assert!(result.into_chat_response().usage.is_none());
    }

    #[test]
    fn test_openai_request_shape() {
        let body = OpenAIRequest {
            model: "gpt-4o".to_string(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            max_tokens: 1500,
            temperature: 0.5,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["max_tokens"], 1500);
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["temperature"], 0.5);
    }

    #[test]
    fn test_create_llm_rejects_unknown_provider() {
        let config = LlmConfig {
            provider: "gemini".to_string(),
            ..LlmConfig::default()
        };
        assert!(create_llm(&config).is_err());

        let config = LlmConfig {
            provider: "ollama".to_string(),
            ..LlmConfig::default()
        };
        assert!(create_llm(&config).is_err(), "ollama without a base_url");
    }
}
