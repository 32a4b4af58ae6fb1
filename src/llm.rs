//! Language model client
//!
//! Talks to an OpenAI-compatible chat completions endpoint (OpenRouter by
//! default). Uses a long-lived reqwest::Client for connection pooling.
//! Every completion carries its token usage so callers can price a query.

use crate::config::LlmConfig;
use crate::error::LedgerError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ops::AddAssign;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error};

//
// ================= Usage & Pricing =================
//

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Rough estimate used when the backend does not report usage
    pub fn estimate(prompt: &str, completion: &str) -> Self {
        Self {
            prompt_tokens: ((prompt.len() + 3) / 4) as u64,
            completion_tokens: ((completion.len() + 3) / 4) as u64,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
    }
}

/// Price per 1K tokens, in dollars
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pricing {
    pub prompt_per_1k: f64,
    pub completion_per_1k: f64,
}

impl Pricing {
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.prompt_tokens as f64 / 1000.0) * self.prompt_per_1k
            + (usage.completion_tokens as f64 / 1000.0) * self.completion_per_1k
    }
}

//
// ================= Requests =================
//

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub stop: Vec<String>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            stop: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop.push(stop.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// Trait for a text-completion backend
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}

//
// ================= OpenRouter =================
//

/// Reusable OpenAI-compatible client (connection-pooled)
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl OpenRouterClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for OpenRouterClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        if self.api_key.is_empty() {
            return Err(LedgerError::Llm("OPENROUTER_API_KEY not configured".to_string()));
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        let body = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: 0.0,
            max_tokens: self.max_tokens,
            stop: if request.stop.is_empty() {
                None
            } else {
                Some(request.stop.clone())
            },
        };

        debug!(model = %self.model, prompt_len = request.prompt.len(), "Calling chat completions");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", "http://localhost:5003")
            .header("X-Title", "Personal Finance Agent")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Chat completion request failed: {}", e);
                LedgerError::Llm(format!("request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Chat completion error response: {}", error_text);
            return Err(LedgerError::Llm(format!("{}: {}", status, error_text)));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Llm(format!("parse error: {}", e)))?;

        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LedgerError::Llm("empty response".to_string()))?;

        let usage = match chat.usage {
            Some(u) => TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            },
            None => TokenUsage::estimate(&request.prompt, &text),
        };

        Ok(Completion { text, usage })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<UsageBlock>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageBlock {
    prompt_tokens: u64,
    completion_tokens: u64,
}

//
// ================= Test doubles =================
//

/// Replays canned responses in order and records every prompt it saw.
///
/// Keeps tests and offline runs functional without a model endpoint.
/// Once the script is exhausted every call fails.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue a failing call
    pub fn push_error(&self, message: &str) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Err(LedgerError::Llm(message.to_string())));
        }
    }

    pub fn push_response(&self, text: &str) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Ok(text.to_string()));
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.clone());
        }

        let next = self
            .responses
            .lock()
            .map_err(|_| LedgerError::Llm("scripted model poisoned".to_string()))?
            .pop_front()
            .unwrap_or_else(|| Err(LedgerError::Llm("script exhausted".to_string())));

        let text = next?;
        let usage = TokenUsage::estimate(&request.prompt, &text);
        Ok(Completion { text, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: "deepseek/deepseek-chat-v3-0324:free".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "Categorize: Coffee Shop".to_string(),
            }],
            temperature: 0.0,
            max_tokens: 1024,
            stop: None,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("Coffee Shop"));
        assert!(!json.contains("stop"));
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant", "content": "[]"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("[]"));
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 12);
    }

    #[test]
    fn test_pricing() {
        let pricing = Pricing {
            prompt_per_1k: 0.001,
            completion_per_1k: 0.002,
        };
        let usage = TokenUsage {
            prompt_tokens: 2000,
            completion_tokens: 500,
        };
        assert!((pricing.cost(&usage) - 0.003).abs() < 1e-12);
        assert_eq!(usage.total(), 2500);
    }

    #[tokio::test]
    async fn test_scripted_model_replays_then_fails() {
        let model = ScriptedModel::new(["first"]);
        model.push_error("rate limited");

        let first = model.complete(&CompletionRequest::new("a")).await.unwrap();
        assert_eq!(first.text, "first");
        assert!(first.usage.total() > 0);

        assert!(model.complete(&CompletionRequest::new("b")).await.is_err());
        assert!(model.complete(&CompletionRequest::new("c")).await.is_err());
        assert_eq!(model.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let config = LlmConfig {
            api_key: String::new(),
            ..LlmConfig::default()
        };
        let client = OpenRouterClient::new(&config).unwrap();
        let result = client.complete(&CompletionRequest::new("hi")).await;

        let error_msg = result.unwrap_err().to_string();
        assert!(error_msg.contains("OPENROUTER_API_KEY"));
    }
}
