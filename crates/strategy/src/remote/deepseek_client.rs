use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::traits::LlmApi;

// DeepSeek exposes an OpenAI-compatible chat-completions API.
const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
const ENDPOINT_CHAT: &str = "/chat/completions";
const DEFAULT_MODEL: &str = "deepseek-chat";
const TIMEOUT_SECS: u64 = 90;

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

pub struct DeepSeekClient {
    client: Client,
    api_key: String,
    model: String,
}

impl DeepSeekClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client."),
            api_key,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

#[async_trait]
impl LlmApi for DeepSeekClient {
    async fn chat(&self, system: &str, user: &str) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user.to_string(),
                },
            ],
            stream: false,
        };

        debug!("Calling chat completions: model={}", self.model);

        let resp = self
            .client
            .post(format!("{}{}", DEEPSEEK_BASE_URL, ENDPOINT_CHAT))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .context("chat completion request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            bail!("DeepSeek API error ({}): {}", status, error_text);
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        let Some(choice) = chat.choices.into_iter().next() else {
            bail!("no choices in chat completion response");
        };

        Ok(choice.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_in_openai_shape() {
        let request = ChatRequest {
            model: DEFAULT_MODEL.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are helpful".to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: "Hello".to_string(),
                },
            ],
            stream: false,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "deepseek-chat");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Hello");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn response_content_is_reachable() {
        let payload = r#"{
            "id":"chatcmpl-1","object":"chat.completion","created":1700000000,
            "model":"deepseek-chat",
            "choices":[{"index":0,"message":{"role":"assistant","content":"{\"signal\":\"HOLD\"}"},"finish_reason":"stop"}],
            "usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}
        }"#;

        let parsed: ChatResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.choices[0].message.content, "{\"signal\":\"HOLD\"}");
    }
}
