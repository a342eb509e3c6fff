use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::llm::CompletionModel;

/// Non-streaming chat-completion client for Ollama or OpenAI-compatible
/// APIs. Every prompt is sent as a single user message with the sampling
/// parameters from [`LlmConfig`].
#[derive(Clone)]
pub struct HttpCompletionModel {
    client: reqwest::Client,
    config: LlmConfig,
    timeout: Duration,
}

impl HttpCompletionModel {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        Self {
            client,
            config,
            timeout,
        }
    }
}

#[async_trait]
impl CompletionModel for HttpCompletionModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self.config.provider.as_str() {
            "ollama" => self.call_ollama(prompt).await,
            "openai" => self.call_openai(prompt).await,
            other => anyhow::bail!("Unknown provider: {other}"),
        }
    }
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
    frequency_penalty: f32,
    presence_penalty: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Message,
}

impl HttpCompletionModel {
    fn ollama_request(&self, prompt: &str) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.config.chat_model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                num_predict: self.config.max_tokens,
                frequency_penalty: self.config.frequency_penalty,
                presence_penalty: self.config.presence_penalty,
                stop: self.config.stop.clone(),
            },
        }
    }

    async fn call_ollama(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.config.base_url);

        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&self.ollama_request(prompt))
            .send()
            .await
            .context("Failed to call Ollama chat API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Ollama chat API returned {status}: {body}");
        }

        let body: OllamaChatResponse = resp
            .json()
            .await
            .context("Failed to parse Ollama chat response")?;
        Ok(body.message.content)
    }
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    frequency_penalty: f32,
    presence_penalty: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

impl HttpCompletionModel {
    fn openai_request(&self, prompt: &str) -> OpenAiChatRequest {
        OpenAiChatRequest {
            model: self.config.chat_model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            max_tokens: self.config.max_tokens,
            frequency_penalty: self.config.frequency_penalty,
            presence_penalty: self.config.presence_penalty,
            stop: self.config.stop.clone(),
        }
    }

    async fn call_openai(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&self.openai_request(prompt))
            .send()
            .await
            .context("Failed to call OpenAI chat API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI chat API returned {status}: {body}");
        }

        let body: OpenAiChatResponse = resp
            .json()
            .await
            .context("Failed to parse OpenAI chat response")?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("OpenAI chat API returned no content")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(provider: &str) -> HttpCompletionModel {
        let config = LlmConfig {
            provider: provider.to_string(),
            stop: vec!["Observation:".to_string()],
            ..LlmConfig::default()
        };
        HttpCompletionModel::new(reqwest::Client::new(), config)
    }

    #[test]
    fn test_openai_request_carries_fixed_parameters() {
        let req = model("openai").openai_request("hi");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["max_tokens"], 4000);
        assert_eq!(json["temperature"], 0.5);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["stop"][0], "Observation:");
    }

    #[test]
    fn test_ollama_request_maps_max_tokens_to_num_predict() {
        let req = model("ollama").ollama_request("hi");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 4000);
    }

    #[test]
    fn test_empty_stop_list_is_omitted() {
        let config = LlmConfig::default();
        let m = HttpCompletionModel::new(reqwest::Client::new(), config);
        let json = serde_json::to_value(m.openai_request("hi")).unwrap();
        assert!(json.get("stop").is_none());
    }

    #[tokio::test]
    async fn test_unknown_provider_errors() {
        let m = model("carrier-pigeon");
        assert!(m.complete("hi").await.is_err());
    }
}
