use super::{ChatRequest, LlmClient, LlmResponse};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Instant;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAIClient {
    pub base_url: String,
    pub api_key: String,
    pub client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(base_url: impl Into<String>, api_key: String) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Reads the key from `api_key_env`.
    pub fn from_env(base_url: &str, api_key_env: &str) -> anyhow::Result<Self> {
        let api_key = std::env::var(api_key_env)
            .with_context(|| format!("{} is not set", api_key_env))?;
        Ok(Self::new(base_url, api_key))
    }

    fn body(request: &ChatRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            messages.push(json!({ "role": "system", "content": system }));
        }
        for turn in &request.messages {
            messages.push(json!({ "role": turn.role.as_str(), "content": turn.content }));
        }

        let p = &request.parameters;
        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": p.temperature,
            "max_tokens": p.max_tokens,
            "top_p": p.top_p,
            "presence_penalty": p.presence_penalty,
            "frequency_penalty": p.frequency_penalty,
        });
        if let Some(seed) = p.seed {
            body["seed"] = json!(seed);
        }
        body
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn chat(&self, request: &ChatRequest) -> anyhow::Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let started = Instant::now();

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&Self::body(request))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI chat API error ({}): {}", status, error_text);
        }

        let json: Value = resp.json().await?;
        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("OpenAI API response missing content"))?
            .to_string();

        Ok(LlmResponse {
            text,
            provider: "openai".to_string(),
            model: request.model.clone(),
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
