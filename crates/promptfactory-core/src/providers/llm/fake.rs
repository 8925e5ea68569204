use super::{ChatRequest, LlmClient, LlmResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
enum Scripted {
    Echo,
    Reply(String),
    Fail(String),
}

#[derive(Debug, Clone)]
struct Script {
    delay: Duration,
    outcome: Scripted,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Scripted::Echo,
        }
    }
}

/// Deterministic offline provider. Unscripted models echo the last user
/// turn as `[model] text`.
#[derive(Debug, Clone, Default)]
pub struct FakeClient {
    fallback: Script,
    scripts: HashMap<String, Script>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn script_mut(&mut self, model: &str) -> &mut Script {
        self.scripts.entry(model.to_string()).or_default()
    }

    pub fn with_delay(mut self, model: &str, delay: Duration) -> Self {
        self.script_mut(model).delay = delay;
        self
    }

    pub fn with_reply(mut self, model: &str, text: impl Into<String>) -> Self {
        self.script_mut(model).outcome = Scripted::Reply(text.into());
        self
    }

    pub fn with_failure(mut self, model: &str, message: impl Into<String>) -> Self {
        self.script_mut(model).outcome = Scripted::Fail(message.into());
        self
    }

    /// Reply used for every model without its own script.
    pub fn with_default_reply(mut self, text: impl Into<String>) -> Self {
        self.fallback.outcome = Scripted::Reply(text.into());
        self
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn chat(&self, request: &ChatRequest) -> anyhow::Result<LlmResponse> {
        let started = Instant::now();
        let script = self.scripts.get(&request.model).unwrap_or(&self.fallback);
        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }

        let text = match &script.outcome {
            Scripted::Echo => {
                let last = request
                    .messages
                    .last()
                    .map(|t| t.content.as_str())
                    .unwrap_or_default();
                format!("[{}] {}", request.model, last)
            }
            Scripted::Reply(text) => text.clone(),
            Scripted::Fail(message) => anyhow::bail!("{}", message),
        };

        Ok(LlmResponse {
            text,
            provider: "fake".to_string(),
            model: request.model.clone(),
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ChatTurn;
    use crate::model::{Parameters, Role};

    fn request(model: &str, text: &str) -> ChatRequest {
        ChatRequest {
            model: model.into(),
            system_prompt: None,
            messages: vec![ChatTurn {
                role: Role::User,
                content: text.into(),
            }],
            parameters: Parameters::default(),
        }
    }

    #[tokio::test]
    async fn test_scripts_are_per_model() {
        let client = FakeClient::new()
            .with_reply("judge", "{}")
            .with_failure("broken", "boom");

        let echo = client.chat(&request("gpt-4o", "hello")).await.unwrap();
        assert_eq!(echo.text, "[gpt-4o] hello");
        assert_eq!(echo.provider, "fake");

        assert_eq!(client.chat(&request("judge", "x")).await.unwrap().text, "{}");

        let err = client.chat(&request("broken", "x")).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_honoured() {
        let client = FakeClient::new().with_delay("slow", Duration::from_secs(5));
        let started = tokio::time::Instant::now();
        client.chat(&request("slow", "x")).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
