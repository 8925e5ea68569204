use crate::accuracy::blend_accuracy;
use jsonschema::JSONSchema;
use promptfactory_core::config::JudgeConfig;
use promptfactory_core::messages::ChatTurn;
use promptfactory_core::model::{ModelMessage, Parameters, Rating, Role};
use promptfactory_core::providers::llm::{ChatRequest, LlmClient};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const JUDGE_INSTRUCTIONS: &str = "You are an impartial evaluator of assistant conversations. \
Judge how well the assistant followed its system prompt. Reply with a single JSON object \
with numeric fields overall_quality, instruction_following, helpfulness and clarity, each \
between 0 and 100, and a string field rationale. Do not add any other text.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeScores {
    pub overall_quality: f64,
    pub instruction_following: f64,
    pub helpfulness: f64,
    pub clarity: f64,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgeEvaluation {
    pub scores: JudgeScores,
    pub original_accuracy: f64,
    pub final_accuracy: f64,
    pub good: usize,
    pub bad: usize,
    pub judge_model: String,
    pub latency_ms: u64,
}

fn judge_schema() -> Value {
    let score = json!({"type": "number", "minimum": 0, "maximum": 100});
    json!({
        "type": "object",
        "required": ["overall_quality", "instruction_following", "helpfulness", "clarity", "rationale"],
        "properties": {
            "overall_quality": score,
            "instruction_following": score,
            "helpfulness": score,
            "clarity": score,
            "rationale": {"type": "string"}
        }
    })
}

/// Pull the JSON object out of a judge reply. Models wrap it in a
/// markdown fence or surround it with chatter often enough that a plain
/// parse is only the first attempt.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    let fence = Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").ok()?;
    if let Some(caps) = fence.captures(trimmed) {
        if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(&caps[1]) {
            return Some(v);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
}

pub fn parse_judge_reply(text: &str) -> anyhow::Result<JudgeScores> {
    let value = extract_json(text)
        .ok_or_else(|| anyhow::anyhow!("judge reply did not contain a JSON object"))?;

    let schema = judge_schema();
    let compiled = JSONSchema::compile(&schema)
        .map_err(|e| anyhow::anyhow!("judge schema failed to compile: {}", e))?;
    if let Err(errors) = compiled.validate(&value) {
        let msgs: Vec<String> = errors
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect();
        anyhow::bail!("judge reply failed validation: {}", msgs.join("; "));
    }

    Ok(serde_json::from_value(value)?)
}

fn render_transcript(transcript: &[ModelMessage]) -> String {
    let mut out = String::new();
    for m in transcript {
        let Some(content) = m.content.as_deref() else {
            continue;
        };
        let who = match m.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        };
        out.push_str(who);
        out.push_str(": ");
        out.push_str(content);
        out.push('\n');
    }
    out
}

/// Asks an LLM to grade a conversation against its system prompt and
/// blends the verdict into the version's running accuracy.
pub struct JudgeEvaluator {
    client: Arc<dyn LlmClient>,
    model: String,
    timeout: Duration,
}

impl JudgeEvaluator {
    pub fn new(client: Arc<dyn LlmClient>, config: &JudgeConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn build_request(
        &self,
        system_prompt: &str,
        transcript: &[ModelMessage],
        original_accuracy: f64,
    ) -> ChatRequest {
        let system_prompt = if system_prompt.trim().is_empty() {
            "(none)"
        } else {
            system_prompt
        };
        let body = format!(
            "System prompt under test:\n{}\n\nConversation:\n{}\nPrevious accuracy: {:.1}",
            system_prompt,
            render_transcript(transcript),
            original_accuracy
        );
        ChatRequest {
            model: self.model.clone(),
            system_prompt: Some(JUDGE_INSTRUCTIONS.to_string()),
            messages: vec![ChatTurn {
                role: Role::User,
                content: body,
            }],
            parameters: Parameters {
                temperature: 0.0,
                ..Parameters::default()
            },
        }
    }

    pub async fn evaluate(
        &self,
        system_prompt: &str,
        transcript: &[ModelMessage],
        original_accuracy: f64,
    ) -> anyhow::Result<JudgeEvaluation> {
        if !transcript
            .iter()
            .any(|m| m.role == Role::Assistant && m.content.is_some())
        {
            anyhow::bail!("nothing to evaluate: conversation has no assistant replies");
        }

        let request = self.build_request(system_prompt, transcript, original_accuracy);
        let response = tokio::time::timeout(self.timeout, self.client.chat(&request))
            .await
            .map_err(|_| {
                anyhow::anyhow!("judge timed out after {}s", self.timeout.as_secs())
            })??;

        let scores = parse_judge_reply(&response.text)?;
        let ratings: Vec<Rating> = transcript
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .filter_map(|m| m.rating)
            .collect();
        let good = ratings.iter().filter(|r| **r == Rating::Good).count();
        let final_accuracy = blend_accuracy(original_accuracy, scores.overall_quality, &ratings);

        tracing::info!(
            event = "promptfactory.judge.evaluated",
            judge_model = %self.model,
            overall_quality = scores.overall_quality,
            original_accuracy,
            final_accuracy,
            good,
            bad = ratings.len() - good,
            latency_ms = response.latency_ms,
        );

        Ok(JudgeEvaluation {
            scores,
            original_accuracy,
            final_accuracy,
            good,
            bad: ratings.len() - good,
            judge_model: self.model.clone(),
            latency_ms: response.latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptfactory_core::providers::llm::fake::FakeClient;

    const REPLY: &str = r#"{"overall_quality": 50, "instruction_following": 60, "helpfulness": 70, "clarity": 80, "rationale": "ok"}"#;

    fn msg(role: Role, content: &str, rating: Option<Rating>) -> ModelMessage {
        ModelMessage {
            id: format!("id-{content}"),
            role,
            content: Some(content.to_string()),
            rating,
            spend_time: None,
            model: None,
        }
    }

    fn config(timeout_seconds: u64) -> JudgeConfig {
        JudgeConfig {
            model: "judge".into(),
            timeout_seconds,
        }
    }

    #[test]
    fn test_extracts_plain_fenced_and_embedded_json() {
        assert!(extract_json(REPLY).is_some());
        let fenced = format!("Here you go:\n```json\n{REPLY}\n```\nthanks");
        assert_eq!(extract_json(&fenced), extract_json(REPLY));
        let chatty = format!("Sure! {REPLY} Hope that helps.");
        assert_eq!(extract_json(&chatty), extract_json(REPLY));
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("[1, 2]").is_none());
    }

    #[test]
    fn test_rejects_out_of_range_scores() {
        let bad = r#"{"overall_quality": 140, "instruction_following": 60, "helpfulness": 70, "clarity": 80, "rationale": "ok"}"#;
        let err = parse_judge_reply(bad).unwrap_err().to_string();
        assert!(err.contains("overall_quality"), "{err}");

        let missing = r#"{"overall_quality": 40}"#;
        assert!(parse_judge_reply(missing).is_err());
    }

    #[tokio::test]
    async fn test_evaluate_blends_feedback() {
        let client = FakeClient::new().with_reply("judge", format!("```json\n{REPLY}\n```"));
        let judge = JudgeEvaluator::new(Arc::new(client), &config(5));
        let transcript = vec![
            msg(Role::User, "hi", None),
            msg(Role::Assistant, "hello", Some(Rating::Good)),
            msg(Role::User, "more", None),
            msg(Role::Assistant, "no", Some(Rating::Bad)),
        ];

        let eval = judge.evaluate("Be nice", &transcript, 50.0).await.unwrap();
        assert_eq!(eval.scores.clarity, 80.0);
        assert_eq!(eval.final_accuracy, 42.5);
        assert_eq!((eval.good, eval.bad), (1, 1));
    }

    #[tokio::test]
    async fn test_evaluate_refuses_empty_conversation() {
        let judge = JudgeEvaluator::new(Arc::new(FakeClient::new()), &config(5));
        let transcript = vec![msg(Role::User, "hi", None)];
        assert!(judge.evaluate("", &transcript, 0.0).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_times_out() {
        let client = FakeClient::new()
            .with_delay("judge", Duration::from_secs(30))
            .with_reply("judge", REPLY);
        let judge = JudgeEvaluator::new(Arc::new(client), &config(1));
        let transcript = vec![msg(Role::Assistant, "hello", None)];
        let err = judge.evaluate("", &transcript, 0.0).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_request_carries_prompt_transcript_and_accuracy() {
        let judge = JudgeEvaluator::new(Arc::new(FakeClient::new()), &config(5));
        let req = judge.build_request(
            "## Character\nTerse.",
            &[msg(Role::User, "hi", None), msg(Role::Assistant, "yo", None)],
            61.5,
        );
        assert_eq!(req.model, "judge");
        let body = &req.messages[0].content;
        assert!(body.contains("## Character\nTerse."));
        assert!(body.contains("User: hi\nAssistant: yo\n"));
        assert!(body.contains("Previous accuracy: 61.5"));
    }
}
