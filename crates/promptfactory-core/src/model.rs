use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of a store mutation.
///
/// Store mutators never fail loudly; this lets callers tell a no-op apart
/// from a change that actually landed.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Applied,
    /// The addressed record does not exist.
    NotFound,
    /// The record exists but the request was out of range or made in the
    /// wrong state.
    Ignored,
}

impl Mutation {
    pub fn is_applied(self) -> bool {
        matches!(self, Mutation::Applied)
    }
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SystemPromptSection {
    CharacterSettings,
    BackgroundInfo,
    TaskGoals,
    Constraints,
    OutputFormat,
    Examples,
}

impl SystemPromptSection {
    pub const ALL: [SystemPromptSection; 6] = [
        SystemPromptSection::CharacterSettings,
        SystemPromptSection::BackgroundInfo,
        SystemPromptSection::TaskGoals,
        SystemPromptSection::Constraints,
        SystemPromptSection::OutputFormat,
        SystemPromptSection::Examples,
    ];

    /// Key used in `isSystemPromptOn` and on the command line.
    pub fn key(self) -> &'static str {
        match self {
            SystemPromptSection::CharacterSettings => "characterSettings",
            SystemPromptSection::BackgroundInfo => "backgroundInfo",
            SystemPromptSection::TaskGoals => "taskGoals",
            SystemPromptSection::Constraints => "constraints",
            SystemPromptSection::OutputFormat => "outputFormat",
            SystemPromptSection::Examples => "examples",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            SystemPromptSection::CharacterSettings => "Character",
            SystemPromptSection::BackgroundInfo => "Background",
            SystemPromptSection::TaskGoals => "Goals",
            SystemPromptSection::Constraints => "Constraints",
            SystemPromptSection::OutputFormat => "Output Format",
            SystemPromptSection::Examples => "Examples",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.replace(['-', '_'], "").to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|section| section.key().to_ascii_lowercase() == wanted)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemPromptData {
    pub character_settings: String,
    pub background_info: String,
    pub task_goals: String,
    pub constraints: String,
    pub output_format: String,
    pub examples: String,
}

impl SystemPromptData {
    pub fn get(&self, section: SystemPromptSection) -> &str {
        match section {
            SystemPromptSection::CharacterSettings => &self.character_settings,
            SystemPromptSection::BackgroundInfo => &self.background_info,
            SystemPromptSection::TaskGoals => &self.task_goals,
            SystemPromptSection::Constraints => &self.constraints,
            SystemPromptSection::OutputFormat => &self.output_format,
            SystemPromptSection::Examples => &self.examples,
        }
    }

    pub fn set(&mut self, section: SystemPromptSection, text: impl Into<String>) {
        let slot = match section {
            SystemPromptSection::CharacterSettings => &mut self.character_settings,
            SystemPromptSection::BackgroundInfo => &mut self.background_info,
            SystemPromptSection::TaskGoals => &mut self.task_goals,
            SystemPromptSection::Constraints => &mut self.constraints,
            SystemPromptSection::OutputFormat => &mut self.output_format,
            SystemPromptSection::Examples => &mut self.examples,
        };
        *slot = text.into();
    }
}

/// Section toggles keyed by [`SystemPromptSection::key`]. A missing key means on.
pub type SectionToggles = BTreeMap<String, bool>;

pub fn section_enabled(toggles: &SectionToggles, section: SystemPromptSection) -> bool {
    toggles.get(section.key()).copied().unwrap_or(true)
}

/// Builds the system prompt actually sent to a provider: every enabled,
/// non-empty section under its own heading, in declaration order.
pub fn compose_system_prompt(prompt: &SystemPromptData, toggles: &SectionToggles) -> String {
    SystemPromptSection::ALL
        .into_iter()
        .filter(|s| section_enabled(toggles, *s))
        .filter_map(|s| {
            let text = prompt.get(s).trim();
            (!text.is_empty()).then(|| format!("## {}\n{}", s.title(), text))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintMessage {
    pub id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Parameters {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            max_tokens: 2048,
            top_p: 1.0,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            seed: None,
        }
    }
}

/// The snapshot payload of a saved version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VersionData {
    pub system_prompt: SystemPromptData,
    pub is_system_prompt_on: SectionToggles,
    pub hint_messages: Vec<HintMessage>,
    pub parameters: Parameters,
    pub models: Vec<String>,
    pub tools: Vec<String>,
}

/// Accuracy on the 0-100 scale produced by the evaluative heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAccuracy {
    pub model: String,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedVersion {
    pub id: String,
    pub name: String,
    pub saved_at: String,
    #[serde(default)]
    pub expanded: bool,
    #[serde(default)]
    pub model_accuracy: Vec<ModelAccuracy>,
    pub data: VersionData,
}

impl SavedVersion {
    /// `None` means the model was never evaluated for this version.
    pub fn accuracy_for(&self, model: &str) -> Option<f64> {
        self.model_accuracy
            .iter()
            .find(|a| a.model == model)
            .map(|a| a.accuracy)
    }

    /// SHA-256 over the canonical JSON of `data`.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let canonical = serde_json::to_value(&self.data)
            .map(|v| v.to_string())
            .unwrap_or_default();
        let digest = Sha256::digest(canonical.as_bytes());
        format!("sha256:{}", hex::encode(digest))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Good,
    Bad,
}

impl Rating {
    pub fn parse(s: &str) -> Option<Option<Self>> {
        match s {
            "good" | "up" => Some(Some(Rating::Good)),
            "bad" | "down" => Some(Some(Rating::Bad)),
            "none" | "clear" => Some(None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMessage {
    pub id: String,
    pub role: Role,
    /// `None` while an assistant reply is still pending.
    pub content: Option<String>,
    #[serde(default)]
    pub rating: Option<Rating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spend_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ModelMessage {
    pub fn is_pending(&self) -> bool {
        self.content.is_none()
    }
}

/// Input to `append_message`. With an id that already exists in the bucket
/// the `Some` fields are merged into the stored message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    pub id: Option<String>,
    pub role: Role,
    pub content: Option<String>,
    pub rating: Option<Rating>,
    pub spend_time: Option<u64>,
    pub model: Option<String>,
}

impl MessageDraft {
    pub fn new(role: Role, content: Option<String>) -> Self {
        Self {
            id: None,
            role,
            content,
            rating: None,
            spend_time: None,
            model: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, Some(text.into()))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Some(text.into()))
    }

    pub fn pending_reply(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::new(Role::Assistant, None)
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_rating(mut self, rating: Rating) -> Self {
        self.rating = Some(rating);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    /// Replaces the content.
    pub content: Option<String>,
    /// Appended after `content` is applied; a pending message starts empty.
    pub append: Option<String>,
    pub spend_time: Option<u64>,
    pub model: Option<String>,
}

impl MessagePatch {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn append(chunk: impl Into<String>) -> Self {
        Self {
            append: Some(chunk.into()),
            ..Self::default()
        }
    }

    pub fn with_spend_time(mut self, ms: u64) -> Self {
        self.spend_time = Some(ms);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rubric {
    pub id: String,
    pub category_id: String,
    pub content: String,
}

/// versionId → modelId → rubricId → score on the 0-5 rubric scale.
pub type VersionRatings = BTreeMap<String, BTreeMap<String, BTreeMap<String, f64>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: String,
    pub version_id: String,
    pub model_id: String,
    pub timestamp: String,
    #[serde(default)]
    pub ratings: BTreeMap<String, f64>,
    #[serde(default)]
    pub messages: Vec<ModelMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMessageDataset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectedView {
    #[default]
    Table,
    Chart,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_skips_disabled_and_empty_sections() {
        let mut prompt = SystemPromptData::default();
        prompt.set(SystemPromptSection::CharacterSettings, "You are a barista.");
        prompt.set(SystemPromptSection::Constraints, "Never mention tea.");
        prompt.set(SystemPromptSection::OutputFormat, "   ");

        let mut toggles = SectionToggles::new();
        let composed = compose_system_prompt(&prompt, &toggles);
        assert_eq!(
            composed,
            "## Character\nYou are a barista.\n\n## Constraints\nNever mention tea."
        );

        toggles.insert("constraints".into(), false);
        let composed = compose_system_prompt(&prompt, &toggles);
        assert_eq!(composed, "## Character\nYou are a barista.");
    }

    #[test]
    fn test_section_parse_accepts_cli_spellings() {
        assert_eq!(
            SystemPromptSection::parse("output-format"),
            Some(SystemPromptSection::OutputFormat)
        );
        assert_eq!(
            SystemPromptSection::parse("taskGoals"),
            Some(SystemPromptSection::TaskGoals)
        );
        assert_eq!(SystemPromptSection::parse("nope"), None);
    }

    #[test]
    fn test_message_serializes_null_rating_and_camel_case() {
        let msg = ModelMessage {
            id: "m1".into(),
            role: Role::Assistant,
            content: None,
            rating: None,
            spend_time: Some(120),
            model: Some("gpt-4o".into()),
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert!(v["rating"].is_null());
        assert!(v["content"].is_null());
        assert_eq!(v["spendTime"], 120);
    }

    #[test]
    fn test_fingerprint_ignores_name_and_accuracy() {
        let a = SavedVersion {
            id: "a".into(),
            name: "first".into(),
            saved_at: "t".into(),
            expanded: false,
            model_accuracy: vec![],
            data: VersionData::default(),
        };
        let mut b = a.clone();
        b.name = "second".into();
        b.model_accuracy.push(ModelAccuracy {
            model: "m".into(),
            accuracy: 40.0,
        });
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert!(a.fingerprint().starts_with("sha256:"));
    }
}
