use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    #[serde(alias = "configVersion")]
    pub version: u32,
    pub storage: StorageConfig,
    pub provider: ProviderConfig,
    pub dispatch: DispatchConfig,
    pub judge: JudgeConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
    /// Documents that serialize larger than this are not written.
    pub max_document_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".promptfactory/workspace.db"),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Openai,
    Fake,
}

impl ProviderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(ProviderKind::Openai),
            "fake" => Some(ProviderKind::Fake),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key_env: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Openai,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub timeout_seconds: u64,
    /// Delay between consecutive requests of one "send to all".
    pub stagger_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            stagger_ms: 150,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FactoryConfig {
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Environment overrides, applied after the file is read.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = lookup("PROMPTFACTORY_DB") {
            self.storage.path = PathBuf::from(path);
        }
        if let Some(kind) = lookup("PROMPTFACTORY_PROVIDER") {
            self.provider.kind = ProviderKind::parse(&kind).ok_or_else(|| {
                ConfigError(format!(
                    "unknown provider '{}' in PROMPTFACTORY_PROVIDER (expected openai|fake)",
                    kind
                ))
            })?;
        }
        if let Some(level) = lookup("PROMPTFACTORY_LOG") {
            self.log_level = Some(level);
        }
        Ok(())
    }
}

/// Reads and validates a config file. A missing file yields defaults so a
/// fresh checkout works without `init`.
pub fn load_config(path: &Path, strict: bool) -> Result<FactoryConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!(
            event = "promptfactory.config.defaulted",
            path = %path.display()
        );
        return Ok(FactoryConfig::default());
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    parse_config(&raw, path, strict)
}

pub fn parse_config(raw: &str, origin: &Path, strict: bool) -> Result<FactoryConfig, ConfigError> {
    let mut ignored_keys = std::collections::BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);

    let cfg: FactoryConfig = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    if !ignored_keys.is_empty() {
        if strict {
            return Err(ConfigError(format!(
                "unknown fields in strict mode: {:?} (file: {})",
                ignored_keys,
                origin.display()
            )));
        }
        tracing::warn!(
            event = "promptfactory.config.unknown_fields",
            fields = ?ignored_keys,
            file = %origin.display(),
            "ignored unknown config fields"
        );
    }

    if cfg.version != 0 && cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(ConfigError(format!(
            "unsupported config version {} (supported: 0, {})",
            cfg.version, SUPPORTED_CONFIG_VERSION
        )));
    }
    if cfg.storage.max_document_bytes == 0 {
        return Err(ConfigError("storage.max_document_bytes must be > 0".into()));
    }
    if cfg.dispatch.timeout_seconds == 0 || cfg.judge.timeout_seconds == 0 {
        return Err(ConfigError("timeouts must be at least 1 second".into()));
    }

    Ok(cfg)
}

pub const SAMPLE_CONFIG: &str = r#"version: 1
storage:
  path: .promptfactory/workspace.db
  max_document_bytes: 5242880
provider:
  kind: openai
  base_url: https://api.openai.com/v1
  api_key_env: OPENAI_API_KEY
dispatch:
  timeout_seconds: 60
  stagger_ms: 150
judge:
  model: gpt-4o-mini
  timeout_seconds: 60
log_level: info
log_format: text
"#;

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError(format!("failed to create {}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, SAMPLE_CONFIG)
        .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))?;
    Ok(())
}
