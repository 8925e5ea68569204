use super::args::*;
use promptfactory_core::config::{FactoryConfig, ProviderKind};
use promptfactory_core::model::{Mutation, SavedVersion};
use promptfactory_core::providers::llm::fake::FakeClient;
use promptfactory_core::providers::llm::openai::OpenAIClient;
use promptfactory_core::providers::llm::LlmClient;
use promptfactory_core::storage::Store;
use promptfactory_core::Workspace;
use std::path::Path;
use std::sync::Arc;

pub mod chat;
pub mod compare;
pub mod dataset;
pub mod evaluate;
pub mod init;
pub mod prompt;
pub mod rubric;
pub mod version;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const REFUSED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

pub async fn dispatch(cli: Cli, cfg: FactoryConfig) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(args) => init::run(args, &cli.config),
        Command::Prompt(args) => prompt::run(args, &cfg),
        Command::Version(args) => version::run(args, &cfg),
        Command::Chat(args) => chat::run(args, &cfg).await,
        Command::Compare(args) => compare::run(args, &cfg),
        Command::Rubric(args) => rubric::run(args, &cfg),
        Command::Score(args) => rubric::run_score(args, &cfg),
        Command::Report(args) => rubric::run_report(args, &cfg),
        Command::Evaluate(args) => evaluate::run(args, &cfg).await,
        Command::Dataset(args) => dataset::run(args, &cfg),
    }
}

/// A workspace opened from the configured database. Every command loads
/// one, mutates it, and saves it back before exiting.
pub struct Session {
    store: Store,
    pub ws: Workspace,
}

impl Session {
    pub fn open(cfg: &FactoryConfig) -> anyhow::Result<Self> {
        let store = Store::open(&cfg.storage.path)?.with_quota(cfg.storage.max_document_bytes);
        store.init_schema()?;
        let mut ws = Workspace::load(&store)?;
        // one process per command: conversations have to survive between them
        ws.set_session_persistence(true);
        ws.enable_backup_mirror();
        Ok(Self { store, ws })
    }

    pub fn save(mut self) -> anyhow::Result<()> {
        let report = self.ws.persist(&self.store)?;
        for key in report.skipped() {
            tracing::warn!(
                event = "promptfactory.cli.save_skipped",
                key = %key,
                limit = self.store.max_document_bytes(),
                "document exceeds the storage limit and was not saved"
            );
        }
        Ok(())
    }
}

/// Resolves a version reference, printing suggestions when it does not match.
pub fn resolve_version(ws: &Workspace, reference: &str) -> Option<SavedVersion> {
    if let Some(v) = ws.versions().find(reference) {
        return Some(v.clone());
    }
    eprintln!("version not found: {}", reference);
    let suggestions = ws.versions().suggest(reference);
    if !suggestions.is_empty() {
        eprintln!("did you mean: {}", suggestions.join(", "));
    }
    None
}

/// Exit code for a mutation, with a note on stderr when it was refused.
pub fn mutation_code(result: Mutation, what: &str) -> i32 {
    match result {
        Mutation::Applied => exit_codes::OK,
        Mutation::NotFound => {
            eprintln!("not found: {}", what);
            exit_codes::REFUSED
        }
        Mutation::Ignored => {
            eprintln!("ignored: {}", what);
            exit_codes::REFUSED
        }
    }
}

pub fn build_client(cfg: &FactoryConfig) -> anyhow::Result<Arc<dyn LlmClient>> {
    match cfg.provider.kind {
        ProviderKind::Openai => Ok(Arc::new(OpenAIClient::from_env(
            &cfg.provider.base_url,
            &cfg.provider.api_key_env,
        )?)),
        ProviderKind::Fake => Ok(Arc::new(
            FakeClient::new().with_reply(&cfg.judge.model, crate::templates::FAKE_JUDGE_REPLY),
        )),
    }
}

pub fn write_file_if_missing(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::write(path, content)?;
        eprintln!("created {}", path.display());
    } else {
        eprintln!("note: {} already exists (skipped)", path.display());
    }
    Ok(())
}
