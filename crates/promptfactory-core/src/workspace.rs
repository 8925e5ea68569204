//! The application-state service.
//!
//! `Workspace` owns the editor, the version store, the conversation store,
//! the compare session and the rating book. Every mutation goes through a
//! method here, which marks the owning document dirty and tells observers
//! about the prompt keys that changed. Callers hold it by `&mut`; there is
//! no global instance.

use crate::compare::CompareSession;
use crate::engine::dispatch::{CancelToken, DispatchOutcome, DispatchTarget, Dispatcher};
use crate::errors::ImportError;
use crate::messages::{BucketKey, ClearScope, MessageStore};
use crate::migrate;
use crate::model::{
    compose_system_prompt, new_id, now_rfc3339, HintMessage, MessageDraft, Mutation, Parameters,
    Rating, RatingCategory, Rubric, SavedVersion, SectionToggles, SelectedView, SystemPromptData,
    SystemPromptSection, TestMessageDataset, TestResult, VersionData, VersionRatings,
};
use crate::providers::llm::ChatRequest;
use crate::rating::RatingBook;
use crate::storage::schema::DOCUMENT_SCHEMA_VERSION;
use crate::storage::{SaveOutcome, Store};
use crate::transfer::{self, ImportReport};
use crate::versions::{VersionStore, VersionUpdate};
use anyhow::Context;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::{Arc, Mutex};

pub const PROMPT_DOCUMENT_KEY: &str = "prompt-workspace";
pub const ADVANCED_DOCUMENT_KEY: &str = "advanced-workspace";
pub const BACKUP_DOCUMENT_KEY: &str = "prompt-backup";
pub const SESSION_DOCUMENT_KEY: &str = "session";

/// Prompt-side state an observer can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchedKey {
    SelectedModels,
    SelectedTools,
    SystemPrompt,
    SystemPromptToggles,
    HintMessages,
    SavedVersions,
    Parameters,
}

impl WatchedKey {
    pub const ALL: [WatchedKey; 7] = [
        WatchedKey::SelectedModels,
        WatchedKey::SelectedTools,
        WatchedKey::SystemPrompt,
        WatchedKey::SystemPromptToggles,
        WatchedKey::HintMessages,
        WatchedKey::SavedVersions,
        WatchedKey::Parameters,
    ];

    const EDITOR: [WatchedKey; 6] = [
        WatchedKey::SelectedModels,
        WatchedKey::SelectedTools,
        WatchedKey::SystemPrompt,
        WatchedKey::SystemPromptToggles,
        WatchedKey::HintMessages,
        WatchedKey::Parameters,
    ];
}

/// The configuration currently being edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorState {
    pub selected_models: Vec<String>,
    pub selected_tools: Vec<String>,
    pub system_prompt: SystemPromptData,
    pub is_system_prompt_on: SectionToggles,
    #[serde(rename = "hintMessage")]
    pub hint_messages: Vec<HintMessage>,
    pub parameters: Parameters,
}

impl EditorState {
    pub fn snapshot(&self) -> VersionData {
        VersionData {
            system_prompt: self.system_prompt.clone(),
            is_system_prompt_on: self.is_system_prompt_on.clone(),
            hint_messages: self.hint_messages.clone(),
            parameters: self.parameters.clone(),
            models: self.selected_models.clone(),
            tools: self.selected_tools.clone(),
        }
    }

    fn restore(&mut self, data: &VersionData) {
        self.system_prompt = data.system_prompt.clone();
        self.is_system_prompt_on = data.is_system_prompt_on.clone();
        self.hint_messages = data.hint_messages.clone();
        self.parameters = data.parameters.clone();
        self.selected_models = data.models.clone();
        self.selected_tools = data.tools.clone();
    }
}

/// Document A.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PromptDocument {
    pub selected_models: Vec<String>,
    pub selected_tools: Vec<String>,
    pub system_prompt: SystemPromptData,
    pub is_system_prompt_on: SectionToggles,
    pub hint_message: Vec<HintMessage>,
    pub saved_versions: Vec<SavedVersion>,
    pub parameters: Parameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub untitled_counter: Option<u32>,
}

/// Document B.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdvancedDocument {
    pub test_message_datasets: Vec<TestMessageDataset>,
    pub visible_test_set_ids: Vec<String>,
    pub rating_categories: Vec<RatingCategory>,
    pub rubrics: Vec<Rubric>,
    pub history_rubrics: Vec<Rubric>,
    pub version_ratings: VersionRatings,
    pub test_results: Vec<TestResult>,
    pub is_rating_in_progress: bool,
    pub selected_view: SelectedView,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionDocument {
    pub messages: MessageStore,
    pub compare: CompareSession,
}

/// The mirrored copy of the prompt keys kept by [`BackupMirror`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PromptBackup {
    #[serde(flatten)]
    pub editor: EditorState,
    pub saved_versions: Vec<SavedVersion>,
    pub mirrored_at: Option<String>,
}

/// Read-only view handed to observers.
pub struct PromptView<'a> {
    pub editor: &'a EditorState,
    pub saved_versions: &'a [SavedVersion],
}

pub trait WorkspaceObserver: Send {
    fn on_change(&mut self, keys: &[WatchedKey], view: &PromptView<'_>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    keys: Vec<WatchedKey>,
    observer: Box<dyn WorkspaceObserver>,
}

#[derive(Debug, Default)]
struct BackupSlot {
    backup: PromptBackup,
    dirty: bool,
}

/// Mirrors the prompt keys into a [`PromptBackup`].
pub struct BackupMirror {
    slot: Arc<Mutex<BackupSlot>>,
}

impl WorkspaceObserver for BackupMirror {
    fn on_change(&mut self, keys: &[WatchedKey], view: &PromptView<'_>) {
        let Ok(mut guard) = self.slot.lock() else {
            tracing::warn!(event = "promptfactory.backup.poisoned");
            return;
        };
        let slot = &mut *guard;
        let editor = &mut slot.backup.editor;
        for key in keys {
            match key {
                WatchedKey::SelectedModels => {
                    editor.selected_models = view.editor.selected_models.clone()
                }
                WatchedKey::SelectedTools => {
                    editor.selected_tools = view.editor.selected_tools.clone()
                }
                WatchedKey::SystemPrompt => editor.system_prompt = view.editor.system_prompt.clone(),
                WatchedKey::SystemPromptToggles => {
                    editor.is_system_prompt_on = view.editor.is_system_prompt_on.clone()
                }
                WatchedKey::HintMessages => editor.hint_messages = view.editor.hint_messages.clone(),
                WatchedKey::Parameters => editor.parameters = view.editor.parameters.clone(),
                WatchedKey::SavedVersions => {
                    slot.backup.saved_versions = view.saved_versions.to_vec()
                }
            }
        }
        slot.backup.mirrored_at = Some(now_rfc3339());
        slot.dirty = true;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Dirty {
    prompt: bool,
    advanced: bool,
    session: bool,
}

/// Per-document result of [`Workspace::persist`].
#[derive(Debug, Clone, PartialEq)]
pub struct PersistReport {
    pub written: Vec<(&'static str, SaveOutcome)>,
}

impl PersistReport {
    pub fn skipped(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.written
            .iter()
            .filter(|(_, o)| !o.is_written())
            .map(|(k, _)| *k)
    }
}

pub struct Workspace {
    editor: EditorState,
    versions: VersionStore,
    messages: MessageStore,
    compare: CompareSession,
    ratings: RatingBook,
    datasets: Vec<TestMessageDataset>,
    visible_test_set_ids: Vec<String>,
    is_rating_in_progress: bool,
    selected_view: SelectedView,
    observers: Vec<Subscription>,
    next_subscription: u64,
    backup: Option<Arc<Mutex<BackupSlot>>>,
    persist_session: bool,
    dirty: Dirty,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: serde_json::Value) -> anyhow::Result<T> {
    serde_json::from_value(value).with_context(|| format!("failed to decode document '{}'", key))
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            editor: EditorState::default(),
            versions: VersionStore::new(),
            messages: MessageStore::new(),
            compare: CompareSession::new(),
            ratings: RatingBook::new(),
            datasets: Vec::new(),
            visible_test_set_ids: Vec::new(),
            is_rating_in_progress: false,
            selected_view: SelectedView::default(),
            observers: Vec::new(),
            next_subscription: 1,
            backup: None,
            persist_session: false,
            dirty: Dirty::default(),
        }
    }

    // ---- persistence ----

    /// Reads every document through the migration layer. A missing prompt
    /// document falls back to the mirrored backup when one exists.
    pub fn load(store: &Store) -> anyhow::Result<Self> {
        let mut ws = Self::new();

        let prompt_raw = match store.get_document(PROMPT_DOCUMENT_KEY)? {
            Some(doc) => Some(doc.payload),
            None => store.get_document(BACKUP_DOCUMENT_KEY)?.map(|doc| {
                tracing::info!(
                    event = "promptfactory.workspace.restored_from_backup",
                    mirrored_at = doc.updated_at.as_str()
                );
                doc.payload
            }),
        };
        if let Some(raw) = prompt_raw {
            let doc: PromptDocument =
                decode(PROMPT_DOCUMENT_KEY, migrate::upgrade_prompt_document(raw))?;
            ws.editor = EditorState {
                selected_models: doc.selected_models,
                selected_tools: doc.selected_tools,
                system_prompt: doc.system_prompt,
                is_system_prompt_on: doc.is_system_prompt_on,
                hint_messages: doc.hint_message,
                parameters: doc.parameters,
            };
            ws.versions = VersionStore::from_versions(doc.saved_versions)
                .with_untitled_floor(doc.untitled_counter.unwrap_or(1));
        }

        if let Some(stored) = store.get_document(ADVANCED_DOCUMENT_KEY)? {
            let doc: AdvancedDocument = decode(
                ADVANCED_DOCUMENT_KEY,
                migrate::upgrade_advanced_document(stored.payload),
            )?;
            ws.ratings = RatingBook::restore(
                doc.rating_categories,
                doc.rubrics,
                doc.history_rubrics,
                doc.version_ratings,
                doc.test_results,
            );
            ws.datasets = doc.test_message_datasets;
            ws.visible_test_set_ids = doc.visible_test_set_ids;
            ws.is_rating_in_progress = doc.is_rating_in_progress;
            ws.selected_view = doc.selected_view;
        }

        if let Some(stored) = store.get_document(SESSION_DOCUMENT_KEY)? {
            let doc: SessionDocument =
                decode(SESSION_DOCUMENT_KEY, migrate::unwrap_envelope(stored.payload))?;
            ws.messages = doc.messages;
            ws.compare = doc.compare;
        }

        tracing::debug!(
            event = "promptfactory.workspace.loaded",
            versions = ws.versions.len(),
            categories = ws.ratings.categories().len()
        );
        Ok(ws)
    }

    /// Writes dirty documents. Oversize documents are skipped and reported;
    /// they are not retried.
    pub fn persist(&mut self, store: &Store) -> anyhow::Result<PersistReport> {
        let mut written = Vec::new();

        if self.dirty.prompt {
            let outcome =
                store.put_document(PROMPT_DOCUMENT_KEY, DOCUMENT_SCHEMA_VERSION, &self.prompt_document())?;
            written.push((PROMPT_DOCUMENT_KEY, outcome));
        }
        if self.dirty.advanced {
            let outcome = store.put_document(
                ADVANCED_DOCUMENT_KEY,
                DOCUMENT_SCHEMA_VERSION,
                &self.advanced_document(),
            )?;
            written.push((ADVANCED_DOCUMENT_KEY, outcome));
        }
        if self.dirty.session && self.persist_session {
            let doc = SessionDocument {
                messages: self.messages.clone(),
                compare: self.compare.clone(),
            };
            let outcome = store.put_document(SESSION_DOCUMENT_KEY, DOCUMENT_SCHEMA_VERSION, &doc)?;
            written.push((SESSION_DOCUMENT_KEY, outcome));
        }
        if let Some(slot) = &self.backup {
            let mut slot = slot
                .lock()
                .map_err(|_| anyhow::anyhow!("backup mirror lock poisoned"))?;
            if slot.dirty {
                let outcome =
                    store.put_document(BACKUP_DOCUMENT_KEY, DOCUMENT_SCHEMA_VERSION, &slot.backup)?;
                written.push((BACKUP_DOCUMENT_KEY, outcome));
                slot.dirty = false;
            }
        }

        self.dirty = Dirty::default();
        Ok(PersistReport { written })
    }

    /// Session state (conversations, compare session) is transient unless
    /// this is enabled.
    pub fn set_session_persistence(&mut self, enabled: bool) {
        self.persist_session = enabled;
    }

    pub fn mark_all_dirty(&mut self) {
        self.dirty = Dirty {
            prompt: true,
            advanced: true,
            session: true,
        };
    }

    pub fn prompt_document(&self) -> PromptDocument {
        PromptDocument {
            selected_models: self.editor.selected_models.clone(),
            selected_tools: self.editor.selected_tools.clone(),
            system_prompt: self.editor.system_prompt.clone(),
            is_system_prompt_on: self.editor.is_system_prompt_on.clone(),
            hint_message: self.editor.hint_messages.clone(),
            saved_versions: self.versions.list().to_vec(),
            parameters: self.editor.parameters.clone(),
            untitled_counter: Some(self.versions.untitled_counter()),
        }
    }

    pub fn advanced_document(&self) -> AdvancedDocument {
        AdvancedDocument {
            test_message_datasets: self.datasets.clone(),
            visible_test_set_ids: self.visible_test_set_ids.clone(),
            rating_categories: self.ratings.categories().to_vec(),
            rubrics: self.ratings.rubrics().to_vec(),
            history_rubrics: self.ratings.history_rubrics().to_vec(),
            version_ratings: self.ratings.version_ratings().clone(),
            test_results: self.ratings.test_results().to_vec(),
            is_rating_in_progress: self.is_rating_in_progress,
            selected_view: self.selected_view,
        }
    }

    // ---- observers ----

    pub fn subscribe(
        &mut self,
        keys: &[WatchedKey],
        observer: Box<dyn WorkspaceObserver>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push(Subscription {
            id,
            keys: keys.to_vec(),
            observer,
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|s| s.id != id);
        self.observers.len() != before
    }

    /// Subscribes a [`BackupMirror`] on every prompt key and seeds it with
    /// the current state.
    pub fn enable_backup_mirror(&mut self) -> SubscriptionId {
        let slot = Arc::new(Mutex::new(BackupSlot::default()));
        let mut mirror = BackupMirror { slot: slot.clone() };
        mirror.on_change(
            &WatchedKey::ALL,
            &PromptView {
                editor: &self.editor,
                saved_versions: self.versions.list(),
            },
        );
        self.backup = Some(slot);
        self.subscribe(&WatchedKey::ALL, Box::new(mirror))
    }

    pub fn backup(&self) -> Option<PromptBackup> {
        let slot = self.backup.as_ref()?;
        slot.lock().ok().map(|s| s.backup.clone())
    }

    fn changed(&mut self, keys: &[WatchedKey]) {
        self.dirty.prompt = true;
        let view = PromptView {
            editor: &self.editor,
            saved_versions: self.versions.list(),
        };
        for sub in self.observers.iter_mut() {
            let relevant: Vec<WatchedKey> = keys
                .iter()
                .copied()
                .filter(|k| sub.keys.contains(k))
                .collect();
            if !relevant.is_empty() {
                sub.observer.on_change(&relevant, &view);
            }
        }
    }

    fn touch_advanced(&mut self) {
        self.dirty.advanced = true;
    }

    fn touch_session(&mut self) {
        self.dirty.session = true;
    }

    // ---- editor ----

    pub fn editor(&self) -> &EditorState {
        &self.editor
    }

    pub fn composed_system_prompt(&self) -> String {
        compose_system_prompt(&self.editor.system_prompt, &self.editor.is_system_prompt_on)
    }

    pub fn set_selected_models(&mut self, models: Vec<String>) {
        self.editor.selected_models = models;
        self.changed(&[WatchedKey::SelectedModels]);
    }

    pub fn set_selected_tools(&mut self, tools: Vec<String>) {
        self.editor.selected_tools = tools;
        self.changed(&[WatchedKey::SelectedTools]);
    }

    pub fn set_section(&mut self, section: SystemPromptSection, text: impl Into<String>) {
        self.editor.system_prompt.set(section, text);
        self.changed(&[WatchedKey::SystemPrompt]);
    }

    pub fn set_section_enabled(&mut self, section: SystemPromptSection, enabled: bool) {
        self.editor
            .is_system_prompt_on
            .insert(section.key().to_string(), enabled);
        self.changed(&[WatchedKey::SystemPromptToggles]);
    }

    /// Flips a section and returns its new state.
    pub fn toggle_section(&mut self, section: SystemPromptSection) -> bool {
        let enabled = !crate::model::section_enabled(&self.editor.is_system_prompt_on, section);
        self.set_section_enabled(section, enabled);
        enabled
    }

    pub fn set_parameters(&mut self, parameters: Parameters) {
        self.editor.parameters = parameters;
        self.changed(&[WatchedKey::Parameters]);
    }

    pub fn add_hint(&mut self, content: impl Into<String>) -> HintMessage {
        let hint = HintMessage {
            id: new_id(),
            content: content.into(),
        };
        self.editor.hint_messages.push(hint.clone());
        self.changed(&[WatchedKey::HintMessages]);
        hint
    }

    pub fn remove_hint(&mut self, id: &str) -> Mutation {
        let before = self.editor.hint_messages.len();
        self.editor.hint_messages.retain(|h| h.id != id);
        if self.editor.hint_messages.len() == before {
            return Mutation::NotFound;
        }
        self.changed(&[WatchedKey::HintMessages]);
        Mutation::Applied
    }

    // ---- versions ----

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    pub fn save_version(&mut self, name: &str) -> SavedVersion {
        let version = self.versions.add_version(self.editor.snapshot(), name);
        self.changed(&[WatchedKey::SavedVersions]);
        version
    }

    /// Copies a version's snapshot into the editor.
    pub fn load_version(&mut self, id: &str) -> Mutation {
        let Some(version) = self.versions.get(id) else {
            return Mutation::NotFound;
        };
        let data = version.data.clone();
        self.editor.restore(&data);
        self.changed(&WatchedKey::EDITOR);
        Mutation::Applied
    }

    pub fn update_version(&mut self, id: &str, update: VersionUpdate) -> Mutation {
        let result = self.versions.update_version(id, update);
        if result.is_applied() {
            if let Some(v) = self.versions.get(id) {
                self.compare.refresh_version(v);
            }
            self.touch_session();
            self.changed(&[WatchedKey::SavedVersions]);
        }
        result
    }

    pub fn rename_version(&mut self, id: &str, name: &str) -> Mutation {
        self.update_version(id, VersionUpdate::rename(name))
    }

    /// Deletes a version along with its ratings and compare conversations.
    pub fn delete_version(&mut self, id: &str) -> Option<SavedVersion> {
        let removed = self.versions.delete_version(id)?;
        self.compare.forget_version(id);
        self.messages.clear(ClearScope::CompareVersion(id.to_string()));
        self.ratings.forget_version(id);
        self.touch_session();
        self.touch_advanced();
        self.changed(&[WatchedKey::SavedVersions]);
        Some(removed)
    }

    pub fn duplicate_version(&mut self, id: &str) -> Option<SavedVersion> {
        let copy = self.versions.duplicate_version(id)?;
        self.changed(&[WatchedKey::SavedVersions]);
        Some(copy)
    }

    pub fn toggle_expanded(&mut self, id: &str) -> Mutation {
        let result = self.versions.toggle_expanded(id);
        if result.is_applied() {
            self.changed(&[WatchedKey::SavedVersions]);
        }
        result
    }

    /// Stores a 0-100 accuracy for (version, model).
    pub fn record_accuracy(&mut self, version_id: &str, model: &str, accuracy: f64) -> Mutation {
        let result = self.versions.set_model_accuracy(version_id, model, accuracy);
        if result.is_applied() {
            self.changed(&[WatchedKey::SavedVersions]);
        }
        result
    }

    pub fn import_version(&mut self, raw: &str) -> Result<ImportReport, ImportError> {
        let report = transfer::import_version(&mut self.versions, raw)?;
        self.changed(&[WatchedKey::SavedVersions]);
        Ok(report)
    }

    pub fn export_version(&self, id: &str) -> anyhow::Result<Option<String>> {
        self.versions.get(id).map(transfer::export_version).transpose()
    }

    // ---- conversations ----

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    /// Buckets a "send" addresses: one per selected model normally, or one
    /// per (compared version, version model) while comparing.
    pub fn active_buckets(&self) -> Vec<BucketKey> {
        if self.compare.is_comparing() {
            self.compare
                .ordered_versions()
                .into_iter()
                .flat_map(|v| {
                    v.data
                        .models
                        .iter()
                        .map(move |m| BucketKey::compare(v.id.clone(), m.clone()))
                })
                .collect()
        } else {
            self.editor
                .selected_models
                .iter()
                .map(BucketKey::model)
                .collect()
        }
    }

    /// Appends the user turn to every active bucket and builds one provider
    /// request per bucket.
    pub fn prepare_dispatch(&mut self, user_text: &str) -> Vec<DispatchTarget> {
        let buckets = self.active_buckets();
        let mut targets = Vec::with_capacity(buckets.len());

        for bucket in buckets {
            let (system_prompt, parameters) = match bucket.version_id() {
                Some(vid) => match self.compare.ordered_versions().into_iter().find(|v| v.id == vid) {
                    Some(v) => (
                        compose_system_prompt(&v.data.system_prompt, &v.data.is_system_prompt_on),
                        v.data.parameters.clone(),
                    ),
                    None => continue,
                },
                None => (self.composed_system_prompt(), self.editor.parameters.clone()),
            };

            self.messages
                .append_message(&bucket, MessageDraft::user(user_text));
            let request = ChatRequest {
                model: bucket.model_id().to_string(),
                system_prompt: (!system_prompt.is_empty()).then_some(system_prompt),
                messages: self.messages.conversation_history(&bucket),
                parameters,
            };
            targets.push(DispatchTarget { bucket, request });
        }

        if !targets.is_empty() {
            let mut flags = self.messages.flags();
            flags.show_hints = false;
            self.messages.set_flags(flags);
            self.touch_session();
        }
        targets
    }

    /// Sends a user turn to every active bucket and waits for all replies.
    pub async fn send_message(
        &mut self,
        dispatcher: &Dispatcher,
        user_text: &str,
        cancel: &CancelToken,
    ) -> Vec<DispatchOutcome> {
        let targets = self.prepare_dispatch(user_text);
        if targets.is_empty() {
            return Vec::new();
        }
        let mut flags = self.messages.flags();
        flags.input_enabled = false;
        self.messages.set_flags(flags);

        let outcomes = dispatcher
            .send_to_all(&mut self.messages, targets, cancel)
            .await;

        flags.input_enabled = true;
        self.messages.set_flags(flags);
        self.touch_session();
        outcomes
    }

    pub fn rate_message(&mut self, bucket: &BucketKey, id: &str, rating: Option<Rating>) -> Mutation {
        let result = self.messages.set_rating(bucket, id, rating);
        if result.is_applied() {
            self.touch_session();
        }
        result
    }

    /// Clears the conversations of the current mode.
    pub fn clear_conversation(&mut self) {
        let scope = if self.compare.is_comparing() {
            ClearScope::AllCompare
        } else {
            ClearScope::Normal
        };
        self.messages.clear(scope);
        self.touch_session();
    }

    // ---- comparison ----

    pub fn compare(&self) -> &CompareSession {
        &self.compare
    }

    fn session_result(&mut self, result: Mutation) -> Mutation {
        if result.is_applied() {
            self.touch_session();
        }
        result
    }

    pub fn start_compare(&mut self) -> Mutation {
        let r = self.compare.enter_selection();
        self.session_result(r)
    }

    pub fn toggle_compare_selection(&mut self, version_id: &str) -> Mutation {
        let r = self.compare.toggle_selection(version_id);
        self.session_result(r)
    }

    pub fn confirm_compare(&mut self) -> Option<usize> {
        let n = self.compare.confirm(&self.versions)?;
        self.touch_session();
        Some(n)
    }

    pub fn cancel_compare(&mut self) -> Mutation {
        let r = self.compare.cancel();
        self.session_result(r)
    }

    /// Leaves compare mode and drops every compare conversation.
    pub fn exit_compare(&mut self) -> Mutation {
        let r = self.compare.exit();
        if r.is_applied() {
            self.messages.clear(ClearScope::AllCompare);
        }
        self.session_result(r)
    }

    pub fn reorder_compare(&mut self, old_index: usize, new_index: usize) -> Mutation {
        let r = self.compare.reorder(old_index, new_index);
        self.session_result(r)
    }

    // ---- ratings ----

    pub fn ratings(&self) -> &RatingBook {
        &self.ratings
    }

    pub fn add_category(&mut self, name: &str) -> RatingCategory {
        self.touch_advanced();
        self.ratings.add_category(name)
    }

    pub fn add_rubric(&mut self, category_id: &str, content: &str) -> Option<Rubric> {
        let rubric = self.ratings.add_rubric(category_id, content)?;
        self.touch_advanced();
        Some(rubric)
    }

    pub fn retire_rubric(&mut self, rubric_id: &str) -> Mutation {
        let r = self.ratings.retire_rubric(rubric_id);
        self.advanced_result(r)
    }

    fn advanced_result(&mut self, result: Mutation) -> Mutation {
        if result.is_applied() {
            self.touch_advanced();
        }
        result
    }

    /// Records a 0-5 rubric score; `NotFound` for an unknown version.
    pub fn set_score(&mut self, version_id: &str, model_id: &str, rubric_id: &str, score: f64) -> Mutation {
        if self.versions.get(version_id).is_none() {
            return Mutation::NotFound;
        }
        let r = self.ratings.set_score(version_id, model_id, rubric_id, score);
        self.advanced_result(r)
    }

    pub fn clear_score(&mut self, version_id: &str, model_id: &str, rubric_id: &str) -> Mutation {
        let r = self.ratings.clear_score(version_id, model_id, rubric_id);
        self.advanced_result(r)
    }

    /// Snapshots the ratings and transcript of a (version, model) run.
    pub fn record_test_result(&mut self, version_id: &str, model_id: &str, bucket: &BucketKey) -> TestResult {
        let transcript = self.messages.get_messages(bucket);
        self.touch_advanced();
        self.ratings.record_test_result(version_id, model_id, transcript)
    }

    pub fn is_rating_in_progress(&self) -> bool {
        self.is_rating_in_progress
    }

    pub fn set_rating_in_progress(&mut self, in_progress: bool) {
        self.is_rating_in_progress = in_progress;
        self.touch_advanced();
    }

    pub fn selected_view(&self) -> SelectedView {
        self.selected_view
    }

    pub fn set_selected_view(&mut self, view: SelectedView) {
        self.selected_view = view;
        self.touch_advanced();
    }

    // ---- test datasets ----

    pub fn datasets(&self) -> &[TestMessageDataset] {
        &self.datasets
    }

    pub fn visible_datasets(&self) -> Vec<&TestMessageDataset> {
        self.datasets
            .iter()
            .filter(|d| self.visible_test_set_ids.contains(&d.id))
            .collect()
    }

    /// New datasets start visible.
    pub fn add_dataset(&mut self, name: &str, messages: Vec<String>) -> TestMessageDataset {
        let dataset = TestMessageDataset {
            id: new_id(),
            name: name.to_string(),
            messages,
        };
        self.visible_test_set_ids.push(dataset.id.clone());
        self.datasets.push(dataset.clone());
        self.touch_advanced();
        dataset
    }

    pub fn remove_dataset(&mut self, id: &str) -> Mutation {
        let before = self.datasets.len();
        self.datasets.retain(|d| d.id != id);
        if self.datasets.len() == before {
            return Mutation::NotFound;
        }
        self.visible_test_set_ids.retain(|v| v != id);
        self.touch_advanced();
        Mutation::Applied
    }

    pub fn set_dataset_visible(&mut self, id: &str, visible: bool) -> Mutation {
        if !self.datasets.iter().any(|d| d.id == id) {
            return Mutation::NotFound;
        }
        let shown = self.visible_test_set_ids.iter().any(|v| v == id);
        match (visible, shown) {
            (true, false) => self.visible_test_set_ids.push(id.to_string()),
            (false, true) => self.visible_test_set_ids.retain(|v| v != id),
            _ => return Mutation::Ignored,
        }
        self.touch_advanced();
        Mutation::Applied
    }
}
