//! Side-by-side comparison of saved versions.
//!
//! `Idle` → `Selecting` → `Comparing` → `Idle`. The display order lives in
//! `order` alone and is resolved against `versions` at read time, so a
//! version that vanished mid-comparison is simply skipped.

use crate::model::{Mutation, SavedVersion};
use crate::versions::VersionStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparePhase {
    #[default]
    Idle,
    Selecting,
    Comparing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompareSession {
    phase: ComparePhase,
    #[serde(rename = "compareSelectedVersions")]
    selected: Vec<String>,
    #[serde(rename = "compareVersions")]
    versions: Vec<SavedVersion>,
    #[serde(rename = "compareVersionsOrder")]
    order: Vec<String>,
    version_list_visible: bool,
}

impl Default for CompareSession {
    fn default() -> Self {
        Self {
            phase: ComparePhase::Idle,
            selected: Vec::new(),
            versions: Vec::new(),
            order: Vec::new(),
            version_list_visible: true,
        }
    }
}

impl CompareSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ComparePhase {
        self.phase
    }

    pub fn is_comparing(&self) -> bool {
        self.phase == ComparePhase::Comparing
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn version_list_visible(&self) -> bool {
        self.version_list_visible
    }

    /// Idle → Selecting with an empty selection.
    pub fn enter_selection(&mut self) -> Mutation {
        if self.phase != ComparePhase::Idle {
            return Mutation::Ignored;
        }
        self.phase = ComparePhase::Selecting;
        self.selected.clear();
        Mutation::Applied
    }

    /// Adds the id when absent, removes it when present.
    pub fn toggle_selection(&mut self, version_id: &str) -> Mutation {
        if self.phase != ComparePhase::Selecting {
            return Mutation::Ignored;
        }
        match self.selected.iter().position(|id| id == version_id) {
            Some(idx) => {
                self.selected.remove(idx);
            }
            None => self.selected.push(version_id.to_string()),
        }
        Mutation::Applied
    }

    /// Selecting → Comparing. Returns how many versions are compared.
    ///
    /// An empty selection is accepted and yields an empty comparison;
    /// rejecting it is the caller's job. Selected ids with no stored version
    /// are dropped so `order` stays a permutation of `versions`.
    pub fn confirm(&mut self, store: &VersionStore) -> Option<usize> {
        if self.phase != ComparePhase::Selecting {
            return None;
        }
        let versions: Vec<SavedVersion> = self
            .selected
            .iter()
            .filter_map(|id| store.get(id).cloned())
            .collect();

        self.order = versions.iter().map(|v| v.id.clone()).collect();
        self.versions = versions;
        self.phase = ComparePhase::Comparing;
        self.version_list_visible = false;

        tracing::debug!(
            event = "promptfactory.compare.confirmed",
            versions = self.order.len()
        );
        Some(self.order.len())
    }

    /// Selecting → Idle.
    pub fn cancel(&mut self) -> Mutation {
        if self.phase != ComparePhase::Selecting {
            return Mutation::Ignored;
        }
        self.phase = ComparePhase::Idle;
        self.selected.clear();
        Mutation::Applied
    }

    /// Comparing → Idle. Compare buckets are cleared by the workspace.
    pub fn exit(&mut self) -> Mutation {
        if self.phase != ComparePhase::Comparing {
            return Mutation::Ignored;
        }
        *self = Self::default();
        Mutation::Applied
    }

    /// Moves the id at `old_index` to `new_index` in the display order.
    pub fn reorder(&mut self, old_index: usize, new_index: usize) -> Mutation {
        if self.phase != ComparePhase::Comparing
            || old_index >= self.order.len()
            || new_index >= self.order.len()
        {
            return Mutation::Ignored;
        }
        let id = self.order.remove(old_index);
        self.order.insert(new_index, id);
        Mutation::Applied
    }

    /// Versions in display order; ids without a version are skipped.
    pub fn ordered_versions(&self) -> Vec<&SavedVersion> {
        let lookup: HashMap<&str, &SavedVersion> =
            self.versions.iter().map(|v| (v.id.as_str(), v)).collect();
        self.order
            .iter()
            .filter_map(|id| lookup.get(id.as_str()).copied())
            .collect()
    }

    /// Drops a deleted version from the working set.
    pub fn forget_version(&mut self, version_id: &str) {
        self.versions.retain(|v| v.id != version_id);
        self.selected.retain(|id| id != version_id);
    }

    /// Refreshes a compared version after it was edited in the store.
    pub fn refresh_version(&mut self, version: &SavedVersion) {
        if let Some(slot) = self.versions.iter_mut().find(|v| v.id == version.id) {
            *slot = version.clone();
        }
    }
}
