use crate::model::{
    new_id, now_rfc3339, ModelAccuracy, Mutation, SavedVersion, VersionData,
};

const UNTITLED_PREFIX: &str = "Untitled ";
const COPY_SUFFIX: &str = " (copy)";

/// Partial update for [`VersionStore::update_version`]; `None` fields are kept.
#[derive(Debug, Clone, Default)]
pub struct VersionUpdate {
    pub name: Option<String>,
    pub data: Option<VersionData>,
    pub model_accuracy: Option<Vec<ModelAccuracy>>,
    pub expanded: Option<bool>,
}

impl VersionUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Saved versions, newest first, plus the counter behind "Untitled N" names.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionStore {
    versions: Vec<SavedVersion>,
    untitled_counter: u32,
}

impl Default for VersionStore {
    fn default() -> Self {
        Self {
            versions: Vec::new(),
            untitled_counter: 1,
        }
    }
}

/// `Some(n)` when the name is exactly `"Untitled n"` with a plain digit suffix.
pub fn parse_untitled(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(UNTITLED_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl VersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from loaded versions and recovers the untitled counter
    /// from their names.
    pub fn from_versions(versions: Vec<SavedVersion>) -> Self {
        let mut store = Self {
            versions,
            untitled_counter: 1,
        };
        store.recover_untitled_counter();
        store
    }

    /// Keeps a persisted counter when it is ahead of the recovered one, so
    /// names of deleted untitled versions are not reused.
    pub fn with_untitled_floor(mut self, counter: u32) -> Self {
        self.untitled_counter = self.untitled_counter.max(counter);
        self
    }

    pub fn list(&self) -> &[SavedVersion] {
        &self.versions
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&SavedVersion> {
        self.versions.iter().find(|v| v.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut SavedVersion> {
        self.versions.iter_mut().find(|v| v.id == id)
    }

    pub fn untitled_counter(&self) -> u32 {
        self.untitled_counter
    }

    fn max_untitled(&self) -> u32 {
        self.versions
            .iter()
            .filter_map(|v| parse_untitled(&v.name))
            .max()
            .unwrap_or(0)
    }

    /// Resets the counter to `max(k) + 1` over versions named "Untitled k".
    pub fn recover_untitled_counter(&mut self) {
        self.untitled_counter = self.max_untitled().saturating_add(1);
    }

    pub fn name_exists(&self, name: &str) -> bool {
        self.versions.iter().any(|v| v.name == name)
    }

    /// Saves a snapshot as a new version at the front of the list.
    ///
    /// A blank name becomes "Untitled N". Accuracy starts at zero for every
    /// model in the snapshot. Name uniqueness is not checked here.
    pub fn add_version(&mut self, data: VersionData, name: &str) -> SavedVersion {
        let name = if name.trim().is_empty() {
            let n = self
                .untitled_counter
                .max(self.max_untitled().saturating_add(1));
            self.untitled_counter = n.saturating_add(1);
            format!("{UNTITLED_PREFIX}{n}")
        } else {
            name.trim().to_string()
        };

        let model_accuracy = data
            .models
            .iter()
            .map(|m| ModelAccuracy {
                model: m.clone(),
                accuracy: 0.0,
            })
            .collect();

        let version = SavedVersion {
            id: new_id(),
            name,
            saved_at: now_rfc3339(),
            expanded: false,
            model_accuracy,
            data,
        };
        tracing::debug!(
            event = "promptfactory.version.added",
            id = %version.id,
            name = %version.name
        );
        self.versions.insert(0, version.clone());
        version
    }

    /// Inserts an already-built version at the front (import path).
    pub(crate) fn insert_front(&mut self, version: SavedVersion) {
        if let Some(n) = parse_untitled(&version.name) {
            self.untitled_counter = self.untitled_counter.max(n.saturating_add(1));
        }
        self.versions.insert(0, version);
    }

    pub fn update_version(&mut self, id: &str, update: VersionUpdate) -> Mutation {
        let Some(version) = self.get_mut(id) else {
            return Mutation::NotFound;
        };
        if let Some(name) = update.name {
            version.name = name;
        }
        if let Some(data) = update.data {
            version.data = data;
        }
        if let Some(acc) = update.model_accuracy {
            version.model_accuracy = acc;
        }
        if let Some(expanded) = update.expanded {
            version.expanded = expanded;
        }
        Mutation::Applied
    }

    pub fn delete_version(&mut self, id: &str) -> Option<SavedVersion> {
        let idx = self.versions.iter().position(|v| v.id == id)?;
        Some(self.versions.remove(idx))
    }

    /// Copies a version under a new id, timestamp and a "(copy)" name.
    /// Returns `None` when the source does not exist.
    pub fn duplicate_version(&mut self, id: &str) -> Option<SavedVersion> {
        let source = self.get(id)?;
        let copy = SavedVersion {
            id: new_id(),
            name: format!("{}{}", source.name, COPY_SUFFIX),
            saved_at: now_rfc3339(),
            expanded: false,
            model_accuracy: source.model_accuracy.clone(),
            data: source.data.clone(),
        };
        self.versions.insert(0, copy.clone());
        Some(copy)
    }

    pub fn toggle_expanded(&mut self, id: &str) -> Mutation {
        match self.get_mut(id) {
            Some(v) => {
                v.expanded = !v.expanded;
                Mutation::Applied
            }
            None => Mutation::NotFound,
        }
    }

    /// Upserts the accuracy entry for `model`, clamped to 0-100. Models not
    /// listed in `data.models` are accepted.
    pub fn set_model_accuracy(&mut self, id: &str, model: &str, accuracy: f64) -> Mutation {
        let Some(version) = self.get_mut(id) else {
            return Mutation::NotFound;
        };
        let accuracy = accuracy.clamp(0.0, 100.0);
        match version.model_accuracy.iter_mut().find(|a| a.model == model) {
            Some(entry) => entry.accuracy = accuracy,
            None => version.model_accuracy.push(ModelAccuracy {
                model: model.to_string(),
                accuracy,
            }),
        }
        Mutation::Applied
    }

    /// Resolves a user-supplied reference: exact id, exact name, then a
    /// unique id prefix.
    pub fn find(&self, reference: &str) -> Option<&SavedVersion> {
        if let Some(v) = self.get(reference) {
            return Some(v);
        }
        if let Some(v) = self.versions.iter().find(|v| v.name == reference) {
            return Some(v);
        }
        let mut prefixed = self.versions.iter().filter(|v| v.id.starts_with(reference));
        match (prefixed.next(), prefixed.next()) {
            (Some(v), None) if !reference.is_empty() => Some(v),
            _ => None,
        }
    }

    /// Closest version names to an unresolved reference.
    pub fn suggest(&self, reference: &str) -> Vec<String> {
        let mut scored: Vec<(f64, &str)> = self
            .versions
            .iter()
            .map(|v| (strsim::jaro_winkler(reference, &v.name), v.name.as_str()))
            .filter(|(score, _)| *score > 0.8)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().take(3).map(|(_, n)| n.to_string()).collect()
    }

    /// Case-insensitive name filter, in stored (newest first) order.
    pub fn filtered(&self, query: &str) -> Vec<&SavedVersion> {
        let needle = query.to_lowercase();
        self.versions
            .iter()
            .filter(|v| needle.is_empty() || v.name.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn into_versions(self) -> Vec<SavedVersion> {
        self.versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_with_models(models: &[&str]) -> VersionData {
        VersionData {
            models: models.iter().map(|m| m.to_string()).collect(),
            ..VersionData::default()
        }
    }

    #[test]
    fn test_add_prepends_and_seeds_accuracy() {
        let mut store = VersionStore::new();
        let first = store.add_version(data_with_models(&["gpt-4o"]), "first");
        let second = store.add_version(data_with_models(&["gpt-4o", "gemini"]), "second");

        assert_eq!(store.list()[0].id, second.id);
        assert_eq!(store.list()[1].id, first.id);
        assert_eq!(second.model_accuracy.len(), 2);
        assert!(second.model_accuracy.iter().all(|a| a.accuracy == 0.0));
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_blank_names_use_counter() {
        let mut store = VersionStore::new();
        assert_eq!(store.add_version(VersionData::default(), "").name, "Untitled 1");
        assert_eq!(store.add_version(VersionData::default(), "  ").name, "Untitled 2");
        assert_eq!(store.untitled_counter(), 3);
    }

    #[test]
    fn test_counter_saturates_at_largest_untitled_name() {
        let mut seed = VersionStore::new();
        let mut top = seed.add_version(VersionData::default(), "x");
        top.name = format!("Untitled {}", u32::MAX);

        let mut store = VersionStore::from_versions(vec![top]);
        assert_eq!(store.untitled_counter(), u32::MAX);
        let next = store.add_version(VersionData::default(), "");
        assert_eq!(next.name, format!("Untitled {}", u32::MAX));
        assert_eq!(store.untitled_counter(), u32::MAX);
    }

    #[test]
    fn test_only_plain_digit_suffixes_count_as_untitled() {
        assert_eq!(parse_untitled("Untitled 7"), Some(7));
        assert_eq!(parse_untitled("Untitled +7"), None);
        assert_eq!(parse_untitled("Untitled -1"), None);
        assert_eq!(parse_untitled("Untitled "), None);

        let mut seed = VersionStore::new();
        let mut signed = seed.add_version(VersionData::default(), "x");
        signed.name = "Untitled +7".into();
        let mut store = VersionStore::from_versions(vec![signed]);
        assert_eq!(store.add_version(VersionData::default(), "").name, "Untitled 1");
    }

    #[test]
    fn test_counter_recovery_takes_max_plus_one() {
        let mut store = VersionStore::new();
        let a = store.add_version(VersionData::default(), "");
        let b = store.add_version(VersionData::default(), "");
        assert_eq!(
            store.update_version(&b.id, VersionUpdate::rename("Untitled 3")),
            Mutation::Applied
        );
        assert_eq!(store.get(&a.id).unwrap().name, "Untitled 1");

        // Reload from the persisted versions only.
        let mut reloaded = VersionStore::from_versions(store.list().to_vec());
        assert_eq!(reloaded.untitled_counter(), 4);
        assert_eq!(reloaded.add_version(VersionData::default(), "").name, "Untitled 4");

        // Same rule applies within a session.
        assert_eq!(store.add_version(VersionData::default(), "").name, "Untitled 4");
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let mut store = VersionStore::new();
        store.add_version(VersionData::default(), "keep");
        let before = store.clone();
        assert_eq!(
            store.update_version("missing", VersionUpdate::rename("x")),
            Mutation::NotFound
        );
        assert_eq!(store, before);
    }

    #[test]
    fn test_duplicate_copies_data_and_leaves_original() {
        let mut store = VersionStore::new();
        let orig = store.add_version(data_with_models(&["m1"]), "base");
        let copy = store.duplicate_version(&orig.id).unwrap();

        assert_ne!(copy.id, orig.id);
        assert_eq!(copy.name, "base (copy)");
        assert_eq!(copy.data, orig.data);
        assert_eq!(store.get(&orig.id).unwrap(), &orig);
        assert!(store.duplicate_version("missing").is_none());
    }

    #[test]
    fn test_name_exists_is_advisory() {
        let mut store = VersionStore::new();
        store.add_version(VersionData::default(), "same");
        assert!(store.name_exists("same"));
        store.add_version(VersionData::default(), "same");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_accuracy_drift_is_tolerated() {
        let mut store = VersionStore::new();
        let v = store.add_version(data_with_models(&["m1"]), "v");
        assert_eq!(store.get(&v.id).unwrap().accuracy_for("m2"), None);
        assert!(store.set_model_accuracy(&v.id, "m2", 140.0).is_applied());
        assert_eq!(store.get(&v.id).unwrap().accuracy_for("m2"), Some(100.0));
        assert_eq!(store.get(&v.id).unwrap().accuracy_for("m1"), Some(0.0));
    }

    #[test]
    fn test_delete_and_toggle() {
        let mut store = VersionStore::new();
        let v = store.add_version(VersionData::default(), "v");
        assert!(store.toggle_expanded(&v.id).is_applied());
        assert!(store.get(&v.id).unwrap().expanded);
        assert_eq!(store.delete_version(&v.id).map(|d| d.id), Some(v.id.clone()));
        assert_eq!(store.toggle_expanded(&v.id), Mutation::NotFound);
        assert!(store.delete_version(&v.id).is_none());
    }

    #[test]
    fn test_find_by_name_and_prefix() {
        let mut store = VersionStore::new();
        let v = store.add_version(VersionData::default(), "support bot");
        assert_eq!(store.find("support bot").map(|x| &x.id), Some(&v.id));
        assert_eq!(store.find(&v.id[..8]).map(|x| &x.id), Some(&v.id));
        assert!(store.find("").is_none());
        assert_eq!(store.suggest("suport bot"), vec!["support bot".to_string()]);
    }
}
