use crate::model::{MessageDraft, MessagePatch, ModelMessage, Mutation, Rating, Role};
use crate::ordered::OrderedMessages;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Addresses one conversation: a model in normal mode, or a
/// (version, model) pair while comparing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BucketKey {
    Model(String),
    Compare { version_id: String, model_id: String },
}

impl BucketKey {
    pub fn model(model: impl Into<String>) -> Self {
        BucketKey::Model(model.into())
    }

    pub fn compare(version_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        BucketKey::Compare {
            version_id: version_id.into(),
            model_id: model_id.into(),
        }
    }

    pub fn model_id(&self) -> &str {
        match self {
            BucketKey::Model(m) => m,
            BucketKey::Compare { model_id, .. } => model_id,
        }
    }

    pub fn version_id(&self) -> Option<&str> {
        match self {
            BucketKey::Model(_) => None,
            BucketKey::Compare { version_id, .. } => Some(version_id),
        }
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BucketKey::Model(m) => write!(f, "{m}"),
            BucketKey::Compare {
                version_id,
                model_id,
            } => write!(f, "{version_id}/{model_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    /// Every normal-mode bucket; also resets the input affordances.
    Normal,
    /// All compare buckets of one version.
    CompareVersion(String),
    /// Every compare bucket.
    AllCompare,
}

/// Input-area affordances that follow the conversation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationFlags {
    pub show_hints: bool,
    pub input_enabled: bool,
}

impl Default for ConversationFlags {
    fn default() -> Self {
        Self {
            show_hints: true,
            input_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageStore {
    model_messages: BTreeMap<String, OrderedMessages>,
    compare_messages: BTreeMap<String, BTreeMap<String, OrderedMessages>>,
    flags: ConversationFlags,
}

/// A provider-facing chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(&self) -> ConversationFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: ConversationFlags) {
        self.flags = flags;
    }

    fn bucket(&self, key: &BucketKey) -> Option<&OrderedMessages> {
        match key {
            BucketKey::Model(m) => self.model_messages.get(m),
            BucketKey::Compare {
                version_id,
                model_id,
            } => self
                .compare_messages
                .get(version_id)
                .and_then(|by_model| by_model.get(model_id)),
        }
    }

    fn bucket_mut(&mut self, key: &BucketKey) -> Option<&mut OrderedMessages> {
        match key {
            BucketKey::Model(m) => self.model_messages.get_mut(m),
            BucketKey::Compare {
                version_id,
                model_id,
            } => self
                .compare_messages
                .get_mut(version_id)
                .and_then(|by_model| by_model.get_mut(model_id)),
        }
    }

    fn bucket_entry(&mut self, key: &BucketKey) -> &mut OrderedMessages {
        match key {
            BucketKey::Model(m) => self.model_messages.entry(m.clone()).or_default(),
            BucketKey::Compare {
                version_id,
                model_id,
            } => self
                .compare_messages
                .entry(version_id.clone())
                .or_default()
                .entry(model_id.clone())
                .or_default(),
        }
    }

    /// Appends a message, or merges into the message with the same id.
    /// Returns the id so the caller can address the message later.
    pub fn append_message(&mut self, key: &BucketKey, draft: MessageDraft) -> String {
        self.bucket_entry(key).upsert(draft)
    }

    /// Updates an existing message; never creates one.
    pub fn update_message(&mut self, key: &BucketKey, id: &str, patch: MessagePatch) -> Mutation {
        match self.bucket_mut(key) {
            Some(bucket) => bucket.patch(id, patch),
            None => Mutation::NotFound,
        }
    }

    pub fn set_rating(&mut self, key: &BucketKey, id: &str, rating: Option<Rating>) -> Mutation {
        match self.bucket_mut(key) {
            Some(bucket) => bucket.set_rating(id, rating),
            None => Mutation::NotFound,
        }
    }

    /// Messages of one bucket in the order they were first appended.
    pub fn get_messages(&self, key: &BucketKey) -> Vec<ModelMessage> {
        self.bucket(key).map(OrderedMessages::to_vec).unwrap_or_default()
    }

    pub fn message(&self, key: &BucketKey, id: &str) -> Option<&ModelMessage> {
        self.bucket(key).and_then(|b| b.get(id))
    }

    pub fn message_count(&self, key: &BucketKey) -> usize {
        self.bucket(key).map(OrderedMessages::len).unwrap_or(0)
    }

    /// Non-empty buckets, normal ones first.
    pub fn bucket_keys(&self) -> Vec<BucketKey> {
        let normal = self
            .model_messages
            .iter()
            .filter(|(_, b)| !b.is_empty())
            .map(|(m, _)| BucketKey::Model(m.clone()));
        let compare = self.compare_messages.iter().flat_map(|(v, by_model)| {
            by_model
                .iter()
                .filter(|(_, b)| !b.is_empty())
                .map(move |(m, _)| BucketKey::compare(v.clone(), m.clone()))
        });
        normal.chain(compare).collect()
    }

    /// Locates the bucket holding a message id.
    pub fn locate(&self, id: &str) -> Option<BucketKey> {
        self.bucket_keys()
            .into_iter()
            .find(|key| self.bucket(key).is_some_and(|b| b.contains(id)))
    }

    pub fn clear(&mut self, scope: ClearScope) {
        match scope {
            ClearScope::Normal => {
                self.model_messages.clear();
                self.flags = ConversationFlags::default();
            }
            ClearScope::CompareVersion(version_id) => {
                self.compare_messages.remove(&version_id);
            }
            ClearScope::AllCompare => self.compare_messages.clear(),
        }
    }

    /// Assistant ratings of a bucket, in order, skipping unrated replies.
    pub fn rated_assistant_messages(&self, key: &BucketKey) -> Vec<Rating> {
        self.bucket(key)
            .map(|b| {
                b.iter()
                    .filter(|m| m.role == Role::Assistant)
                    .filter_map(|m| m.rating)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Completed turns of a bucket, suitable for a provider request.
    pub fn conversation_history(&self, key: &BucketKey) -> Vec<ChatTurn> {
        self.bucket(key)
            .map(|b| {
                b.iter()
                    .filter_map(|m| {
                        m.content.as_ref().map(|c| ChatTurn {
                            role: m.role,
                            content: c.clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_survives_updates_and_ratings() {
        let mut store = MessageStore::new();
        let key = BucketKey::model("gpt-4o");
        let ids: Vec<String> = (0..5)
            .map(|i| store.append_message(&key, MessageDraft::user(format!("m{i}"))))
            .collect();

        assert!(store
            .update_message(&key, &ids[3], MessagePatch::content("edited"))
            .is_applied());
        assert!(store
            .set_rating(&key, &ids[0], Some(Rating::Good))
            .is_applied());
        assert!(store.set_rating(&key, &ids[0], None).is_applied());

        let got: Vec<String> = store.get_messages(&key).into_iter().map(|m| m.id).collect();
        assert_eq!(got, ids);
        assert_eq!(store.get_messages(&key)[0].rating, None);
    }

    #[test]
    fn test_reappend_merges_instead_of_duplicating() {
        let mut store = MessageStore::new();
        let key = BucketKey::compare("v1", "gpt-4o");
        let id = store.append_message(&key, MessageDraft::pending_reply("gpt-4o"));
        let again = store.append_message(
            &key,
            MessageDraft::assistant("done").with_id(id.clone()),
        );

        assert_eq!(again, id);
        assert_eq!(store.message_count(&key), 1);
        let msg = store.message(&key, &id).unwrap();
        assert_eq!(msg.content.as_deref(), Some("done"));
        assert_eq!(msg.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn test_update_is_never_an_upsert() {
        let mut store = MessageStore::new();
        let key = BucketKey::model("m");
        assert_eq!(
            store.update_message(&key, "nope", MessagePatch::content("x")),
            Mutation::NotFound
        );
        store.append_message(&key, MessageDraft::user("hi"));
        assert_eq!(
            store.update_message(&key, "nope", MessagePatch::content("x")),
            Mutation::NotFound
        );
        assert_eq!(store.message_count(&key), 1);
        assert_eq!(store.set_rating(&key, "nope", Some(Rating::Bad)), Mutation::NotFound);
    }

    #[test]
    fn test_buckets_are_isolated() {
        let mut store = MessageStore::new();
        let normal = BucketKey::model("m");
        let compare = BucketKey::compare("v1", "m");
        let id = store.append_message(&normal, MessageDraft::user("a"));
        store.append_message(&compare, MessageDraft::user("b"));

        assert_eq!(store.set_rating(&compare, &id, Some(Rating::Good)), Mutation::NotFound);
        assert_eq!(store.locate(&id), Some(normal.clone()));
        assert_eq!(store.bucket_keys(), vec![normal, compare]);
    }

    #[test]
    fn test_clear_normal_resets_flags_only_for_normal_scope() {
        let mut store = MessageStore::new();
        store.set_flags(ConversationFlags {
            show_hints: false,
            input_enabled: false,
        });
        store.append_message(&BucketKey::model("m"), MessageDraft::user("a"));
        store.append_message(&BucketKey::compare("v1", "m"), MessageDraft::user("b"));
        store.append_message(&BucketKey::compare("v2", "m"), MessageDraft::user("c"));

        store.clear(ClearScope::CompareVersion("v1".into()));
        assert_eq!(store.message_count(&BucketKey::compare("v1", "m")), 0);
        assert_eq!(store.message_count(&BucketKey::compare("v2", "m")), 1);
        assert!(!store.flags().show_hints);

        store.clear(ClearScope::Normal);
        assert_eq!(store.message_count(&BucketKey::model("m")), 0);
        assert_eq!(store.flags(), ConversationFlags::default());

        store.clear(ClearScope::AllCompare);
        assert!(store.bucket_keys().is_empty());
    }

    #[test]
    fn test_history_skips_pending_and_ratings_skip_users() {
        let mut store = MessageStore::new();
        let key = BucketKey::model("m");
        store.append_message(&key, MessageDraft::user("q").with_rating(Rating::Bad));
        store.append_message(&key, MessageDraft::assistant("a").with_rating(Rating::Good));
        store.append_message(&key, MessageDraft::pending_reply("m"));

        assert_eq!(store.conversation_history(&key).len(), 2);
        assert_eq!(store.rated_assistant_messages(&key), vec![Rating::Good]);
    }
}
