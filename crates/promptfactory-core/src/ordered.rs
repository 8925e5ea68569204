//! Insertion-ordered message collection.
//!
//! A single `IndexMap` carries both the id → message lookup and the display
//! order, so the two can never drift apart.

use crate::model::{MessageDraft, MessagePatch, ModelMessage, Mutation, Rating};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderedMessages {
    entries: IndexMap<String, ModelMessage>,
}

impl OrderedMessages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ModelMessage> {
        self.entries.get(id)
    }

    /// Appends a new message, or merges into the existing one when the draft
    /// carries an id already present. Position is fixed at first insert.
    pub fn upsert(&mut self, draft: MessageDraft) -> String {
        let id = draft.id.clone().unwrap_or_else(crate::model::new_id);

        if let Some(existing) = self.entries.get_mut(&id) {
            existing.role = draft.role;
            if draft.content.is_some() {
                existing.content = draft.content;
            }
            if draft.rating.is_some() {
                existing.rating = draft.rating;
            }
            if draft.spend_time.is_some() {
                existing.spend_time = draft.spend_time;
            }
            if draft.model.is_some() {
                existing.model = draft.model;
            }
            return id;
        }

        self.entries.insert(
            id.clone(),
            ModelMessage {
                id: id.clone(),
                role: draft.role,
                content: draft.content,
                rating: draft.rating,
                spend_time: draft.spend_time,
                model: draft.model,
            },
        );
        id
    }

    pub fn patch(&mut self, id: &str, patch: MessagePatch) -> Mutation {
        let Some(msg) = self.entries.get_mut(id) else {
            return Mutation::NotFound;
        };

        if let Some(content) = patch.content {
            msg.content = Some(content);
        }
        if let Some(chunk) = patch.append {
            msg.content.get_or_insert_with(String::new).push_str(&chunk);
        }
        if let Some(ms) = patch.spend_time {
            msg.spend_time = Some(ms);
        }
        if let Some(model) = patch.model {
            msg.model = Some(model);
        }
        Mutation::Applied
    }

    pub fn set_rating(&mut self, id: &str, rating: Option<Rating>) -> Mutation {
        match self.entries.get_mut(id) {
            Some(msg) => {
                msg.rating = rating;
                Mutation::Applied
            }
            None => Mutation::NotFound,
        }
    }

    /// Removes a message while keeping the order of the rest.
    pub fn remove(&mut self, id: &str) -> Option<ModelMessage> {
        self.entries.shift_remove(id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelMessage> {
        self.entries.values()
    }

    pub fn to_vec(&self) -> Vec<ModelMessage> {
        self.entries.values().cloned().collect()
    }
}
