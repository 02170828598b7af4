//! Self-describing tagged record tree used as the durable representation

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::persistence::{PersistenceError, PersistenceResult};

/// A single tagged value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tag {
    Long(i64),
    String(String),
    List(Vec<Tag>),
    Compound(CompoundTag),
}

impl Tag {
    fn kind(&self) -> &'static str {
        match self {
            Tag::Long(_) => "long",
            Tag::String(_) => "string",
            Tag::List(_) => "list",
            Tag::Compound(_) => "compound",
        }
    }
}

/// Named tags, kept sorted by name so the encoding is stable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompoundTag {
    entries: BTreeMap<String, Tag>,
}

impl CompoundTag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: &str, tag: Tag) {
        self.entries.insert(key.to_string(), tag);
    }

    pub fn put_long(&mut self, key: &str, value: i64) {
        self.put(key, Tag::Long(value));
    }

    pub fn put_string(&mut self, key: &str, value: impl Into<String>) {
        self.put(key, Tag::String(value.into()));
    }

    pub fn put_list(&mut self, key: &str, values: Vec<Tag>) {
        self.put(key, Tag::List(values));
    }

    pub fn get(&self, key: &str) -> Option<&Tag> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_long(&self, key: &str) -> PersistenceResult<i64> {
        match self.require(key)? {
            Tag::Long(value) => Ok(*value),
            other => Err(wrong_kind(key, "long", other)),
        }
    }

    pub fn get_string(&self, key: &str) -> PersistenceResult<&str> {
        match self.require(key)? {
            Tag::String(value) => Ok(value),
            other => Err(wrong_kind(key, "string", other)),
        }
    }

    pub fn get_list(&self, key: &str) -> PersistenceResult<&[Tag]> {
        match self.require(key)? {
            Tag::List(values) => Ok(values),
            other => Err(wrong_kind(key, "list", other)),
        }
    }

    fn require(&self, key: &str) -> PersistenceResult<&Tag> {
        self.entries
            .get(key)
            .ok_or_else(|| PersistenceError::MissingField(key.to_string()))
    }
}

fn wrong_kind(key: &str, expected: &str, found: &Tag) -> PersistenceError {
    PersistenceError::CorruptedData(format!(
        "field {:?} should be a {} but is a {}",
        key,
        expected,
        found.kind()
    ))
}
