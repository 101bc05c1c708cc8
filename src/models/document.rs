//! Configuration document model
//!
//! The structured configuration of an appliance is an arbitrarily nested
//! JSON object. Sections are its top-level keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::policy::Section;

/// Structured configuration tree, keyed by section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigDocument(Map<String, Value>);

impl ConfigDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Sub-tree of one section, if present and an object
    pub fn section(&self, section: Section) -> Option<&Map<String, Value>> {
        self.0.get(section.key()).and_then(Value::as_object)
    }

    /// Insert or replace one section
    pub fn insert_section(&mut self, section: Section, content: Map<String, Value>) {
        self.0.insert(section.key().to_string(), Value::Object(content));
    }

    /// Whether the section key is present
    pub fn contains(&self, section: Section) -> bool {
        self.0.contains_key(section.key())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for ConfigDocument {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for ConfigDocument {
    type Error = Value;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}
