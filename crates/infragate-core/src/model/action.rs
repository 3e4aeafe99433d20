//! Action definitions and instances

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named operation a kind supports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDef {
    pub scheme: String,
    pub term: String,
    pub title: String,

    /// Accepted parameter names
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl ActionDef {
    pub fn new(scheme: impl Into<String>, term: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            term: term.into(),
            title: title.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: &[&str]) -> Self {
        self.attributes
            .extend(attributes.iter().map(|a| a.to_string()));
        self
    }

    pub fn type_identifier(&self) -> String {
        super::type_identifier(&self.scheme, &self.term)
    }
}

/// An action addressed at one entity or at a filtered collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInstance {
    /// Action type identifier
    pub action: String,

    /// Parameters, e.g. `method` for stop
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl ActionInstance {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// The fragment part of the action type identifier (`start`, `stop`, ...)
    pub fn term(&self) -> &str {
        self.action
            .rsplit_once('#')
            .map(|(_, term)| term)
            .unwrap_or(&self.action)
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}
