//! Kind definitions

use serde::{Deserialize, Serialize};

/// Whether entities of a kind are resources or links between resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Resource,
    Link,
}

/// The canonical type of an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kind {
    pub scheme: String,
    pub term: String,
    pub title: String,
    pub location: Location,

    /// Canonical attribute names exposed by entities of this kind
    pub attributes: Vec<String>,

    /// Type identifiers of the actions this kind supports
    pub actions: Vec<String>,
}

impl Kind {
    pub fn new(
        scheme: impl Into<String>,
        term: impl Into<String>,
        title: impl Into<String>,
        location: Location,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            term: term.into(),
            title: title.into(),
            location,
            attributes: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: &[&str]) -> Self {
        self.attributes
            .extend(attributes.iter().map(|a| a.to_string()));
        self
    }

    pub fn with_actions(mut self, actions: &[String]) -> Self {
        self.actions.extend(actions.iter().cloned());
        self
    }

    pub fn type_identifier(&self) -> String {
        super::type_identifier(&self.scheme, &self.term)
    }

    pub fn is_link(&self) -> bool {
        self.location == Location::Link
    }

    pub fn supports_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }

    /// Location prefix of entities of this kind, e.g. `/compute/`
    pub fn location_prefix(&self) -> String {
        format!("/{}/", self.term)
    }
}
