//! Canonical entity instances

use super::mixin::{Mixin, MixinFilter, MixinSet};
use crate::ident::Identifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Source and target of a link-like entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkEnds {
    /// Location of the source resource, e.g. `/compute/42`
    pub source: String,

    /// Location of the target resource, e.g. `/network/7`
    pub target: String,

    /// Type identifier of the target's kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_kind: Option<String>,
}

impl LinkEnds {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            target_kind: None,
        }
    }
}

/// An instance of exactly one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Kind type identifier
    pub kind: String,

    /// Canonical identifier; absent only on client-submitted entities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Identifier>,

    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub mixins: MixinSet,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkEnds>,
}

impl Entity {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            attributes: BTreeMap::new(),
            mixins: MixinSet::new(),
            link: None,
        }
    }

    pub fn with_id(mut self, id: Identifier) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_link(mut self, link: LinkEnds) -> Self {
        self.link = Some(link);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_mixin(mut self, mixin: Mixin) -> Self {
        self.attach(mixin);
        self
    }

    /// Attaches a mixin and fills in its attribute defaults.
    ///
    /// Attaching an already attached mixin changes nothing.
    pub fn attach(&mut self, mixin: Mixin) -> bool {
        for (key, value) in &mixin.attributes {
            self.attributes
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self.mixins.insert(mixin)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
    }

    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }

    pub fn attribute_i64(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(|v| v.as_i64())
    }

    pub fn attribute_f64(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(|v| v.as_f64())
    }

    pub fn matches(&self, filter: &MixinFilter) -> bool {
        filter.matches(&self.mixins)
    }

    pub fn is_link(&self) -> bool {
        self.link.is_some()
    }

    /// Identifier as a string slice, empty when unassigned
    pub fn id_str(&self) -> &str {
        self.id.as_ref().map(|id| id.as_str()).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attach_applies_defaults_without_overwriting() {
        let small = Mixin::new("http://example.org/resource_tpl#", "small", "Small")
            .with_default("occi.compute.cores", json!(1))
            .with_default("occi.compute.memory", json!(1.0));

        let mut entity = Entity::new("http://schemas.ogf.org/occi/infrastructure#compute")
            .with_attribute("occi.compute.cores", json!(4));
        entity.attach(small);

        assert_eq!(entity.attribute_i64("occi.compute.cores"), Some(4));
        assert_eq!(entity.attribute_f64("occi.compute.memory"), Some(1.0));
    }

    #[test]
    fn test_attach_twice_is_idempotent() {
        let mixin = Mixin::new("http://example.org/region#", "eu", "EU");
        let mut once = Entity::new("kind");
        once.attach(mixin.clone());

        let mut twice = once.clone();
        assert!(!twice.attach(mixin));
        assert_eq!(once, twice);
    }
}
