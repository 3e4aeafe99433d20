//! Mixins (capability tags) and mixin-based filters

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// An attachable capability tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mixin {
    pub scheme: String,
    pub term: String,

    #[serde(default)]
    pub title: String,

    /// Type identifiers of mixins this one depends on
    #[serde(default)]
    pub depends: Vec<String>,

    /// Type identifiers of kinds this mixin applies to
    #[serde(default)]
    pub applies: Vec<String>,

    /// Attribute defaults contributed on attachment
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Mixin {
    pub fn new(scheme: impl Into<String>, term: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            term: term.into(),
            title: title.into(),
            depends: Vec::new(),
            applies: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn depends_on(mut self, type_id: impl Into<String>) -> Self {
        self.depends.push(type_id.into());
        self
    }

    pub fn applies_to(mut self, type_id: impl Into<String>) -> Self {
        self.applies.push(type_id.into());
        self
    }

    pub fn with_default(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn type_identifier(&self) -> String {
        super::type_identifier(&self.scheme, &self.term)
    }

    /// True for the mixin itself and for mixins declaring a dependency on it
    pub fn is_related_to(&self, type_id: &str) -> bool {
        self.type_identifier() == type_id || self.depends.iter().any(|d| d == type_id)
    }
}

/// Set of mixins attached to an entity, keyed by type identifier.
///
/// Inserting a mixin that is already present is a no-op.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MixinSet {
    inner: BTreeMap<String, Mixin>,
}

impl MixinSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the mixin was already attached
    pub fn insert(&mut self, mixin: Mixin) -> bool {
        let key = mixin.type_identifier();
        if self.inner.contains_key(&key) {
            return false;
        }
        self.inner.insert(key, mixin);
        true
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.inner.contains_key(type_id)
    }

    pub fn get(&self, type_id: &str) -> Option<&Mixin> {
        self.inner.get(type_id)
    }

    pub fn remove(&mut self, type_id: &str) -> Option<Mixin> {
        self.inner.remove(type_id)
    }

    /// Mixins that are, or depend on, the given mixin
    pub fn related_to<'a>(&'a self, type_id: &'a str) -> impl Iterator<Item = &'a Mixin> + 'a {
        self.inner.values().filter(move |m| m.is_related_to(type_id))
    }

    pub fn type_identifiers(&self) -> impl Iterator<Item = &String> {
        self.inner.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mixin> {
        self.inner.values()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl FromIterator<Mixin> for MixinSet {
    fn from_iter<I: IntoIterator<Item = Mixin>>(iter: I) -> Self {
        let mut set = MixinSet::new();
        for mixin in iter {
            set.insert(mixin);
        }
        set
    }
}

impl Serialize for MixinSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.inner.values())
    }
}

impl<'de> Deserialize<'de> for MixinSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mixins = Vec::<Mixin>::deserialize(deserializer)?;
        Ok(mixins.into_iter().collect())
    }
}

/// Collection filter: an entity matches when it carries every listed mixin.
/// The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MixinFilter {
    mixins: BTreeSet<String>,
}

impl MixinFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, type_id: impl Into<String>) -> Self {
        self.mixins.insert(type_id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.mixins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.mixins.iter()
    }

    pub fn matches(&self, mixins: &MixinSet) -> bool {
        self.mixins.iter().all(|m| mixins.contains(m))
    }
}

impl FromIterator<String> for MixinFilter {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            mixins: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OS_TPL: &str = "http://schemas.ogf.org/occi/infrastructure#os_tpl";

    fn ubuntu() -> Mixin {
        Mixin::new("http://occi.localhost/occi/infrastructure/os_tpl#", "ubuntu", "Ubuntu")
            .depends_on(OS_TPL)
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut once = MixinSet::new();
        assert!(once.insert(ubuntu()));

        let mut twice = MixinSet::new();
        twice.insert(ubuntu());
        assert!(!twice.insert(ubuntu()));

        assert_eq!(once, twice);
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn test_related_to_follows_depends() {
        let set: MixinSet = [ubuntu()].into_iter().collect();
        assert_eq!(set.related_to(OS_TPL).count(), 1);
        assert_eq!(
            set.related_to("http://schemas.ogf.org/occi/infrastructure#resource_tpl")
                .count(),
            0
        );
    }

    #[test]
    fn test_filter_requires_all_mixins() {
        let set: MixinSet = [ubuntu()].into_iter().collect();
        let ubuntu_id = ubuntu().type_identifier();

        assert!(MixinFilter::new().matches(&set));
        assert!(MixinFilter::new().with(ubuntu_id.clone()).matches(&set));
        assert!(
            !MixinFilter::new()
                .with(ubuntu_id)
                .with(OS_TPL)
                .matches(&set)
        );
    }

    #[test]
    fn test_serializes_as_sequence() {
        let set: MixinSet = [ubuntu()].into_iter().collect();
        let json = serde_json::to_value(&set).unwrap();
        assert!(json.is_array());

        let back: MixinSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
    }
}
