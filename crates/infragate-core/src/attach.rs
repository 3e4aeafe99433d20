//! Mixin attachment policy
//!
//! Each rule is a pure function of the backend source records returning the
//! mixin tags it wants attached. Rules are independent: every rule runs and
//! all resulting tags are attached. Tags are resolved against the catalog;
//! an unresolvable required tag is a configuration error.

use crate::catalog::Catalog;
use crate::error::{BackendError, Result};
use crate::model::Entity;
use serde_json::Value;
use std::collections::BTreeMap;

/// A mixin requested by a rule
#[derive(Debug, Clone, PartialEq)]
pub struct MixinTag {
    pub type_id: String,

    /// Optional tags are skipped when the catalog does not know them
    pub optional: bool,

    /// Attribute values taken from the source, set on attachment
    pub attributes: BTreeMap<String, Value>,
}

impl MixinTag {
    pub fn required(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            optional: false,
            attributes: BTreeMap::new(),
        }
    }

    pub fn optional(type_id: impl Into<String>) -> Self {
        Self {
            optional: true,
            ..Self::required(type_id)
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

type RuleFn<S> = Box<dyn Fn(&S) -> Vec<MixinTag> + Send + Sync>;

struct MixinRule<S: ?Sized> {
    name: &'static str,
    produce: RuleFn<S>,
}

/// Ordered list of attachment rules for one kind
pub struct AttachPolicy<S: ?Sized> {
    rules: Vec<MixinRule<S>>,
}

impl<S: ?Sized> AttachPolicy<S> {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Attaches `type_id` whenever `predicate` holds
    pub fn when<P>(self, name: &'static str, type_id: &'static str, predicate: P) -> Self
    where
        P: Fn(&S) -> bool + Send + Sync + 'static,
    {
        self.rule(name, move |source: &S| {
            if predicate(source) {
                vec![MixinTag::required(type_id)]
            } else {
                Vec::new()
            }
        })
    }

    /// Always attaches `type_id`
    pub fn always(self, name: &'static str, type_id: impl Into<String>) -> Self {
        let type_id = type_id.into();
        self.rule(name, move |_: &S| vec![MixinTag::required(type_id.clone())])
    }

    /// Adds an arbitrary rule, e.g. one parameterized by a source value
    pub fn rule<F>(mut self, name: &'static str, produce: F) -> Self
    where
        F: Fn(&S) -> Vec<MixinTag> + Send + Sync + 'static,
    {
        self.rules.push(MixinRule {
            name,
            produce: Box::new(produce),
        });
        self
    }

    /// Evaluates every rule without touching an entity
    pub fn evaluate(&self, source: &S) -> Vec<MixinTag> {
        self.rules
            .iter()
            .flat_map(|rule| (rule.produce)(source))
            .collect()
    }

    /// Evaluates all rules and attaches the resolved mixins to `entity`
    pub fn attach(&self, catalog: &Catalog, source: &S, entity: &mut Entity) -> Result<()> {
        for rule in &self.rules {
            for tag in (rule.produce)(source) {
                let Some(mixin) = catalog.mixin(&tag.type_id) else {
                    if tag.optional {
                        tracing::debug!(
                            "Rule {} skipped unknown optional mixin {}",
                            rule.name,
                            tag.type_id
                        );
                        continue;
                    }
                    return Err(BackendError::Configuration(format!(
                        "rule {} requires mixin {} which is not registered",
                        rule.name, tag.type_id
                    )));
                };

                for (key, value) in tag.attributes {
                    entity.set_attribute(key, value);
                }
                entity.attach(mixin.clone());
            }
        }

        tracing::debug!(
            "Attached mixins {:?} to {}",
            entity.mixins.type_identifiers().collect::<Vec<_>>(),
            entity.id_str()
        );
        Ok(())
    }
}

impl<S: ?Sized> Default for AttachPolicy<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{availability_zone_id, availability_zone_mixin, attrs, mixins};
    use serde_json::json;

    fn policy() -> AttachPolicy<Value> {
        AttachPolicy::new()
            .when("ip", mixins::IPNETWORKINTERFACE, |nic: &Value| {
                nic.get("IP").is_some()
            })
            .rule("zone", |nic: &Value| {
                nic.get("CLUSTER_ID")
                    .and_then(|c| c.as_str())
                    .map(|cid| vec![MixinTag::optional(availability_zone_id(cid))])
                    .unwrap_or_default()
            })
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::infrastructure();
        catalog.add_mixin(availability_zone_mixin("0")).unwrap();
        catalog
    }

    #[test]
    fn test_independent_rules_all_fire() {
        let mut entity = Entity::new("networkinterface");
        policy()
            .attach(&catalog(), &json!({"IP": "10.0.0.2", "CLUSTER_ID": "0"}), &mut entity)
            .unwrap();

        assert!(entity.mixins.contains(mixins::IPNETWORKINTERFACE));
        assert!(entity.mixins.contains(&availability_zone_id("0")));
        assert_eq!(entity.attribute_str(attrs::AVAILABILITY_ZONE_NAME), Some("0"));
    }

    #[test]
    fn test_attachment_is_deterministic_and_idempotent() {
        let source = json!({"IP": "10.0.0.2", "CLUSTER_ID": "0"});
        let mut once = Entity::new("networkinterface");
        policy().attach(&catalog(), &source, &mut once).unwrap();

        let mut twice = once.clone();
        policy().attach(&catalog(), &source, &mut twice).unwrap();
        assert_eq!(once.mixins, twice.mixins);
    }

    #[test]
    fn test_optional_unknown_mixin_is_skipped() {
        let mut entity = Entity::new("networkinterface");
        policy()
            .attach(&catalog(), &json!({"CLUSTER_ID": "99"}), &mut entity)
            .unwrap();
        assert!(entity.mixins.is_empty());
    }

    #[test]
    fn test_required_unknown_mixin_is_fatal() {
        let policy: AttachPolicy<Value> = AttachPolicy::new().always("region", "http://nowhere#x");
        let mut entity = Entity::new("compute");
        let result = policy.attach(&catalog(), &json!({}), &mut entity);
        assert!(matches!(result, Err(BackendError::Configuration(_))));
    }
}
