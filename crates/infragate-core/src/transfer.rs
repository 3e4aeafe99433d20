//! Attribute transfer from backend-native records
//!
//! A `TransferTable` is an ordered list of canonical attribute names, each
//! paired with an extractor over the backend source `S`. When more than one
//! backend record is needed (a NIC and the VM it lives in), `S` is a tuple of
//! references.
//!
//! Extractors return `None` for missing optional fields; the attribute is then
//! left out of the entity. Backend fields without a rule are never copied.

use crate::model::Entity;
use serde_json::Value;

type Extractor<S> = Box<dyn Fn(&S) -> Option<Value> + Send + Sync>;

struct TransferRule<S: ?Sized> {
    name: &'static str,
    extract: Extractor<S>,
}

/// Declarative attribute name → extractor table
pub struct TransferTable<S: ?Sized> {
    rules: Vec<TransferRule<S>>,
}

impl<S: ?Sized> TransferTable<S> {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Adds a rule; later rules for the same name win
    pub fn attr<F>(mut self, name: &'static str, extract: F) -> Self
    where
        F: Fn(&S) -> Option<Value> + Send + Sync + 'static,
    {
        self.rules.push(TransferRule {
            name,
            extract: Box::new(extract),
        });
        self
    }

    /// Attribute names this table may produce, in rule order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|r| r.name)
    }

    /// Copies every extractable attribute from `source` into `entity`
    pub fn apply(&self, source: &S, entity: &mut Entity) {
        for rule in &self.rules {
            if let Some(value) = (rule.extract)(source) {
                entity.set_attribute(rule.name, value);
            }
        }
    }
}

impl<S: ?Sized> Default for TransferTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferTable<Value> {
    /// Adds a rule reading a JSON pointer from a JSON-shaped record
    pub fn pointer(self, name: &'static str, pointer: &'static str) -> Self {
        self.attr(name, move |record: &Value| non_empty(record.pointer(pointer)))
    }
}

/// Drops nulls and empty strings, which backends use for "unset"
pub fn non_empty(value: Option<&Value>) -> Option<Value> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        other => Some(other.clone()),
    }
}

/// Reads a numeric value that the backend may encode as a string
pub fn number(value: Option<&Value>) -> Option<Value> {
    match value? {
        Value::Number(n) => Some(Value::Number(n.clone())),
        Value::String(s) => {
            if let Ok(i) = s.trim().parse::<i64>() {
                Some(Value::from(i))
            } else {
                s.trim().parse::<f64>().ok().map(Value::from)
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vm_record() -> Value {
        json!({
            "ID": "42",
            "NAME": "web-1",
            "TEMPLATE": { "CPU": "2", "MEMORY": "2048", "VCPU": "" },
            "UNMAPPED": "dropped"
        })
    }

    fn table() -> TransferTable<Value> {
        TransferTable::new()
            .pointer("occi.core.title", "/NAME")
            .attr("occi.compute.cores", |r: &Value| number(r.pointer("/TEMPLATE/VCPU")))
            .attr("occi.compute.speed", |r: &Value| number(r.pointer("/TEMPLATE/CPU")))
            .attr("occi.compute.memory", |r: &Value| {
                number(r.pointer("/TEMPLATE/MEMORY"))
                    .and_then(|m| m.as_f64())
                    .map(|mb| json!(mb / 1024.0))
            })
            .pointer("occi.compute.hostname", "/TEMPLATE/CONTEXT/HOSTNAME")
    }

    #[test]
    fn test_missing_fields_are_absent() {
        let mut entity = Entity::new("compute");
        table().apply(&vm_record(), &mut entity);

        assert_eq!(entity.attribute_str("occi.core.title"), Some("web-1"));
        assert_eq!(entity.attribute_i64("occi.compute.speed"), Some(2));
        assert_eq!(entity.attribute_f64("occi.compute.memory"), Some(2.0));
        assert!(entity.attribute("occi.compute.cores").is_none());
        assert!(entity.attribute("occi.compute.hostname").is_none());
        assert!(entity.attribute("UNMAPPED").is_none());
    }

    #[test]
    fn test_transfer_is_deterministic() {
        let table = table();
        let record = vm_record();

        let mut first = Entity::new("compute");
        table.apply(&record, &mut first);
        for _ in 0..5 {
            let mut again = Entity::new("compute");
            table.apply(&record, &mut again);
            assert_eq!(again.attributes, first.attributes);
        }
    }

    #[test]
    fn test_tuple_sources() {
        let table: TransferTable<(Value, Value)> = TransferTable::new()
            .attr("occi.networkinterface.mac", |(nic, _vm): &(Value, Value)| {
                non_empty(nic.get("MAC"))
            })
            .attr("occi.core.title", |(nic, vm): &(Value, Value)| {
                Some(json!(format!("NIC {} of {}", nic["NIC_ID"], vm["NAME"].as_str()?)))
            });

        let mut entity = Entity::new("networkinterface");
        table.apply(
            &(json!({"NIC_ID": 0, "MAC": "02:00:0a"}), json!({"NAME": "web-1"})),
            &mut entity,
        );
        assert_eq!(entity.attribute_str("occi.networkinterface.mac"), Some("02:00:0a"));
        assert_eq!(entity.attribute_str("occi.core.title"), Some("NIC 0 of web-1"));
        assert_eq!(table.names().count(), 2);
    }
}
