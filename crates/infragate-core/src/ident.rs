//! Canonical identifiers and the identifier codec
//!
//! Callers treat an `Identifier` as opaque. Adapters whose backend objects
//! only exist nested inside another object (a NIC inside a VM) encode the
//! parent key and the nested sub-keys into one string:
//!
//! ```text
//! compute_42_nic_2
//! ^^^^^^^ ^^ ^^^ ^
//! root    key label sub-key
//! ```
//!
//! Components are restricted to `[A-Za-z0-9.-]`, so the `_` separator is
//! unambiguous and `encode` is injective for a given codec.

use crate::error::{BackendError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

const COMPONENT: &str = r"[A-Za-z0-9.\-]+";

static COMPONENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{}$", COMPONENT)).unwrap());

/// Opaque identifier, unique within a kind's namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Takes the last path segment of a location such as `/compute/42`
    pub fn from_location(location: &str) -> Self {
        let trimmed = location.trim_end_matches('/');
        let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
        Self(last.to_string())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for Identifier {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Backend address decoded from an identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedId {
    /// Backend-native primary key
    pub key: String,

    /// Nested sub-keys, in the codec's label order
    pub subs: Vec<String>,
}

impl DecodedId {
    pub fn sub(&self, index: usize) -> Option<&str> {
        self.subs.get(index).map(|s| s.as_str())
    }
}

/// Encodes and decodes identifiers for one kind
#[derive(Debug, Clone)]
pub struct IdentifierCodec {
    root: Option<String>,
    labels: Vec<String>,
    pattern: Regex,
}

impl IdentifierCodec {
    /// Identifiers that are the backend-native key itself
    pub fn simple() -> Self {
        let pattern = Regex::new(&format!("^(?P<key>{})$", COMPONENT)).unwrap();
        Self {
            root: None,
            labels: Vec::new(),
            pattern,
        }
    }

    /// Identifiers of the form `{root}_{key}_{label}_{sub}...`
    ///
    /// `root` and every label must themselves be valid components.
    pub fn compound(root: &str, labels: &[&str]) -> Result<Self> {
        if let Some(bad) = std::iter::once(&root)
            .chain(labels.iter())
            .find(|part| !COMPONENT_RE.is_match(part))
        {
            return Err(BackendError::Configuration(format!(
                "{:?} cannot be part of a compound identifier",
                bad
            )));
        }

        let mut pattern = format!("^{}_(?P<key>{})", regex::escape(root), COMPONENT);
        for (i, label) in labels.iter().enumerate() {
            pattern.push_str(&format!("_{}_(?P<s{}>{})", regex::escape(label), i, COMPONENT));
        }
        pattern.push('$');
        let pattern = Regex::new(&pattern).map_err(|e| BackendError::Configuration(e.to_string()))?;

        Ok(Self {
            root: Some(root.to_string()),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            pattern,
        })
    }

    /// Number of sub-keys this codec expects
    pub fn arity(&self) -> usize {
        self.labels.len()
    }

    pub fn encode(&self, key: &str, subs: &[&str]) -> Result<Identifier> {
        if subs.len() != self.labels.len() {
            return Err(BackendError::IdentifierNotValid(format!(
                "expected {} sub-keys, got {}",
                self.labels.len(),
                subs.len()
            )));
        }
        for component in std::iter::once(&key).chain(subs.iter()) {
            if !COMPONENT_RE.is_match(component) {
                return Err(BackendError::IdentifierNotValid(format!(
                    "component {:?} is empty or contains unsupported characters",
                    component
                )));
            }
        }

        let mut encoded = match &self.root {
            Some(root) => format!("{}_{}", root, key),
            None => key.to_string(),
        };
        for (label, sub) in self.labels.iter().zip(subs) {
            encoded.push_str(&format!("_{}_{}", label, sub));
        }
        Ok(Identifier(encoded))
    }

    pub fn decode(&self, id: &str) -> Result<DecodedId> {
        let captures = self.pattern.captures(id).ok_or_else(|| {
            BackendError::IdentifierNotValid(format!(
                "{:?} does not match {}",
                id,
                self.pattern.as_str()
            ))
        })?;

        let key = captures["key"].to_string();
        let subs = (0..self.labels.len())
            .map(|i| captures[format!("s{}", i).as_str()].to_string())
            .collect();

        Ok(DecodedId { key, subs })
    }
}
