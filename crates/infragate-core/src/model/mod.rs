//! Canonical resource model
//!
//! Kinds, actions and mixins are static configuration (see `catalog`);
//! entities are materialized from backend state on every read.

pub mod action;
pub mod entity;
pub mod kind;
pub mod mixin;

pub use action::{ActionDef, ActionInstance};
pub use entity::{Entity, LinkEnds};
pub use kind::{Kind, Location};
pub use mixin::{Mixin, MixinFilter, MixinSet};

/// Joins a category scheme and term into its type identifier
pub fn type_identifier(scheme: &str, term: &str) -> String {
    format!("{}{}", scheme, term)
}
