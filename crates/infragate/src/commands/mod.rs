pub mod catalog;
pub mod mutate;
pub mod query;
pub mod trigger;

use infragate_core::{Catalog, Mixin, MixinFilter};

/// Looks a mixin up by type identifier, or by term when that is unambiguous
pub fn resolve_mixin<'a>(catalog: &'a Catalog, name: &str) -> anyhow::Result<&'a Mixin> {
    if let Some(mixin) = catalog.mixin(name) {
        return Ok(mixin);
    }

    let mut by_term = catalog.mixins().filter(|m| m.term == name);
    match (by_term.next(), by_term.next()) {
        (Some(mixin), None) => Ok(mixin),
        (Some(_), Some(_)) => anyhow::bail!(
            "mixin term '{}' is ambiguous, use the full type identifier",
            name
        ),
        (None, _) => anyhow::bail!("unknown mixin '{}'", name),
    }
}

pub fn mixin_filter(catalog: &Catalog, names: &[String]) -> anyhow::Result<MixinFilter> {
    names
        .iter()
        .map(|name| resolve_mixin(catalog, name).map(|m| m.type_identifier()))
        .collect()
}

pub fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
