//! Query interface: kinds and mixins

use colored::Colorize;
use infragate_core::BackendProxy;

pub fn kinds(proxy: &BackendProxy) -> anyhow::Result<()> {
    println!(
        "{}",
        format!("{:<18} {:<10} {}", "KIND", "LOCATION", "ACTIONS").bold()
    );

    for kind in proxy.served_kinds() {
        let location = if kind.is_link() { "link" } else { "resource" };
        let actions: Vec<&str> = kind
            .actions
            .iter()
            .map(|a| a.rsplit_once('#').map(|(_, term)| term).unwrap_or(a))
            .collect();
        println!(
            "{:<18} {:<10} {}",
            kind.term.cyan(),
            location,
            actions.join(", ").dimmed()
        );
    }
    Ok(())
}

pub fn mixins(proxy: &BackendProxy, related_to: Option<&str>) -> anyhow::Result<()> {
    let catalog = proxy.catalog();
    let mixins: Vec<_> = match related_to {
        Some(name) => {
            let base = super::resolve_mixin(catalog, name)?.type_identifier();
            catalog
                .mixins()
                .filter(|m| m.type_identifier() != base && m.is_related_to(&base))
                .collect()
        }
        None => catalog.mixins().collect(),
    };

    println!("{}", format!("{:<60} {}", "MIXIN", "TITLE").bold());
    for mixin in mixins {
        println!("{:<60} {}", mixin.type_identifier(), mixin.title.dimmed());
    }
    Ok(())
}
