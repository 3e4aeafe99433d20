//! Create, delete and update

use colored::Colorize;
use infragate_core::{BackendProxy, Entity, Identifier, RequestContext};

pub async fn create(
    proxy: &BackendProxy,
    kind: &str,
    entity: Entity,
    cx: &RequestContext,
) -> anyhow::Result<()> {
    let id = proxy.create(kind, &entity, cx).await?;
    println!("{}", id);
    Ok(())
}

pub async fn delete(
    proxy: &BackendProxy,
    kind: &str,
    id: Option<&str>,
    mixins: &[String],
    cx: &RequestContext,
) -> anyhow::Result<()> {
    match id {
        Some(id) => {
            proxy.delete(kind, &Identifier::new(id), cx).await?;
            eprintln!("{}", format!("✓ Deleted {}", id).green());
        }
        None => {
            let filter = super::mixin_filter(proxy.catalog(), mixins)?;
            proxy.delete_all(kind, &filter, cx).await?;
            eprintln!("{}", format!("✓ Deleted all {}", kind).green());
        }
    }
    Ok(())
}

/// Full update: the stored entity is replaced by `entity`
pub async fn replace(
    proxy: &BackendProxy,
    kind: &str,
    id: &str,
    mut entity: Entity,
    cx: &RequestContext,
) -> anyhow::Result<()> {
    entity.id = Some(Identifier::new(id));
    let updated = proxy.update(kind, &entity, cx).await?;
    super::print_json(&updated)
}

/// Partial update: attaches catalog mixins
pub async fn attach(
    proxy: &BackendProxy,
    kind: &str,
    id: &str,
    names: &[String],
    cx: &RequestContext,
) -> anyhow::Result<()> {
    let mixins = names
        .iter()
        .map(|name| super::resolve_mixin(proxy.catalog(), name).cloned())
        .collect::<anyhow::Result<Vec<_>>>()?;

    let updated = proxy
        .partial_update(kind, &Identifier::new(id), &mixins, cx)
        .await?;
    super::print_json(&updated)
}
