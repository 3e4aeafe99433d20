use infragate_core::{BackendProxy, Identifier, RequestContext};

pub async fn ids(
    proxy: &BackendProxy,
    kind: &str,
    mixins: &[String],
    cx: &RequestContext,
) -> anyhow::Result<()> {
    let filter = super::mixin_filter(proxy.catalog(), mixins)?;
    for id in proxy.identifiers(kind, &filter, cx).await? {
        println!("{}", id);
    }
    Ok(())
}

pub async fn list(
    proxy: &BackendProxy,
    kind: &str,
    mixins: &[String],
    cx: &RequestContext,
) -> anyhow::Result<()> {
    let filter = super::mixin_filter(proxy.catalog(), mixins)?;
    let entities = proxy.list(kind, &filter, cx).await?;
    super::print_json(&entities)
}

pub async fn show(
    proxy: &BackendProxy,
    kind: &str,
    id: &str,
    cx: &RequestContext,
) -> anyhow::Result<()> {
    let entity = proxy.instance(kind, &Identifier::new(id), cx).await?;
    super::print_json(&entity)
}
