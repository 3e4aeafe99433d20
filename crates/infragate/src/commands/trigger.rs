//! Action triggering

use colored::Colorize;
use infragate_core::{ActionInstance, BackendProxy, Identifier, Kind, RequestContext};
use serde_json::Value;

pub struct TriggerRequest<'a> {
    pub kind: &'a str,
    pub action: &'a str,
    /// `None` addresses the whole (filtered) collection
    pub id: Option<&'a str>,
    pub mixins: &'a [String],
    pub attributes: &'a [String],
}

/// Finds the action type identifier among those the kind declares
fn resolve_action(kind: &Kind, name: &str) -> anyhow::Result<String> {
    if name.contains('#') {
        return Ok(name.to_string());
    }
    kind.actions
        .iter()
        .find(|a| a.rsplit_once('#').map(|(_, term)| term) == Some(name))
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("{} has no action '{}'", kind.term, name))
}

/// `key=value`; the value is taken as JSON when it parses, as a string otherwise
fn parse_attribute(raw: &str) -> anyhow::Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("action attribute '{}' is not key=value", raw))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub async fn handle(
    proxy: &BackendProxy,
    request: TriggerRequest<'_>,
    cx: &RequestContext,
) -> anyhow::Result<()> {
    let kind = proxy.registry().resolve(request.kind)?;
    let mut action = ActionInstance::new(resolve_action(kind, request.action)?);
    for raw in request.attributes {
        let (key, value) = parse_attribute(raw)?;
        action = action.with_attribute(key, value);
    }

    match request.id {
        Some(id) => {
            proxy
                .trigger(request.kind, &Identifier::new(id), &action, cx)
                .await?
        }
        None => {
            let filter = super::mixin_filter(proxy.catalog(), request.mixins)?;
            proxy
                .trigger_all(request.kind, &filter, &action, cx)
                .await?
        }
    }

    eprintln!("{}", format!("✓ Triggered {}", action.term()).green());
    Ok(())
}
