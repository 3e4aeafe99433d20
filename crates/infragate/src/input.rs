//! Entity input for create and update

use anyhow::Context;
use infragate_core::Entity;
use std::path::Path;

/// Parses an entity from `file` or from inline `json`
pub fn read_entity(file: Option<&Path>, json: Option<&str>) -> anyhow::Result<Entity> {
    let (content, origin) = match (file, json) {
        (Some(path), _) => (
            std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?,
            path.display().to_string(),
        ),
        (None, Some(json)) => (json.to_string(), "--json".to_string()),
        (None, None) => anyhow::bail!("an entity is required: pass --file or --json"),
    };

    serde_json::from_str(&content).with_context(|| format!("parsing entity from {}", origin))
}
