//! Model-name resolution against the backend's installed-model catalog.
//!
//! Matching is intentionally loose: `llama2` matches `llama2:latest` exactly,
//! and any installed tag of the same family (`llama2:7b`, `llama2:13b`) by
//! prefix. A tagged request such as `llama2:7b` is satisfied by any installed
//! `llama2:*` entry as well.

use serde::Deserialize;

pub const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: String,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            model: name.clone(),
            name,
        }
    }
}

pub fn normalize(model: &str) -> String {
    let lower = model.trim().to_lowercase();
    if lower.contains(':') {
        lower
    } else {
        format!("{lower}:{DEFAULT_TAG}")
    }
}

pub fn exists(model: &str, catalog: &[CatalogEntry]) -> bool {
    let normalized = normalize(model);
    let family = normalized.split(':').next().unwrap_or_default();
    let prefix = format!("{family}:");

    catalog.iter().any(|entry| {
        let full = entry.name.to_lowercase();
        let base = entry.model.to_lowercase();
        full == normalized
            || base == normalized
            || full.starts_with(&prefix)
            || base.starts_with(&prefix)
    })
}
