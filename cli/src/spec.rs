//! Declarative loading of a [`TaskGroup`] from a JSON/YAML/TOML file: a flat
//! list of entry keys, a root, and an edge list in `to depends on from`
//! order.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use taskgraph_core::dag::{Entry, TaskGroup, TerminationStrategy};

use crate::work::EchoItem;

#[derive(Debug, Deserialize)]
pub struct GraphSpec {
    pub root: String,
    #[serde(default)]
    pub entries: Vec<String>,
    #[serde(default)]
    pub edges: Vec<(String, String)>,
    #[serde(default)]
    pub termination_strategy: TerminationStrategy,
}

impl GraphSpec {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading graph spec {}", path.display()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => {
                Ok(serde_yaml::from_str(&raw).context("parsing graph spec as YAML")?)
            }
            Some("toml") => Ok(toml::from_str(&raw).context("parsing graph spec as TOML")?),
            Some("json") | None => {
                Ok(serde_json::from_str(&raw).context("parsing graph spec as JSON")?)
            }
            Some(other) => bail!("unsupported graph spec extension: {other}"),
        }
    }

    /// Build a `TaskGroup` from this spec, wiring every entry to an
    /// [`EchoItem`].
    pub fn into_task_group(self) -> Result<TaskGroup<String>> {
        let group = TaskGroup::new(
            self.root.clone(),
            std::sync::Arc::new(EchoItem::new(self.root.clone())),
            self.termination_strategy,
        );
        for key in &self.entries {
            if key == &self.root {
                continue;
            }
            group.add_entry(Entry::new(key, std::sync::Arc::new(EchoItem::new(key))))?;
        }
        for (from, to) in &self.edges {
            group.add_edge(from, to)?;
        }
        Ok(group)
    }
}
