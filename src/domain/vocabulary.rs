//! Read-only lookup tables used while normalizing entries.
//!
//! Loaded once and shared by `Arc`; a reload builds a new value and swaps it
//! in whole. Missing keys fall back to the raw key.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::engine::types::RewardTier;

/// Outcome of a vocabulary lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Found(&'a str),
    /// The key itself, unresolved.
    Passthrough(&'a str),
}

impl<'a> Lookup<'a> {
    pub fn as_str(&self) -> &'a str {
        match *self {
            Lookup::Found(s) | Lookup::Passthrough(s) => s,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

impl std::fmt::Display for Lookup<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub nodes: BTreeMap<String, String>,
    pub factions: BTreeMap<String, String>,
    pub mission_types: BTreeMap<String, String>,
    pub syndicates: BTreeMap<String, String>,
    pub items: BTreeMap<String, String>,
    pub reward_tables: BTreeMap<String, Vec<RewardTier>>,
}

fn lookup<'a>(table: &'a BTreeMap<String, String>, key: &'a str) -> Lookup<'a> {
    match table.get(key) {
        Some(v) => Lookup::Found(v),
        None => Lookup::Passthrough(key),
    }
}

impl Vocabulary {
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read vocabulary {}", path.display()))?;
        let vocabulary: Self = serde_json::from_str(&text)
            .with_context(|| format!("parse vocabulary {}", path.display()))?;
        log::info!(
            "[VOCAB] loaded {} nodes, {} items, {} reward tables",
            vocabulary.nodes.len(),
            vocabulary.items.len(),
            vocabulary.reward_tables.len()
        );
        Ok(vocabulary)
    }

    pub fn node<'a>(&'a self, key: &'a str) -> Lookup<'a> {
        lookup(&self.nodes, key)
    }

    pub fn faction<'a>(&'a self, key: &'a str) -> Lookup<'a> {
        lookup(&self.factions, key)
    }

    pub fn mission_type<'a>(&'a self, key: &'a str) -> Lookup<'a> {
        lookup(&self.mission_types, key)
    }

    pub fn syndicate<'a>(&'a self, key: &'a str) -> Lookup<'a> {
        lookup(&self.syndicates, key)
    }

    pub fn item<'a>(&'a self, key: &'a str) -> Lookup<'a> {
        lookup(&self.items, key)
    }

    pub fn reward_table(&self, key: &str) -> Option<&[RewardTier]> {
        self.reward_tables.get(key).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_pass_through() {
        let mut v = Vocabulary::default();
        v.nodes.insert("SolNode1".into(), "Galatea (Neptune)".into());

        assert_eq!(v.node("SolNode1"), Lookup::Found("Galatea (Neptune)"));
        assert_eq!(v.node("SolNode2"), Lookup::Passthrough("SolNode2"));
        assert_eq!(v.node("SolNode2").to_string(), "SolNode2");
        assert!(!v.faction("FC_GRINEER").is_found());
    }

    #[tokio::test]
    async fn loads_partial_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vocab.json");
        std::fs::write(
            &path,
            r#"{"factions": {"FC_GRINEER": "Grineer"},
                "reward_tables": {"/T": [[{"name": "A", "type": "item", "count": 1, "chance": 0.5}]]}}"#,
        )
        .unwrap();

        let v = Vocabulary::load(&path).await.unwrap();
        assert_eq!(v.faction("FC_GRINEER").as_str(), "Grineer");
        assert_eq!(v.reward_table("/T").map(<[RewardTier]>::len), Some(1));
        assert!(v.nodes.is_empty());
    }
}
