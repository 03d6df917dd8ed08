use serde::{Deserialize, Serialize};

/// A stackable reward, e.g. "3x Orokin Cell".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountedItem {
    pub name: String,
    pub count: u32,
}

/// One entry of a trader's stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestItem {
    pub name: String,
    pub ducats: u32,
    pub credits: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub count: u32,
    pub chance: f64,
}

/// A reward rotation: one tier of a drop table.
pub type RewardTier = Vec<Reward>;
