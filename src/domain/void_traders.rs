//! Travelling traders and their stock.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::wire;
use crate::engine::diff::diff_manifest;
use crate::engine::patch::Patch;
use crate::engine::record_difference;
use crate::engine::types::ManifestItem;
use crate::reconcile::{Category, PassContext};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoidTrader {
    pub start: i64,
    pub end: i64,
    pub character: String,
    pub location: String,
    /// Absent until the trader arrives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Vec<ManifestItem>>,
}

#[derive(Debug, Default)]
pub struct VoidTraders;

const FIELDS: &[&str] = &["start", "end", "character", "location"];

impl Category for VoidTraders {
    type Record = VoidTrader;

    fn name(&self) -> &str {
        "void_traders"
    }

    fn entries<'a>(&self, snapshot: &'a Value) -> Vec<&'a Value> {
        wire::array(snapshot, "VoidTraders")
    }

    fn id(&self, raw: &Value) -> Option<String> {
        wire::oid(raw)
    }

    fn normalize(&self, raw: &Value, ctx: &mut PassContext) -> Result<VoidTrader> {
        let vocab = &ctx.vocabulary;
        let manifest = raw.get("Manifest").and_then(Value::as_array).map(|list| {
            list.iter()
                .filter_map(|item| {
                    Some(ManifestItem {
                        name: vocab.item(wire::str_field(item, "ItemType")?).to_string(),
                        ducats: wire::u32_field(item, "PrimePrice"),
                        credits: wire::u32_field(item, "RegularPrice"),
                    })
                })
                .collect()
        });

        Ok(VoidTrader {
            start: wire::date_field(raw, "Activation").context("trader without Activation")?,
            end: wire::date_field(raw, "Expiry").context("trader without Expiry")?,
            character: wire::str_field(raw, "Character").unwrap_or_default().to_string(),
            location: vocab.node(wire::str_field(raw, "Node").unwrap_or_default()).to_string(),
            manifest,
        })
    }

    fn is_active(&self, record: &VoidTrader, now: i64) -> bool {
        record.end >= now
    }

    fn diff_fields(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn diff(&self, stored: &VoidTrader, fresh: &VoidTrader) -> Result<Vec<Patch>> {
        let mut diff = record_difference(stored, fresh, FIELDS)?;
        diff_manifest(stored.manifest.as_deref(), fresh.manifest.as_deref())
            .record_into(&mut diff, "manifest")?;
        Ok(vec![diff])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vocabulary::Vocabulary;
    use crate::engine::patch::patch;
    use serde_json::json;
    use std::sync::Arc;

    fn raw(manifest: Value) -> Value {
        json!({
            "_id": {"$oid": "baro"},
            "Activation": {"$date": {"$numberLong": "1000000"}},
            "Expiry": {"$date": {"$numberLong": "2000000"}},
            "Character": "Baro'Ki Teel",
            "Node": "PlutoHUB",
            "Manifest": manifest
        })
    }

    #[test]
    fn arrival_sets_manifest_and_price_change_replaces_it() {
        let mut ctx = PassContext::new(1500, Arc::new(Vocabulary::default()));
        let mut empty = raw(Value::Null);
        empty.as_object_mut().unwrap().remove("Manifest");

        let mut stored = VoidTraders.normalize(&empty, &mut ctx).unwrap();
        assert_eq!(stored.manifest, None);

        let arrived = VoidTraders
            .normalize(&raw(json!([{"ItemType": "/Flow", "PrimePrice": 350, "RegularPrice": 110000}])), &mut ctx)
            .unwrap();
        let diffs = VoidTraders.diff(&stored, &arrived).unwrap();
        assert_eq!(diffs[0].fields.keys().collect::<Vec<_>>(), vec!["manifest"]);
        patch(&mut stored, &diffs[0]).unwrap();
        assert_eq!(stored, arrived);

        let repriced = VoidTraders
            .normalize(&raw(json!([{"ItemType": "/Flow", "PrimePrice": 400, "RegularPrice": 110000}])), &mut ctx)
            .unwrap();
        let diffs = VoidTraders.diff(&stored, &repriced).unwrap();
        assert_eq!(diffs[0].fields["manifest"].as_ref().unwrap()[0]["ducats"], json!(400));
        assert!(VoidTraders.diff(&repriced, &repriced).unwrap()[0].is_empty());
    }
}
