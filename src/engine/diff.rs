//! Minimal differences between a stored record and a freshly normalized one.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::engine::patch::Patch;
use crate::engine::types::{CountedItem, ManifestItem, Reward, RewardTier};

/// Outcome of comparing an optional list-shaped field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDiff<T> {
    /// Nothing to write.
    Unchanged,
    /// The field disappeared and must be removed.
    Delete,
    /// Replace the field with this value.
    Set(T),
}

impl<T: Serialize> FieldDiff<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, FieldDiff::Unchanged)
    }

    /// Writes this outcome into `patch` under `field`.
    pub fn record_into(&self, patch: &mut Patch, field: &str) -> Result<()> {
        match self {
            FieldDiff::Unchanged => {}
            FieldDiff::Delete => patch.delete(field),
            FieldDiff::Set(v) => patch.set_serialized(field, v)?,
        }
        Ok(())
    }
}

fn present(v: Option<&Value>) -> Option<&Value> {
    v.filter(|v| !v.is_null())
}

/// Scalar diff over `fields` of two JSON objects.
///
/// Missing and `null` compare equal. A field present in `first` but absent in
/// `second` is emitted as a deletion.
pub fn value_difference(first: &Value, second: &Value, fields: &[&str]) -> Patch {
    let mut patch = Patch::new();

    for &field in fields {
        let old = present(first.get(field));
        let new = present(second.get(field));
        if old == new {
            continue;
        }
        match new {
            Some(v) => patch.set(field, v.clone()),
            None => patch.delete(field),
        }
    }

    patch
}

/// [`value_difference`] over typed records.
pub fn record_difference<R: Serialize>(first: &R, second: &R, fields: &[&str]) -> Result<Patch> {
    let a = serde_json::to_value(first).context("serialize stored record")?;
    let b = serde_json::to_value(second).context("serialize candidate record")?;
    Ok(value_difference(&a, &b, fields))
}

/// Shared list rule: unchanged when lengths match and every pair is `same`.
pub fn diff_list<T, F>(first: Option<&[T]>, second: Option<&[T]>, same: F) -> FieldDiff<Vec<T>>
where
    T: Clone,
    F: Fn(&T, &T) -> bool,
{
    match (first, second) {
        (None, None) => FieldDiff::Unchanged,
        (Some(_), None) => FieldDiff::Delete,
        (None, Some(new)) => FieldDiff::Set(new.to_vec()),
        (Some(old), Some(new)) => {
            if old.len() == new.len() && old.iter().zip(new).all(|(a, b)| same(a, b)) {
                FieldDiff::Unchanged
            } else {
                FieldDiff::Set(new.to_vec())
            }
        }
    }
}

pub fn diff_items(first: Option<&[String]>, second: Option<&[String]>) -> FieldDiff<Vec<String>> {
    diff_list(first, second, |a, b| a == b)
}

pub fn diff_counted_items(
    first: Option<&[CountedItem]>,
    second: Option<&[CountedItem]>,
) -> FieldDiff<Vec<CountedItem>> {
    diff_list(first, second, |a, b| a.name == b.name && a.count == b.count)
}

/// Trader stock; prices are significant, ordering too.
pub fn diff_manifest(
    first: Option<&[ManifestItem]>,
    second: Option<&[ManifestItem]>,
) -> FieldDiff<Vec<ManifestItem>> {
    diff_list(first, second, |a, b| {
        a.name == b.name && a.ducats == b.ducats && a.credits == b.credits
    })
}

fn same_reward(a: &Reward, b: &Reward) -> bool {
    a.name == b.name && a.kind == b.kind && a.count == b.count && a.chance == b.chance
}

/// Reward tables are compared tier by tier, reward by reward. Any mismatch
/// replaces the whole table.
pub fn diff_reward_tables(
    first: Option<&[RewardTier]>,
    second: Option<&[RewardTier]>,
) -> FieldDiff<Vec<RewardTier>> {
    diff_list(first, second, |a, b| {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_reward(x, y))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIELDS: &[&str] = &["location", "end", "faction"];

    #[test]
    fn identical_records_produce_empty_patch() {
        let rec = json!({"location": "Mars", "end": 100, "faction": "Grineer"});
        assert!(value_difference(&rec, &rec.clone(), FIELDS).is_empty());
    }

    #[test]
    fn single_changed_field_is_the_only_output() {
        let a = json!({"location": "Mars", "end": 100, "faction": "Grineer"});
        let b = json!({"location": "Mars", "end": 160, "faction": "Grineer"});

        let patch = value_difference(&a, &b, FIELDS);
        assert_eq!(patch.fields.len(), 1);
        assert_eq!(patch.fields["end"], Some(json!(160)));
    }

    #[test]
    fn missing_and_null_are_equal_and_removal_deletes() {
        let a = json!({"location": "Mars", "faction": null});
        let b = json!({"end": null});

        let patch = value_difference(&a, &b, FIELDS);
        assert_eq!(patch.fields.len(), 1);
        assert_eq!(patch.fields["location"], None);
    }

    #[test]
    fn fields_outside_the_list_are_ignored() {
        let a = json!({"location": "Mars", "score": 1});
        let b = json!({"location": "Mars", "score": 2});
        assert!(value_difference(&a, &b, FIELDS).is_empty());
    }

    #[test]
    fn list_rules() {
        let a = vec!["x".to_string()];
        let b = vec!["x".to_string(), "y".to_string()];

        assert_eq!(diff_items(Some(a.as_slice()), Some(a.as_slice())), FieldDiff::Unchanged);
        assert_eq!(diff_items(Some(a.as_slice()), None), FieldDiff::Delete);
        assert_eq!(diff_items(None, Some(a.as_slice())), FieldDiff::Set(a.clone()));
        assert_eq!(diff_items(Some(a.as_slice()), Some(b.as_slice())), FieldDiff::Set(b.clone()));
        assert_eq!(diff_items(None, None), FieldDiff::Unchanged);
    }

    #[test]
    fn counted_items_compare_name_and_count() {
        let a = vec![CountedItem { name: "Orokin Cell".into(), count: 1 }];
        let b = vec![CountedItem { name: "Orokin Cell".into(), count: 2 }];
        assert_eq!(diff_counted_items(Some(a.as_slice()), Some(b.as_slice())), FieldDiff::Set(b.clone()));
    }

    #[test]
    fn manifest_price_change_replaces_list() {
        let a = vec![ManifestItem { name: "Primed Flow".into(), ducats: 350, credits: 110_000 }];
        let mut b = a.clone();
        assert!(diff_manifest(Some(a.as_slice()), Some(b.as_slice())).is_unchanged());

        b[0].ducats = 400;
        assert_eq!(diff_manifest(Some(a.as_slice()), Some(b.as_slice())), FieldDiff::Set(b.clone()));
    }

    fn reward(name: &str, chance: f64) -> Reward {
        Reward { name: name.into(), kind: "item".into(), count: 1, chance }
    }

    #[test]
    fn reward_tables_recurse_and_replace_wholesale() {
        let a = vec![vec![reward("A", 0.5), reward("B", 0.5)], vec![reward("C", 1.0)]];
        assert!(diff_reward_tables(Some(a.as_slice()), Some(a.as_slice())).is_unchanged());

        let mut tweaked = a.clone();
        tweaked[1][0].chance = 0.9;
        assert_eq!(diff_reward_tables(Some(a.as_slice()), Some(tweaked.as_slice())), FieldDiff::Set(tweaked.clone()));

        let mut fewer = a.clone();
        fewer[0].pop();
        assert_eq!(diff_reward_tables(Some(a.as_slice()), Some(fewer.as_slice())), FieldDiff::Set(fewer.clone()));

        let one_tier = vec![a[0].clone()];
        assert_eq!(diff_reward_tables(Some(a.as_slice()), Some(one_tier.as_slice())), FieldDiff::Set(one_tier.clone()));
    }

    #[test]
    fn field_diff_writes_into_patch() {
        let mut patch = Patch::within("rewards");
        FieldDiff::<Vec<String>>::Delete.record_into(&mut patch, "items").unwrap();
        FieldDiff::Set(vec!["x".to_string()]).record_into(&mut patch, "more").unwrap();
        FieldDiff::<Vec<String>>::Unchanged.record_into(&mut patch, "none").unwrap();

        assert_eq!(patch.fields["items"], None);
        assert_eq!(patch.fields["more"], Some(json!(["x"])));
        assert!(!patch.fields.contains_key("none"));
    }
}
