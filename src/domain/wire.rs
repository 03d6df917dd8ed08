//! Helpers for the snapshot's loosely typed JSON dialect.
//!
//! Ids arrive as `{"$oid": "..."}` (sometimes `{"$id": ...}` or a bare
//! string) and dates as `{"$date": {"$numberLong": "<ms>"}}`, `{"$date": <ms>}`
//! or plain seconds.

use serde_json::Value;

use crate::engine::types::CountedItem;

pub fn oid(raw: &Value) -> Option<String> {
    let id = raw.get("_id")?;
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj
            .get("$oid")
            .or_else(|| obj.get("$id"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn number(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// A date in seconds.
pub fn date(v: &Value) -> Option<i64> {
    match v.get("$date") {
        Some(inner) => {
            let ms = match inner.get("$numberLong") {
                Some(n) => number(n)?,
                None => number(inner)?,
            };
            Some(ms / 1000)
        }
        None => number(v),
    }
}

pub fn date_field(raw: &Value, key: &str) -> Option<i64> {
    raw.get(key).and_then(date)
}

pub fn str_field<'a>(raw: &'a Value, key: &str) -> Option<&'a str> {
    raw.get(key).and_then(Value::as_str)
}

pub fn u32_field(raw: &Value, key: &str) -> u32 {
    raw.get(key)
        .and_then(number)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

pub fn f64_field(raw: &Value, key: &str) -> Option<f64> {
    raw.get(key).and_then(Value::as_f64)
}

pub fn array<'a>(raw: &'a Value, key: &str) -> Vec<&'a Value> {
    raw.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter().collect())
        .unwrap_or_default()
}

/// `[{"ItemType": ..., "ItemCount": n}]`, names resolved by `name`.
pub fn counted_items<F>(raw: Option<&Value>, name: F) -> Option<Vec<CountedItem>>
where
    F: Fn(&str) -> String,
{
    let list = raw?.as_array()?;
    Some(
        list.iter()
            .filter_map(|item| {
                let kind = str_field(item, "ItemType")?;
                Some(CountedItem {
                    name: name(kind),
                    count: u32_field(item, "ItemCount").max(1),
                })
            })
            .collect(),
    )
}
