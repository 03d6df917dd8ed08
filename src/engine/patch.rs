//! Partial record updates.
//!
//! A [`Patch`] names only the fields that changed. A field mapped to `None`
//! is deleted. A patch with a `context` applies to the nested object stored
//! under that field rather than to the record itself.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Sentinel key marking a nested patch in the temp log.
pub const CONTEXT_KEY: &str = "__context";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub context: Option<String>,
    pub fields: BTreeMap<String, Option<Value>>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A patch that targets the nested object under `field`.
    pub fn within(field: impl Into<String>) -> Self {
        Self {
            context: Some(field.into()),
            fields: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), Some(value));
    }

    pub fn delete(&mut self, field: impl Into<String>) {
        self.fields.insert(field.into(), None);
    }

    /// Serializes `value` into the patch; a serialization failure is reported.
    pub fn set_serialized<T: Serialize>(&mut self, field: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)
            .with_context(|| format!("serialize patch field {field}"))?;
        self.set(field, value);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Line payload for the temp log. Deletions are written as `null`.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        if let Some(ctx) = &self.context {
            obj.insert(CONTEXT_KEY.to_string(), Value::String(ctx.clone()));
        }
        for (k, v) in &self.fields {
            obj.insert(k.clone(), v.clone().unwrap_or(Value::Null));
        }
        Value::Object(obj)
    }

    /// Inverse of [`Patch::to_json`].
    pub fn from_json(mut obj: Map<String, Value>) -> Self {
        let context = match obj.remove(CONTEXT_KEY) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };
        let fields = obj
            .into_iter()
            .map(|(k, v)| (k, if v.is_null() { None } else { Some(v) }))
            .collect();

        Self { context, fields }
    }
}

/// Applies `patch` to a JSON object in place.
///
/// A contextual patch creates the nested object if it is missing.
pub fn apply_patch(target: &mut Map<String, Value>, patch: &Patch) {
    let target = match &patch.context {
        None => target,
        Some(ctx) => {
            let nested = target
                .entry(ctx.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !nested.is_object() {
                *nested = Value::Object(Map::new());
            }
            match nested.as_object_mut() {
                Some(obj) => obj,
                None => return,
            }
        }
    };

    for (key, value) in &patch.fields {
        match value {
            Some(v) => {
                target.insert(key.clone(), v.clone());
            }
            None => {
                target.remove(key);
            }
        }
    }
}

/// Applies `diff` to a typed record. Idempotent.
pub fn patch<R>(record: &mut R, diff: &Patch) -> Result<()>
where
    R: Serialize + DeserializeOwned,
{
    let mut value = serde_json::to_value(&*record).context("serialize record for patch")?;
    let Some(obj) = value.as_object_mut() else {
        anyhow::bail!("record is not a JSON object");
    };

    apply_patch(obj, diff);
    *record = serde_json::from_value(value).context("rebuild record after patch")?;
    Ok(())
}
