//! Line codec for table logs and load-time replay of the temp log.
//!
//! Every line is `id '\t' JSON '\n'`. In the temp log the first line for an id
//! is the full record and every later line for it is a [`Patch`].

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::engine::patch::{apply_patch, Patch};

pub fn encode_line(id: &str, value: &Value) -> Result<String> {
    let json = serde_json::to_string(value).with_context(|| format!("encode line for {id}"))?;
    Ok(format!("{id}\t{json}\n"))
}

/// Result of replaying a temp log.
#[derive(Debug, Default)]
pub struct Replayed {
    pub records: BTreeMap<String, Map<String, Value>>,
    pub patches: usize,
    pub skipped: usize,
}

/// Rebuilds the active records from temp log `text`.
///
/// Malformed lines are logged and skipped.
pub fn replay(table: &str, text: &str) -> Replayed {
    let mut out = Replayed::default();

    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let Some((id, json)) = line.split_once('\t') else {
            log::error!("[STORE] {table}: line {} has no id separator", lineno + 1);
            out.skipped += 1;
            continue;
        };

        let obj = match serde_json::from_str::<Value>(json) {
            Ok(Value::Object(obj)) => obj,
            Ok(_) => {
                log::error!("[STORE] {table}: line {} is not an object", lineno + 1);
                out.skipped += 1;
                continue;
            }
            Err(err) => {
                log::error!("[STORE] {table}: line {} unparseable: {err}", lineno + 1);
                out.skipped += 1;
                continue;
            }
        };

        match out.records.get_mut(id) {
            Some(record) => {
                apply_patch(record, &Patch::from_json(obj));
                out.patches += 1;
            }
            None => {
                out.records.insert(id.to_string(), obj);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_line_is_record_later_lines_patch() {
        let text = concat!(
            "a\t{\"end\":10,\"rewards\":{\"credits\":5,\"items\":[]}}\n",
            "b\t{\"end\":20}\n",
            "a\t{\"end\":15}\n",
            "a\t{\"__context\":\"rewards\",\"items\":null,\"credits\":7}\n",
        );

        let out = replay("alerts", text);
        assert_eq!(out.patches, 2);
        assert_eq!(
            Value::Object(out.records["a"].clone()),
            json!({"end": 15, "rewards": {"credits": 7}})
        );
        assert_eq!(Value::Object(out.records["b"].clone()), json!({"end": 20}));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let text = "a\t{\"end\":1}\nnot a line\nb\t{broken\nc\t[1,2]\n\nd\t{\"end\":4}\n";
        let out = replay("alerts", text);

        assert_eq!(out.skipped, 3);
        assert_eq!(out.records.len(), 2);
        assert!(out.records.contains_key("d"));
    }

    #[test]
    fn encoded_lines_replay() {
        let line = encode_line("x", &json!({"v": 1})).unwrap();
        assert_eq!(line, "x\t{\"v\":1}\n");
        assert_eq!(replay("t", &line).records.len(), 1);
    }
}
