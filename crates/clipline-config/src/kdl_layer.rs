//! Flattens a pipeline-defaults KDL document into a raw key/value layer the
//! resolver can merge.

use std::collections::BTreeMap;

use kdl::{KdlDocument, KdlValue};

use crate::error::ConfigResult;

fn kdl_value_to_json(value: &KdlValue) -> serde_json::Value {
    if let Some(s) = value.as_string() {
        serde_json::Value::String(s.to_string())
    } else if let Some(b) = value.as_bool() {
        serde_json::Value::Bool(b)
    } else if let Some(i) = value.as_integer() {
        serde_json::Value::Number(i.into())
    } else if let Some(f) = value.as_float() {
        serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    } else {
        serde_json::Value::Null
    }
}

/// Parse a KDL document of top-level `key-name value` nodes into a flat map.
/// A node with more than one positional argument is collected into a JSON
/// array; a node with children instead of arguments (e.g. nested tables for
/// per-framework cache roots) is flattened with `.`-joined dotted keys.
pub fn parse_defaults(kdl_text: &str) -> ConfigResult<BTreeMap<String, serde_json::Value>> {
    let doc: KdlDocument = kdl_text.parse()?;
    let mut out = BTreeMap::new();
    flatten_document(&doc, "", &mut out);
    Ok(out)
}

fn flatten_document(doc: &KdlDocument, prefix: &str, out: &mut BTreeMap<String, serde_json::Value>) {
    for node in doc.nodes() {
        let key = if prefix.is_empty() {
            node.name().value().to_string()
        } else {
            format!("{prefix}.{}", node.name().value())
        };

        if let Some(children) = node.children() {
            flatten_document(children, &key, out);
            continue;
        }

        let args: Vec<serde_json::Value> = node
            .entries()
            .iter()
            .filter(|e| e.name().is_none())
            .map(|e| kdl_value_to_json(e.value()))
            .collect();

        let value = match args.len() {
            0 => continue,
            1 => args.into_iter().next().unwrap(),
            _ => serde_json::Value::Array(args),
        };

        out.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_flat_keys() {
        let doc = r#"
            asr-model "large-v3"
            asr-beam-width 5
            diarization-enabled #true
        "#;
        let map = parse_defaults(doc).unwrap();
        assert_eq!(map["asr-model"], serde_json::json!("large-v3"));
        assert_eq!(map["asr-beam-width"], serde_json::json!(5));
        assert_eq!(map["diarization-enabled"], serde_json::json!(true));
    }

    #[test]
    fn flattens_nested_cache_roots() {
        let doc = r#"
            cache-roots {
                whisperx "/cache/whisperx"
                mlx "/cache/mlx"
            }
        "#;
        let map = parse_defaults(doc).unwrap();
        assert_eq!(
            map["cache-roots.whisperx"],
            serde_json::json!("/cache/whisperx")
        );
    }
}
