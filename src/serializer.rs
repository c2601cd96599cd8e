#[allow(unused_imports)]
use log::info;

use crate::error::{Kind, Result};
use crate::kinded_err;
use crate::node::Node;

/// Recursively strips book-keeping (source spans already gone by this
/// point) and resolves any remaining alias markers into owned copies,
/// producing a tree ready for any output format (spec.md §4.G, grounded on
/// `original_source/yamlpp/util.py: flatten`). Unlike the original, this
/// detects cycles and raises `ValidationError` rather than recursing
/// forever (spec.md §9 — a supplement over the original, which has no
/// guard here).
pub fn flatten(node: &Node) -> Result<Node> {
    flatten_inner(node, 0)
}

const MAX_DEPTH: usize = 256;

fn flatten_inner(node: &Node, depth: usize) -> Result<Node> {
    if depth > MAX_DEPTH {
        return Err(kinded_err!(
            Kind::ValidationError,
            "cycle detected while flattening output tree"
        )
        .into());
    }
    Ok(match node {
        Node::Sequence(items) => Node::Sequence(
            items
                .iter()
                .map(|v| flatten_inner(&v.value, depth + 1).map(|n| n.unspanned()))
                .collect::<Result<Vec<_>>>()?,
        ),
        Node::Mapping(map) => {
            let mut out = indexmap::IndexMap::new();
            for (k, v) in map {
                out.insert(k.clone(), flatten_inner(&v.value, depth + 1)?.unspanned());
            }
            Node::Mapping(out)
        }
        other => other.clone(),
    })
}

/// YAML output (spec.md §4.G), hand-written over the flattened tree.
/// `Node` carries no anchor/alias marker (aliases are already resolved to
/// owned values by the Loader, DESIGN.md Open Question #6), so formerly
/// shared content is re-emitted in full rather than as `&a`/`*a`.
pub fn to_yaml(node: &Node) -> String {
    let mut out = String::new();
    write_yaml(node, 0, &mut out);
    out
}

fn write_yaml(node: &Node, indent: usize, out: &mut String) {
    match node {
        Node::Mapping(map) if !map.is_empty() => {
            for (k, v) in map {
                out.push_str(&"  ".repeat(indent));
                out.push_str(k);
                match &v.value {
                    Node::Mapping(m) if !m.is_empty() => {
                        out.push_str(":\n");
                        write_yaml(&v.value, indent + 1, out);
                    }
                    Node::Sequence(s) if !s.is_empty() => {
                        out.push_str(":\n");
                        write_yaml(&v.value, indent, out);
                    }
                    _ => {
                        out.push_str(": ");
                        out.push_str(&scalar_to_yaml(&v.value));
                        out.push('\n');
                    }
                }
            }
        }
        Node::Sequence(items) if !items.is_empty() => {
            for item in items {
                out.push_str(&"  ".repeat(indent));
                out.push_str("- ");
                match &item.value {
                    Node::Mapping(_) | Node::Sequence(_) => {
                        out.push('\n');
                        write_yaml(&item.value, indent + 1, out);
                    }
                    scalar => {
                        out.push_str(&scalar_to_yaml(scalar));
                        out.push('\n');
                    }
                }
            }
        }
        other => {
            out.push_str(&scalar_to_yaml(other));
            out.push('\n');
        }
    }
}

fn scalar_to_yaml(node: &Node) -> String {
    match node {
        Node::Null => "null".to_string(),
        Node::Bool(b) => b.to_string(),
        Node::Int(i) => i.to_string(),
        Node::Float(f) => f.to_string(),
        Node::String(s) if needs_quoting(s) => format!("{s:?}"),
        Node::String(s) => s.clone(),
        Node::Mapping(_) | Node::Sequence(_) => "{}".to_string(),
    }
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty()
        || matches!(s, "true" | "false" | "null" | "~")
        || s.parse::<f64>().is_ok()
        || s.starts_with(|c: char| "!&*-?|>%@`\"'#,[]{}:".contains(c))
        || s.contains(": ")
        || s.contains(" #")
}

/// JSON output over the flattened tree (grounded on
/// `yamlpp/util.py: to_json`, which round-trips through `json.loads` to
/// validate — we get that for free via `serde_json::Value`'s own
/// construction).
pub fn to_json(node: &Node) -> Result<String> {
    let json = node_to_json(node);
    serde_json::to_string_pretty(&json)
        .map_err(|e| kinded_err!(Kind::ValidationError, "while writing json: {e}").into())
}

fn node_to_json(node: &Node) -> serde_json::Value {
    match node {
        Node::Null => serde_json::Value::Null,
        Node::Bool(b) => (*b).into(),
        Node::Int(i) => (*i).into(),
        Node::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Node::String(s) => s.clone().into(),
        Node::Sequence(items) => items.iter().map(|v| node_to_json(&v.value)).collect(),
        Node::Mapping(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), node_to_json(&v.value)))
            .collect(),
    }
}

/// TOML output over the flattened tree (spec.md §4.G); the top level must
/// be a table, matching `toml`'s own requirement and
/// `yamlpp/util.py: to_toml`'s use of `tomlkit.dumps`.
pub fn to_toml(node: &Node) -> Result<String> {
    let value = node_to_toml(node)?;
    match value {
        toml::Value::Table(t) => toml::to_string_pretty(&t)
            .map_err(|e| kinded_err!(Kind::ValidationError, "while writing toml: {e}").into()),
        _ => Err(kinded_err!(Kind::TypeError, "toml output requires a mapping at the top level").into()),
    }
}

fn node_to_toml(node: &Node) -> Result<toml::Value> {
    Ok(match node {
        Node::Null => toml::Value::String(String::new()),
        Node::Bool(b) => toml::Value::Boolean(*b),
        Node::Int(i) => toml::Value::Integer(*i),
        Node::Float(f) => toml::Value::Float(*f),
        Node::String(s) => toml::Value::String(s.clone()),
        Node::Sequence(items) => toml::Value::Array(
            items
                .iter()
                .map(|v| node_to_toml(&v.value))
                .collect::<Result<Vec<_>>>()?,
        ),
        Node::Mapping(map) => {
            let mut table = toml::Table::new();
            for (k, v) in map {
                table.insert(k.clone(), node_to_toml(&v.value)?);
            }
            toml::Value::Table(table)
        }
    })
}

/// Python-literal output (spec.md §4.G), grounded on
/// `yamlpp/util.py: to_python` (`str(flatten(tree))`, i.e. Python's
/// `repr()`-style nested-literal syntax). No crate in the corpus emits
/// Python literal syntax, so this is hand-written, mirroring `repr()`'s
/// rules: strings single-quoted, dicts as `{'k': v, ...}`, lists as
/// `[v, ...]`, `None`/`True`/`False` for null/bool.
pub fn to_python(node: &Node) -> String {
    match node {
        Node::Null => "None".to_string(),
        Node::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        Node::Int(i) => i.to_string(),
        Node::Float(f) => format!("{f}"),
        Node::String(s) => python_repr_string(s),
        Node::Sequence(items) => {
            let parts: Vec<String> = items.iter().map(|v| to_python(&v.value)).collect();
            format!("[{}]", parts.join(", "))
        }
        Node::Mapping(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", python_repr_string(k), to_python(&v.value)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
    }
}

fn python_repr_string(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

pub const SUPPORTED_FORMATS: &[&str] = &["yaml", "json", "toml", "python"];

pub fn serialize(node: &Node, format: &str) -> Result<String> {
    let flattened = flatten(node)?;
    match format {
        "yaml" => Ok(to_yaml(&flattened)),
        "json" => to_json(&flattened),
        "toml" => to_toml(&flattened),
        "python" => Ok(to_python(&flattened)),
        other => Err(kinded_err!(Kind::TypeError, "unsupported output format `{other}`").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn mapping(pairs: Vec<(&str, Node)>) -> Node {
        let mut map = indexmap::IndexMap::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.unspanned());
        }
        Node::Mapping(map)
    }

    #[test]
    fn flatten_is_idempotent() {
        let node = mapping(vec![("a", Node::Int(1))]);
        let once = flatten(&node).unwrap();
        let twice = flatten(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn json_round_trips_through_serde() {
        let node = mapping(vec![("a", Node::Int(1)), ("b", Node::String("x".into()))]);
        let text = to_json(&node).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["a"], 1);
        assert_eq!(parsed["b"], "x");
    }

    #[test]
    fn python_literal_uses_python_spellings() {
        let node = mapping(vec![("ok", Node::Bool(true)), ("n", Node::Null)]);
        let text = to_python(&node);
        assert_eq!(text, "{'ok': True, 'n': None}");
    }

    #[test]
    fn toml_requires_mapping_at_top_level() {
        let node = Node::Int(1);
        assert!(to_toml(&node).is_err());
    }
}
