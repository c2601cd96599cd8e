#[allow(unused_imports)]
use log::info;

use regex::Regex;
use serde_json::Value as Json;

use crate::error::{Context, ErrorContext, Kind, ParseError, Result};
use crate::kinded_err;
use crate::node::{Node, Spanned};

/// A focused Draft-7 subset validator (spec.md §4.C): `type`, `required`,
/// `properties`, `patternProperties`, `additionalProperties`, `enum`,
/// `oneOf`, `items`. Grounded
/// on the keyword-dispatch architecture of `grill-core`/`grill-json-schema`
/// (each keyword is an independent check folded over the schema object)
/// and on `original_source/yamlpp/util.py: validate_node`'s contract:
/// collect every violation, then report by ascending JSON-pointer path,
/// first (by path) wins.
pub struct Schema {
    document: Json,
}

impl Schema {
    pub fn new(document: Json) -> Self {
        Schema { document }
    }

    /// Validate `node` against the schema, returning every violation found
    /// (spec.md: "Schema errors are collected"), sorted by JSON pointer
    /// path so the first entry is the validator's canonical "first error"
    /// (mirrors `sorted(validator.iter_errors(node), key=lambda e: e.path)`).
    pub fn validate(&self, node: &Spanned<Node>) -> Vec<ParseError> {
        let mut errors = Vec::new();
        let json = node_to_json(&node.value);
        check(&self.document, &json, "", node, &mut errors);
        errors.sort_by(|a, b| pointer_of(a).cmp(&pointer_of(b)));
        errors
    }

    /// Validate and turn the first (by path) violation into a `Result`,
    /// matching spec.md §4.C's "raises on the first (by path)" contract.
    pub fn validate_first(&self, node: &Spanned<Node>) -> Result<()> {
        match self.validate(node).into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn pointer_of(e: &ParseError) -> String {
    e.to_string()
}

fn node_to_json(node: &Node) -> Json {
    match node {
        Node::Null => Json::Null,
        Node::Bool(b) => Json::Bool(*b),
        Node::Int(i) => Json::Number((*i).into()),
        Node::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Node::String(s) => Json::String(s.clone()),
        Node::Sequence(items) => Json::Array(items.iter().map(|v| node_to_json(&v.value)).collect()),
        Node::Mapping(map) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in map {
                obj.insert(k.clone(), node_to_json(&v.value));
            }
            Json::Object(obj)
        }
    }
}

fn json_type_name(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// A key is known if it's named exactly in `properties`, or matched by any
/// `patternProperties` regex — both exempt it from `additionalProperties`
/// rejection (Draft-7's usual union-of-the-three-keywords contract).
fn key_is_known(schema: &serde_json::Map<String, Json>, key: &str) -> bool {
    if let Some(Json::Object(properties)) = schema.get("properties") {
        if properties.contains_key(key) {
            return true;
        }
    }
    if let Some(Json::Object(patterns)) = schema.get("patternProperties") {
        for pattern in patterns.keys() {
            if let Ok(re) = Regex::new(pattern) {
                if re.is_match(key) {
                    return true;
                }
            }
        }
    }
    false
}

fn push_error(errors: &mut Vec<ParseError>, pointer: &str, node: &Spanned<Node>, message: String) {
    let err: ParseError = kinded_err!(Kind::ValidationError, "{pointer}: {message}").into();
    let err = Result::<()>::Err(err)
        .with_range(node)
        .unwrap_err();
    errors.push(err);
}

fn check(
    schema: &Json,
    value: &Json,
    pointer: &str,
    node: &Spanned<Node>,
    errors: &mut Vec<ParseError>,
) {
    let Json::Object(schema) = schema else {
        return;
    };

    if let Some(ty) = schema.get("type") {
        let expected: Vec<&str> = match ty {
            Json::String(s) => vec![s.as_str()],
            Json::Array(types) => types.iter().filter_map(Json::as_str).collect(),
            _ => vec![],
        };
        let actual = json_type_name(value);
        let matches = expected.iter().any(|e| {
            *e == actual || (*e == "number" && actual == "integer")
        });
        if !expected.is_empty() && !matches {
            push_error(
                errors,
                pointer,
                node,
                format!("expected type {:?}, found {actual}", expected),
            );
        }
    }

    if let Some(Json::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            push_error(errors, pointer, node, "value not in enum".to_string());
        }
    }

    if let Json::Object(obj) = value {
        if let Some(Json::Array(required)) = schema.get("required") {
            for key in required.iter().filter_map(Json::as_str) {
                if !obj.contains_key(key) {
                    push_error(
                        errors,
                        pointer,
                        node,
                        format!("missing required property `{key}`"),
                    );
                }
            }
        }

        if let Some(Json::Object(properties)) = schema.get("properties") {
            for (key, sub_schema) in properties {
                if let Some(sub_value) = obj.get(key) {
                    if let Node::Mapping(map) = &node.value {
                        if let Some(sub_node) = map.get(key) {
                            check(
                                sub_schema,
                                sub_value,
                                &format!("{pointer}/{key}"),
                                sub_node,
                                errors,
                            );
                        }
                    }
                }
            }
        }

        if let Some(Json::Object(patterns)) = schema.get("patternProperties") {
            for (pattern, sub_schema) in patterns {
                let Ok(re) = Regex::new(pattern) else {
                    continue;
                };
                for (key, sub_value) in obj {
                    if !re.is_match(key) {
                        continue;
                    }
                    if let Node::Mapping(map) = &node.value {
                        if let Some(sub_node) = map.get(key) {
                            check(
                                sub_schema,
                                sub_value,
                                &format!("{pointer}/{key}"),
                                sub_node,
                                errors,
                            );
                        }
                    }
                }
            }
        }

        if schema.get("additionalProperties") == Some(&Json::Bool(false)) {
            for key in obj.keys() {
                if !key_is_known(schema, key) {
                    push_error(
                        errors,
                        pointer,
                        node,
                        format!("unexpected property `{key}`"),
                    );
                }
            }
        }
    }

    if let (Json::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        if let Node::Sequence(item_nodes) = &node.value {
            for (i, (item, item_node)) in items.iter().zip(item_nodes.iter()).enumerate() {
                check(
                    item_schema,
                    item,
                    &format!("{pointer}/{i}"),
                    item_node,
                    errors,
                );
            }
        }
    }

    if let Some(Json::Array(alternatives)) = schema.get("oneOf") {
        // oneOf is satisfied when exactly one alternative reports no errors
        let passing = alternatives
            .iter()
            .filter(|alt| {
                let mut sub_errors = Vec::new();
                check(alt, value, pointer, node, &mut sub_errors);
                sub_errors.is_empty()
            })
            .count();
        if passing != 1 {
            push_error(
                errors,
                pointer,
                node,
                format!("expected exactly one oneOf alternative to match, {passing} did"),
            );
        }
    }
}

/// The dotted-construct grammar compiled into the crate as the default
/// schema document (spec.md §4.C), a direct analogue of the original's
/// module-level `yamlpp_schema.yaml`. Ordinary (non-dot) keys stay
/// unconstrained — only the `.`-prefixed construct vocabulary is closed:
/// `patternProperties` exempts both "any non-dot key" and "any one of the
/// known construct names" from `additionalProperties`, so an unrecognized
/// dotted key (a typo'd construct name) is the only thing `additionalProperties:
/// false` actually rejects.
pub fn default_schema() -> Schema {
    let document: Json = serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "patternProperties": {
            "^[^.]": {},
            "^\\.(do|foreach|if|switch|function|call|define|import|module|export|context)$": {}
        },
        "properties": {
            ".do": { "type": "array" },
            ".foreach": {
                "type": "object",
                "required": [".values", ".do"],
                "additionalProperties": false,
                "properties": {
                    ".values": { "type": "array" },
                    ".do": {}
                }
            },
            ".if": {
                "type": "object",
                "required": [".cond", ".then"],
                "additionalProperties": false,
                "properties": {
                    ".cond": { "type": "string" },
                    ".then": {},
                    ".else": {}
                }
            },
            ".switch": {
                "type": "object",
                "required": [".expr", ".cases"],
                "additionalProperties": false,
                "properties": {
                    ".expr": { "type": "string" },
                    ".cases": { "type": "object" }
                }
            },
            ".function": {
                "type": "object",
                "required": [".name", ".args", ".do"],
                "additionalProperties": false,
                "properties": {
                    ".name": { "type": "string" },
                    ".args": { "type": "array" },
                    ".do": {}
                }
            },
            ".call": {
                "type": "object",
                "required": [".name"],
                "additionalProperties": false,
                "properties": {
                    ".name": { "type": "string" },
                    ".args": { "type": "array" }
                }
            },
            ".define": { "type": "object" },
            ".import": {
                "type": "object",
                "required": [".filename"],
                "additionalProperties": false,
                "properties": {
                    ".filename": { "type": "string" }
                }
            },
            ".module": {
                "type": "object",
                "required": [".filename"],
                "additionalProperties": false,
                "properties": {
                    ".filename": { "type": "string" }
                }
            },
            ".export": {
                "type": "object",
                "required": [".filename"],
                "properties": {
                    ".filename": { "type": "string" },
                    ".content": {},
                    ".do": {},
                    "content": {},
                    ".format": { "type": "string" }
                }
            },
            ".context": { "type": "object" }
        }
    });
    Schema::new(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn mapping(pairs: Vec<(&str, Node)>) -> Spanned<Node> {
        let mut map = indexmap::IndexMap::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.unspanned());
        }
        Node::Mapping(map).unspanned()
    }

    #[test]
    fn required_property_missing_is_reported() {
        let schema = Schema::new(serde_json::json!({
            "type": "object",
            "required": ["name"]
        }));
        let node = mapping(vec![("other", Node::Int(1))]);
        let errors = schema.validate(&node);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), Kind::ValidationError);
    }

    #[test]
    fn type_mismatch_is_reported() {
        let schema = Schema::new(serde_json::json!({"type": "string"}));
        let node = Node::Int(1).unspanned();
        let errors = schema.validate(&node);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn valid_document_has_no_errors() {
        let schema = Schema::new(serde_json::json!({
            "type": "object",
            "required": ["name"],
            "properties": {"name": {"type": "string"}}
        }));
        let node = mapping(vec![("name", Node::String("a".into()))]);
        assert!(schema.validate(&node).is_empty());
    }

    #[test]
    fn default_schema_accepts_ordinary_keys_and_known_constructs() {
        let doc = crate::loader::load(
            "a: 1\n.foreach:\n  .values: [x, [1, 2]]\n  .do: \"{{ x }}\"\n",
        )
        .unwrap();
        assert!(default_schema().validate(&doc).is_empty());
    }

    #[test]
    fn default_schema_rejects_unknown_dotted_key() {
        let doc = crate::loader::load(".bogus:\n  a: 1\n").unwrap();
        let errors = default_schema().validate(&doc);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), Kind::ValidationError);
    }

    #[test]
    fn default_schema_rejects_foreach_missing_values() {
        let doc = crate::loader::load(".foreach:\n  .do: \"{{ x }}\"\n").unwrap();
        let errors = default_schema().validate(&doc);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), Kind::ValidationError);
    }
}
