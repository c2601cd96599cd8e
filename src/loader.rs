#[allow(unused_imports)]
use log::info;

use indexmap::IndexMap;
use saphyr_parser::{Event, MarkedEventReceiver, Marker, Parser, ScanError, TScalarStyle};

use crate::error::{Kind, Result};
use crate::kinded_err;
use crate::node::{Node, Spanned};

/// YAML 1.2 parsing into `Node` (spec.md §4.B). Built directly on
/// `saphyr-parser`'s event stream rather than the higher-level `saphyr::Yaml`
/// tree so that every node keeps the byte offset it started at, which the
/// rest of the crate needs for `[<Kind>] Line <n>: ...` error reporting.
pub fn load(source: &str) -> Result<Spanned<Node>> {
    let mut builder = Builder::new();
    let mut parser = Parser::new_from_str(source);
    parser
        .load(&mut builder, true)
        .map_err(scan_error_to_parse_error)?;
    builder.finish()
}

/// Parse `text` as a single standalone scalar/flow-collection document, the
/// typed re-parse stage of expression evaluation (spec.md §4.E). Falls back
/// to the raw string when `text` is not a recognizable literal.
pub fn parse_scalar(text: &str) -> Node {
    match load(text) {
        Ok(spanned) => spanned.value,
        Err(_) => Node::String(text.to_string()),
    }
}

fn scan_error_to_parse_error(err: ScanError) -> crate::error::ParseError {
    kinded_err!(Kind::LoadError, "{err}").into()
}

struct Builder {
    /// Stack of in-progress containers: sequences accumulate items directly,
    /// mappings accumulate `(key, value)` pairs where `key` is `None` while
    /// waiting for its value.
    stack: Vec<Container>,
    finished: Option<Spanned<Node>>,
    error: Option<crate::error::ParseError>,
    /// Anchored values by anchor id, so a later `Event::Alias` can resolve
    /// to a clone of the content (spec.md §9, resolved as an Open Question:
    /// aliases are resolved *by value* at parse time rather than kept as a
    /// shared reference, since only fully-closed containers are ever
    /// registered here a well-formed alias cannot introduce a real graph
    /// cycle, and the rest of the crate works over a plain value tree).
    anchors: IndexMap<usize, Spanned<Node>>,
}

enum Container {
    Sequence(Vec<Spanned<Node>>, usize, usize),
    Mapping(IndexMap<String, Spanned<Node>>, Option<String>, usize, usize),
}

impl Builder {
    fn new() -> Self {
        Builder {
            stack: Vec::new(),
            finished: None,
            error: None,
            anchors: IndexMap::new(),
        }
    }

    fn finish(mut self) -> Result<Spanned<Node>> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.finished
            .ok_or_else(|| kinded_err!(Kind::LoadError, "empty document").into())
    }

    fn push_value(&mut self, value: Node, anchor_id: usize, start: usize, end: usize) {
        if anchor_id != 0 {
            self.anchors
                .insert(anchor_id, value.clone().spanned(Some(start..end)));
        }
        match self.stack.last_mut() {
            Some(Container::Sequence(items, ..)) => items.push(value.spanned(Some(start..end))),
            Some(Container::Mapping(map, pending_key, ..)) => match pending_key.take() {
                Some(key) => {
                    map.insert(key, value.spanned(Some(start..end)));
                }
                None => {
                    let key = match &value {
                        Node::String(s) => s.clone(),
                        other => scalar_as_key(other),
                    };
                    *pending_key = Some(key);
                }
            },
            None => self.finished = Some(value.spanned(Some(start..end))),
        }
    }

    fn record_duplicate(&mut self, key: &str, start: usize) {
        if self.error.is_none() {
            self.error = Some(
                kinded_err!(Kind::LoadError, "duplicate mapping key `{key}`")
                    .into_parse_error_with_range(start),
            );
        }
    }
}

fn scalar_as_key(node: &Node) -> String {
    match node {
        Node::String(s) => s.clone(),
        Node::Int(i) => i.to_string(),
        Node::Float(f) => f.to_string(),
        Node::Bool(b) => b.to_string(),
        Node::Null => "null".to_string(),
        _ => String::new(),
    }
}

impl MarkedEventReceiver for Builder {
    fn on_event(&mut self, ev: Event, mark: Marker) {
        if self.error.is_some() {
            return;
        }
        match ev {
            Event::SequenceStart(anchor_id, _tag) => self.stack.push(Container::Sequence(
                Vec::new(),
                anchor_id,
                mark.index(),
            )),
            Event::SequenceEnd => {
                if let Some(Container::Sequence(items, anchor_id, start)) = self.stack.pop() {
                    self.push_value(Node::Sequence(items), anchor_id, start, mark.index());
                }
            }
            Event::MappingStart(anchor_id, _tag) => self.stack.push(Container::Mapping(
                IndexMap::new(),
                None,
                anchor_id,
                mark.index(),
            )),
            Event::MappingEnd => {
                if let Some(Container::Mapping(map, _, anchor_id, start)) = self.stack.pop() {
                    self.push_value(Node::Mapping(map), anchor_id, start, mark.index());
                }
            }
            Event::Scalar(value, style, anchor_id, _tag) => {
                let start = mark.index().saturating_sub(value.len());
                let node = scalar_to_node(&value, style);
                if let (Some(Container::Mapping(map, None, ..)), Node::String(ref key)) =
                    (self.stack.last(), &node)
                {
                    if map.contains_key(key) {
                        self.record_duplicate(key, start);
                        return;
                    }
                }
                self.push_value(node, anchor_id, start, mark.index());
            }
            Event::Alias(anchor_id) => {
                // Aliases resolve to a clone of the anchored value (spec.md
                // §9, Open Question resolved in DESIGN.md): every anchor is
                // fully built before it can be aliased, so this is always a
                // value copy of already-finished content, never a forward
                // reference into an in-progress container.
                match self.anchors.get(&anchor_id).cloned() {
                    Some(anchored) => {
                        let span = anchored.span.clone();
                        self.push_value(
                            anchored.value,
                            0,
                            span.as_ref().map(|r| r.start).unwrap_or(mark.index()),
                            span.as_ref().map(|r| r.end).unwrap_or(mark.index()),
                        );
                    }
                    None => {
                        self.error = Some(
                            kinded_err!(Kind::LoadError, "alias to unknown anchor")
                                .into_parse_error_with_range(mark.index()),
                        );
                    }
                }
            }
            _ => {}
        }
    }
}

fn scalar_to_node(value: &str, style: TScalarStyle) -> Node {
    if style != TScalarStyle::Plain {
        return Node::String(value.to_string());
    }
    match value {
        "~" | "null" | "Null" | "NULL" | "" => Node::Null,
        "true" | "True" | "TRUE" => Node::Bool(true),
        "false" | "False" | "FALSE" => Node::Bool(false),
        _ => {
            if let Ok(i) = value.parse::<i64>() {
                Node::Int(i)
            } else if let Ok(f) = value.parse::<f64>() {
                Node::Float(f)
            } else {
                Node::String(value.to_string())
            }
        }
    }
}

trait IntoParseErrorWithRange {
    fn into_parse_error_with_range(self, start: usize) -> crate::error::ParseError;
}

impl IntoParseErrorWithRange for crate::error::RawError {
    fn into_parse_error_with_range(self, start: usize) -> crate::error::ParseError {
        use crate::error::{Context, ErrorContext};
        Result::<()>::Err(self.into())
            .with_context(Context::Range(start..start))
            .unwrap_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn loads_scalars() {
        assert_eq!(parse_scalar("42"), Node::Int(42));
        assert_eq!(parse_scalar("3.5"), Node::Float(3.5));
        assert_eq!(parse_scalar("true"), Node::Bool(true));
        assert_eq!(parse_scalar("null"), Node::Null);
        assert_eq!(parse_scalar("hello world"), Node::String("hello world".into()));
    }

    #[test]
    fn loads_mapping_preserving_order() {
        let doc = load("b: 1\na: 2\n").unwrap();
        let map = doc.value.as_mapping().unwrap();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn rejects_duplicate_keys() {
        let result = load("a: 1\na: 2\n");
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), Kind::LoadError);
    }

    #[test]
    fn loads_nested_sequence() {
        let doc = load("- 1\n- 2\n- 3\n").unwrap();
        let seq = doc.value.as_sequence().unwrap();
        assert_eq!(seq.len(), 3);
    }

    #[test]
    fn alias_resolves_to_anchor_value() {
        let doc = load("base: &b {x: 1}\nother: *b\n").unwrap();
        let map = doc.value.as_mapping().unwrap();
        assert_eq!(map["base"].value, map["other"].value);
    }
}
