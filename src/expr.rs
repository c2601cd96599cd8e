#[allow(unused_imports)]
use log::info;

use std::collections::HashMap;

use rhai::{Dynamic, Engine, Scope as RhaiScope, AST};

use crate::error::{Context, ErrorContext, Result};
use crate::host;
use crate::loader;
use crate::node::Node;
use crate::scope::{Binding, ScopeStack};

/// The literal sentinel that escapes a rendered string from the typed
/// re-parse stage, keeping it a plain string (spec.md §6).
pub const LITERAL_SENTINEL: &str = "#!literal";

/// The two-stage expression evaluator (spec.md §4.E): stage 1 renders a
/// `{{ ... }}` expression against the live scope using `rhai` as the
/// template sub-language (the same engine the teacher's `expression::Scope`
/// wraps); stage 2 re-parses the rendered text as a YAML literal via the
/// Loader (Component B), so `42` becomes `Node::Int(42)` rather than
/// staying the string `"42"`.
pub struct Evaluator {
    engine: Engine,
    ast_cache: HashMap<String, AST>,
}

impl Evaluator {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_allow_looping(false);
        engine.set_allow_statement_expression(false);
        engine.set_allow_if_expression(true);
        engine.register_fn("quote", quote);
        engine.register_fn("dequote", dequote);
        // host built-ins (spec.md §6), grounded on
        // `original_source/protein/global_context.py: GLOBAL_CONTEXT` —
        // exposed as callable functions rather than scope bindings since
        // that's how expressions reference them: `{{ getenv("HOME") }}`.
        engine.register_fn("getenv", |name: &str| node_to_dynamic(&host::getenv(name)));
        engine.register_fn("get_password", |service: &str, username: &str| {
            node_to_dynamic(&host::get_password(service, username))
        });
        engine.register_fn("osquery", |query: &str| node_to_dynamic(&host::osquery(query)));
        engine.register_fn("to_html", host::to_html);
        engine.register_fn("assert", |condition: bool, message: &str| {
            host::host_assert(condition, Some(message))
        });
        engine.register_fn("assert", |condition: bool| host::host_assert(condition, None));
        Evaluator {
            engine,
            ast_cache: HashMap::new(),
        }
    }

    fn compile(&mut self, expr: &str) -> Result<AST> {
        if let Some(ast) = self.ast_cache.get(expr) {
            return Ok(ast.clone());
        }
        let ast = self
            .engine
            .compile_expression(expr)
            .map_err(|e| Into::<crate::error::RawError>::into(e))?;
        self.ast_cache.insert(expr.to_string(), ast.clone());
        Ok(ast)
    }

    /// Evaluate a single `{{ expr }}` body against `stack`, returning its
    /// rendered-then-reparsed `Node`.
    pub fn eval_expression(&mut self, expr: &str, stack: &ScopeStack) -> Result<Node> {
        let ast = self.compile(expr)?;
        let mut rhai_scope = build_rhai_scope(stack);
        let dynamic: Dynamic = self
            .engine
            .eval_ast_with_scope(&mut rhai_scope, &ast)
            .map_err(|e| Into::<crate::error::RawError>::into(e))
            .with_context(Context::Message(format!("in expression `{expr}`")))?;
        Ok(dynamic_to_node(dynamic))
    }

    /// Stage 1 + stage 2: scan `text` for embedded `{{ expr }}` runs,
    /// evaluate each, and either splice a rendered string (mixed text) or
    /// return the single embedded value verbatim (whole-string expression),
    /// matching the original's Jinja2-then-`literal_eval` behavior.
    pub fn evaluate_text(&mut self, text: &str, stack: &ScopeStack) -> Result<Node> {
        if let Some(whole) = whole_expression(text) {
            let value = self.eval_expression(whole, stack)?;
            return Ok(apply_literal_sentinel(text, value));
        }
        if !text.contains("{{") {
            return Ok(Node::String(text.to_string()));
        }
        let mut rendered = String::new();
        let mut rest = text;
        while let Some(start) = rest.find("{{") {
            let Some(end) = rest[start..].find("}}") else {
                rendered.push_str(rest);
                rest = "";
                break;
            };
            rendered.push_str(&rest[..start]);
            let expr = rest[start + 2..start + end].trim();
            let value = self.eval_expression(expr, stack)?;
            rendered.push_str(&render_for_splice(&value));
            rest = &rest[start + end + 2..];
        }
        rendered.push_str(rest);
        Ok(loader::parse_scalar(&rendered))
    }

    /// Merges a `.module`-exported filter into the filter table (spec.md
    /// §4.F.7/§4.H), making `name(value)` callable from any `{{ ... }}`
    /// expression this evaluator runs from then on. `fn_ptr` only knows how
    /// to call back into the AST/engine it was compiled from (rhai's
    /// `FnPtr::call` needs both), so those travel with it rather than being
    /// re-registered on this evaluator's own engine.
    pub fn register_filter(
        &mut self,
        name: String,
        source_engine: Engine,
        source_ast: AST,
        fn_ptr: rhai::FnPtr,
    ) {
        self.engine.register_fn(
            &name,
            move |value: Dynamic| -> std::result::Result<Dynamic, Box<rhai::EvalAltResult>> {
                fn_ptr.call::<Dynamic>(&source_engine, &source_ast, (value,))
            },
        );
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// `text` is a whole-string expression (`"{{ expr }}"` with nothing else
/// around it) iff it starts with `{{`, ends with `}}`, and contains no
/// other `}}` before the final one.
fn whole_expression(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

fn apply_literal_sentinel(original_text: &str, value: Node) -> Node {
    if let Node::String(s) = &value {
        if let Some(rest) = s.strip_prefix(LITERAL_SENTINEL) {
            return Node::String(rest.to_string());
        }
    }
    let _ = original_text;
    value
}

fn render_for_splice(node: &Node) -> String {
    match node {
        Node::String(s) => s.clone(),
        Node::Null => String::new(),
        Node::Bool(b) => b.to_string(),
        Node::Int(i) => i.to_string(),
        Node::Float(f) => f.to_string(),
        _ => format!("{node:?}"),
    }
}

fn build_rhai_scope(stack: &ScopeStack) -> RhaiScope<'static> {
    let mut rhai_scope = RhaiScope::new();
    // iterate frames base-to-top so later (inner) pushes shadow earlier ones,
    // matching the scope stack's innermost-wins lookup semantics.
    for binding in stack.iter_flattened() {
        let (name, value) = binding;
        rhai_scope.push_dynamic(name, value);
    }
    rhai_scope
}

pub(crate) fn dynamic_to_node(d: Dynamic) -> Node {
    if d.is_unit() {
        Node::Null
    } else if let Some(b) = d.clone().try_cast::<bool>() {
        Node::Bool(b)
    } else if let Some(i) = d.clone().try_cast::<i64>() {
        Node::Int(i)
    } else if let Some(f) = d.clone().try_cast::<f64>() {
        Node::Float(f)
    } else if let Some(s) = d.clone().try_cast::<String>() {
        Node::String(s)
    } else {
        Node::String(d.to_string())
    }
}

fn node_to_dynamic(node: &Node) -> Dynamic {
    match node {
        Node::Null => Dynamic::UNIT,
        Node::Bool(b) => (*b).into(),
        Node::Int(i) => (*i).into(),
        Node::Float(f) => (*f).into(),
        Node::String(s) => s.clone().into(),
        Node::Sequence(items) => {
            let arr: rhai::Array = items.iter().map(|v| node_to_dynamic(&v.value)).collect();
            arr.into()
        }
        Node::Mapping(map) => {
            let mut m = rhai::Map::new();
            for (k, v) in map {
                m.insert(k.as_str().into(), node_to_dynamic(&v.value));
            }
            m.into()
        }
    }
}

/// `dequote`: the literal-sentinel escape hatch's strip side, also exposed
/// as a filter name inside expressions (spec.md §6, grounded on
/// `protein/global_context.py: dequote`/`strip_prefix`).
pub fn dequote(s: &str) -> String {
    s.strip_prefix(LITERAL_SENTINEL).unwrap_or(s).to_string()
}

/// `quote`: wraps a string so the typed re-parse stage leaves it untouched.
pub fn quote(s: &str) -> String {
    format!("{LITERAL_SENTINEL}{s}")
}

impl ScopeStack {
    /// Flattened `(name, value)` pairs across all live frames, base frame
    /// first, used to build a fresh `rhai::Scope` for each evaluation
    /// (rhai has no notion of our frame boundaries, only a flat list; later
    /// pushes of the same name shadow earlier ones in rhai's own lookup).
    pub fn iter_flattened(&self) -> impl Iterator<Item = (String, Dynamic)> + '_ {
        self.frames_for_eval().flat_map(|frame| {
            frame
                .borrow()
                .iter()
                .filter_map(|(k, v)| match v {
                    Binding::Value(node) => Some((k.clone(), node_to_dynamic(&node.value))),
                    Binding::Function(_) => None,
                })
                .collect::<Vec<_>>()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Spanned;
    use test_log::test;

    fn stack_with(name: &str, value: Node) -> ScopeStack {
        let mut stack = ScopeStack::new(crate::scope::Frame::new());
        stack.define(name, Spanned::unspanned(value));
        stack
    }

    #[test]
    fn evaluates_arithmetic_and_types_result() {
        let mut ev = Evaluator::new();
        let stack = stack_with("x", Node::Int(2));
        let result = ev.eval_expression("x + 3", &stack).unwrap();
        assert_eq!(result, Node::Int(5));
    }

    #[test]
    fn whole_string_expression_preserves_type() {
        let mut ev = Evaluator::new();
        let stack = stack_with("n", Node::Int(7));
        let result = ev.evaluate_text("{{ n }}", &stack).unwrap();
        assert_eq!(result, Node::Int(7));
    }

    #[test]
    fn mixed_text_renders_to_string() {
        let mut ev = Evaluator::new();
        let stack = stack_with("n", Node::Int(7));
        let result = ev.evaluate_text("value: {{ n }}!", &stack).unwrap();
        assert_eq!(result, Node::String("value: 7!".to_string()));
    }

    #[test]
    fn quote_then_dequote_round_trips() {
        let quoted = quote("42");
        assert_eq!(dequote(&quoted), "42");
    }

    #[test]
    fn getenv_is_callable_from_an_expression() {
        std::env::set_var("YAMLPP_EXPR_TEST_VAR", "hi");
        let mut ev = Evaluator::new();
        let stack = ScopeStack::new(crate::scope::Frame::new());
        let result = ev
            .eval_expression("getenv(\"YAMLPP_EXPR_TEST_VAR\")", &stack)
            .unwrap();
        assert_eq!(result, Node::String("hi".to_string()));
        std::env::remove_var("YAMLPP_EXPR_TEST_VAR");
    }

    #[test]
    fn referencing_an_undefined_name_reports_undefined_name_kind() {
        let mut ev = Evaluator::new();
        let stack = ScopeStack::new(crate::scope::Frame::new());
        let err = ev.eval_expression("totally_undefined_name", &stack).unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::UndefinedName);
    }
}
