#[allow(unused_imports)]
use log::info;

use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{ErrorContext, Kind, Result};
use crate::expr::Evaluator;
use crate::kinded_err;
use crate::loader;
use crate::node::{first_of, require_key, Node, Spanned};
use crate::scope::{Binding, Frame, Function, ScopeStack};
use crate::{host, modules};

/// The interpreter core (Component F, spec.md §4.F — the 40%-of-budget
/// centerpiece). Dispatch is grounded line-for-line on
/// `original_source/yamlpp/core.py: Interpreter.process_node`/`handle_*`:
/// a mapping node is walked key by key, dotted keys are routed to
/// construct handlers, ordinary keys recurse and re-attach under their own
/// key, and the two accumulators (`result_dict`/`result_list`) are merged
/// with the mapping winning unconditionally when non-empty (spec.md §9
/// Open Question #1, resolved in DESIGN.md).
pub struct Interpreter {
    pub stack: ScopeStack,
    pub evaluator: Evaluator,
    pub source_dir: PathBuf,
}

impl Interpreter {
    pub fn new(source_dir: PathBuf) -> Self {
        Interpreter {
            stack: ScopeStack::new(host::base_frame()),
            evaluator: Evaluator::new(),
            source_dir,
        }
    }

    /// The central dispatcher (spec.md §4.A/§4.F.0).
    pub fn process_node(&mut self, node: &Spanned<Node>) -> Result<Option<Spanned<Node>>> {
        match &node.value {
            Node::Null => Ok(None),
            Node::String(text) => {
                let value = self
                    .evaluator
                    .evaluate_text(text, &self.stack)
                    .with_range(node)?;
                Ok(Some(value.spanned(node.span.clone())))
            }
            Node::Mapping(map) => self.process_mapping(map, node),
            Node::Sequence(items) => {
                let mut out = Vec::new();
                for item in items {
                    if let Some(result) = self.process_node(item)? {
                        out.push(result);
                    }
                }
                Ok(Some(Node::Sequence(out).spanned(node.span.clone())))
            }
            scalar => Ok(Some(scalar.clone().spanned(node.span.clone()))),
        }
    }

    /// Pushes the `.context` frame (if any) *before* walking the rest of
    /// the mapping, and pops it *after* — unconditionally, regardless of
    /// whether the walk below succeeded — so the frame is released on
    /// every exit path including an error return (spec.md §5's "guaranteed
    /// release on all exit paths"). The pop happens before the `?`
    /// propagates any error produced while processing entries.
    fn process_mapping(
        &mut self,
        map: &IndexMap<String, Spanned<Node>>,
        node: &Spanned<Node>,
    ) -> Result<Option<Spanned<Node>>> {
        let pushed = match map.get(".context") {
            Some(block) => {
                let frame = self.build_context_frame(block)?;
                self.stack.push(frame);
                true
            }
            None => false,
        };

        let result = self.process_entries(map);

        if pushed {
            self.stack.pop();
        }

        result.map(|(result_dict, result_list)| {
            if !result_dict.is_empty() {
                Some(Node::Mapping(result_dict).spanned(node.span.clone()))
            } else if !result_list.is_empty() {
                Some(Node::Sequence(result_list).spanned(node.span.clone()))
            } else {
                None
            }
        })
    }

    fn process_entries(
        &mut self,
        map: &IndexMap<String, Spanned<Node>>,
    ) -> Result<(IndexMap<String, Spanned<Node>>, Vec<Spanned<Node>>)> {
        let mut result_dict = IndexMap::new();
        let mut result_list = Vec::new();
        for (key, value) in map {
            if key == ".context" {
                continue;
            }
            let entry = MappingEntryRef { key, value };
            if entry.key.starts_with('.') {
                if let Some(result) = self.dispatch(&entry)? {
                    merge_outcome(&mut result_dict, &mut result_list, result);
                }
                continue;
            }
            // ordinary keys render through the evaluator before becoming
            // dict keys (spec.md §4.F.0/§6, e.g. `.do: {"{{svc.name}}": ...}`)
            let rendered = self
                .evaluator
                .evaluate_text(entry.key, &self.stack)
                .with_range(entry.value)?;
            let key_string = node_as_case_key(&rendered);
            if let Some(v) = self.process_node(entry.value)? {
                result_dict.insert(key_string, v);
            }
        }
        Ok((result_dict, result_list))
    }

    fn build_context_frame(&mut self, block: &Spanned<Node>) -> Result<Frame> {
        let Node::Mapping(map) = &block.value else {
            return Err(
                kinded_err!(Kind::TypeError, "`.context` must be a mapping").into(),
            )
            .with_range(block);
        };
        let mut frame = Frame::new();
        for (key, value) in map {
            let resolved = self
                .process_node(value)?
                .unwrap_or_else(|| Node::Null.unspanned());
            frame.insert(key.clone(), Binding::Value(resolved));
        }
        Ok(frame)
    }

    /// Dispatches a dotted construct key. The returned `Node`'s own runtime
    /// type decides how it merges into the enclosing mapping's accumulators
    /// (`merge_outcome`) — this function just produces the construct's
    /// result, it does not know or care how the caller will fold it in.
    fn dispatch(&mut self, entry: &MappingEntryRef) -> Result<Option<Spanned<Node>>> {
        match entry.key {
            ".do" => self.handle_do(entry.value),
            ".foreach" => self.handle_foreach(entry.value),
            ".if" => self.handle_if(entry.value),
            ".switch" => self.handle_switch(entry.value),
            ".function" => {
                self.handle_function(entry.value)?;
                Ok(None)
            }
            ".call" => self.handle_call(entry.value),
            ".define" => {
                self.handle_define(entry.value)?;
                Ok(None)
            }
            ".import" => self.handle_import(entry.value),
            ".module" => {
                self.handle_module(entry.value)?;
                Ok(None)
            }
            ".export" => {
                self.handle_export(entry.value)?;
                Ok(None)
            }
            other => Err(kinded_err!(Kind::UndefinedName, "unknown construct `{other}`").into())
                .with_range(entry.value),
        }
    }

    fn handle_do(&mut self, value: &Spanned<Node>) -> Result<Option<Spanned<Node>>> {
        let Node::Sequence(actions) = &value.value else {
            return Err(kinded_err!(Kind::TypeError, "`.do` must be a sequence").into())
                .with_range(value);
        };
        let mut out = Vec::new();
        for action in actions {
            if let Some(result) = self.process_node(action)? {
                out.push(result);
            }
        }
        Ok(Some(Node::Sequence(out).spanned(value.span.clone())))
    }

    fn handle_foreach(&mut self, value: &Spanned<Node>) -> Result<Option<Spanned<Node>>> {
        let Node::Mapping(map) = &value.value else {
            return Err(kinded_err!(Kind::TypeError, "`.foreach` must be a mapping").into())
                .with_range(value);
        };
        let values = require_key(map, ".values", ".foreach")?;
        let Node::Sequence(pair) = &values.value else {
            return Err(kinded_err!(Kind::TypeError, "`.values` must be `[name, iterable]`").into())
                .with_range(values);
        };
        if pair.len() != 2 {
            return Err(
                kinded_err!(Kind::ArgumentMismatch, "`.values` must have exactly 2 entries").into(),
            )
            .with_range(values);
        }
        let var_name = pair[0]
            .value
            .as_str()
            .ok_or_else(|| kinded_err!(Kind::TypeError, "`.values[0]` must be a name"))?
            .to_string();
        let iterable = self
            .evaluator
            .eval_expression(
                text_of(&pair[1])?,
                &self.stack,
            )
            .with_range(&pair[1])?;
        let Node::Sequence(items) = iterable else {
            return Err(kinded_err!(Kind::TypeError, "`.values[1]` must evaluate to a sequence").into())
                .with_range(&pair[1]);
        };
        let body = require_key(map, ".do", ".foreach")?;

        let mut out = Vec::new();
        for item in items {
            let mut frame = Frame::new();
            frame.insert(var_name.clone(), Binding::Value(item));
            self.stack.push(frame);
            let result = self.process_node(body);
            self.stack.pop();
            if let Some(r) = result? {
                out.push(r);
            }
        }
        Ok(Some(Node::Sequence(out).spanned(value.span.clone())))
    }

    fn handle_if(&mut self, value: &Spanned<Node>) -> Result<Option<Spanned<Node>>> {
        let Node::Mapping(map) = &value.value else {
            return Err(kinded_err!(Kind::TypeError, "`.if` must be a mapping").into())
                .with_range(value);
        };
        let cond = require_key(map, ".cond", ".if")?;
        let cond_value = self
            .evaluator
            .eval_expression(text_of(cond)?, &self.stack)
            .with_range(cond)?;
        if cond_value.is_truthy() {
            let then_block = require_key(map, ".then", ".if")?;
            self.process_node(then_block)
        } else if let Some(else_block) = map.get(".else") {
            self.process_node(else_block)
        } else {
            Ok(None)
        }
    }

    fn handle_switch(&mut self, value: &Spanned<Node>) -> Result<Option<Spanned<Node>>> {
        let Node::Mapping(map) = &value.value else {
            return Err(kinded_err!(Kind::TypeError, "`.switch` must be a mapping").into())
                .with_range(value);
        };
        let expr = require_key(map, ".expr", ".switch")?;
        let expr_value = self
            .evaluator
            .eval_expression(text_of(expr)?, &self.stack)
            .with_range(expr)?;
        let cases = require_key(map, ".cases", ".switch")?;
        let Node::Mapping(cases_map) = &cases.value else {
            return Err(kinded_err!(Kind::TypeError, "`.cases` must be a mapping").into())
                .with_range(cases);
        };
        let key = node_as_case_key(&expr_value);
        let matched = cases_map.get(&key).or_else(|| cases_map.get(".default"));
        match matched {
            Some(arm) => self.process_node(arm),
            None => Ok(None),
        }
    }

    fn handle_function(&mut self, value: &Spanned<Node>) -> Result<()> {
        let Node::Mapping(map) = &value.value else {
            return Err(kinded_err!(Kind::TypeError, "`.function` must be a mapping").into())
                .with_range(value);
        };
        let name = require_key(map, ".name", ".function")?;
        let name = name
            .value
            .as_str()
            .ok_or_else(|| kinded_err!(Kind::TypeError, "`.name` must be a string"))?
            .to_string();
        let args = require_key(map, ".args", ".function")?;
        let Node::Sequence(arg_nodes) = &args.value else {
            return Err(kinded_err!(Kind::TypeError, "`.args` must be a sequence of names").into())
                .with_range(args);
        };
        let mut formal_args = Vec::new();
        for a in arg_nodes {
            let name = a
                .value
                .as_str()
                .ok_or_else(|| kinded_err!(Kind::TypeError, "`.args` entries must be identifiers"))?;
            formal_args.push(name.to_string());
        }
        let body = require_key(map, ".do", ".function")?.clone();

        let function = Function {
            formal_args,
            body,
            captured: self.stack.snapshot(),
        };
        self.stack.define_function(name, function);
        Ok(())
    }

    fn handle_call(&mut self, value: &Spanned<Node>) -> Result<Option<Spanned<Node>>> {
        let Node::Mapping(map) = &value.value else {
            return Err(kinded_err!(Kind::TypeError, "`.call` must be a mapping").into())
                .with_range(value);
        };
        let name_node = require_key(map, ".name", ".call")?;
        let name = name_node
            .value
            .as_str()
            .ok_or_else(|| kinded_err!(Kind::TypeError, "`.name` must be a string"))?;

        let binding = match self.stack.lookup(name) {
            Some(b) => b,
            None => {
                return Err(
                    kinded_err!(Kind::KeyNotFound, "function '{name}' not found").into(),
                )
                .with_range(name_node);
            }
        };
        let Binding::Function(function) = binding else {
            return Err(kinded_err!(Kind::KeyNotFound, "'{name}' is not a function").into())
                .with_range(name_node);
        };

        let actual_args: Vec<Spanned<Node>> = match map.get(".args") {
            Some(args_node) => match &args_node.value {
                Node::Sequence(items) => items.clone(),
                _ => {
                    return Err(kinded_err!(Kind::TypeError, "`.args` must be a sequence").into())
                        .with_range(args_node);
                }
            },
            None => Vec::new(),
        };

        if actual_args.len() != function.formal_args.len() {
            return Err(kinded_err!(
                Kind::ArgumentMismatch,
                "'{name}' expects {} argument(s), got {}",
                function.formal_args.len(),
                actual_args.len()
            )
            .into())
            .with_range(value);
        }

        let mut evaluated = Vec::with_capacity(actual_args.len());
        for a in &actual_args {
            let v = self
                .process_node(a)?
                .unwrap_or_else(|| Node::Null.unspanned());
            evaluated.push(v);
        }

        let mut arg_frame = Frame::new();
        for (formal, actual) in function.formal_args.iter().zip(evaluated) {
            arg_frame.insert(formal.clone(), Binding::Value(actual));
        }

        let mut call_stack = ScopeStack::new(Frame::new());
        for captured_frame in &function.captured {
            call_stack.push_shared(Rc::clone(captured_frame));
        }
        call_stack.push(arg_frame);

        let mut guard = StackSwapGuard::new(self, call_stack);
        let body = function.body.clone();
        guard.interp.process_node(&body)
    }

    fn handle_define(&mut self, value: &Spanned<Node>) -> Result<()> {
        let Node::Mapping(map) = &value.value else {
            return Err(kinded_err!(Kind::TypeError, "`.define` must be a mapping").into())
                .with_range(value);
        };
        for (key, val) in map {
            let resolved = self
                .process_node(val)?
                .unwrap_or_else(|| Node::Null.unspanned());
            self.stack.define(key.clone(), resolved);
        }
        Ok(())
    }

    fn handle_import(&mut self, value: &Spanned<Node>) -> Result<Option<Spanned<Node>>> {
        let Node::Mapping(map) = &value.value else {
            return Err(kinded_err!(Kind::TypeError, "`.import` must be a mapping").into())
                .with_range(value);
        };
        let filename_node = require_key(map, ".filename", ".import")?;
        let filename = self
            .evaluator
            .eval_expression(text_of(filename_node)?, &self.stack)
            .with_range(filename_node)?;
        let filename = filename
            .as_str()
            .ok_or_else(|| kinded_err!(Kind::TypeError, "`.filename` must render to a string"))?;
        let path = safe_path(&self.source_dir, filename, true).with_range(filename_node)?;
        let source = std::fs::read_to_string(&path)
            .map_err(|e| kinded_err!(Kind::LoadError, "reading {}: {e}", path.display()))?;
        let loaded = loader::load(&source)?;
        // textual-semantics inclusion: re-dispatches with the CURRENT stack,
        // not a fresh module scope (spec.md §4.F.6).
        self.process_node(&loaded)
    }

    fn handle_module(&mut self, value: &Spanned<Node>) -> Result<()> {
        let Node::Mapping(map) = &value.value else {
            return Err(kinded_err!(Kind::TypeError, "`.module` must be a mapping").into())
                .with_range(value);
        };
        let filename_node = require_key(map, ".filename", ".module")?;
        let filename = self
            .evaluator
            .eval_expression(text_of(filename_node)?, &self.stack)
            .with_range(filename_node)?;
        let filename = filename
            .as_str()
            .ok_or_else(|| kinded_err!(Kind::TypeError, "`.filename` must render to a string"))?;
        let path = safe_path(&self.source_dir, filename, true).with_range(filename_node)?;

        let engine = rhai::Engine::new();
        let module = modules::load_external(&engine, &path)?;
        self.stack.update_top(module.bindings);
        for (name, fn_ptr) in module.filters {
            self.evaluator
                .register_filter(name, engine.clone(), module.ast.clone(), fn_ptr);
        }
        Ok(())
    }

    fn handle_export(&mut self, value: &Spanned<Node>) -> Result<()> {
        let Node::Mapping(map) = &value.value else {
            return Err(kinded_err!(Kind::TypeError, "`.export` must be a mapping").into())
                .with_range(value);
        };
        let filename_node = require_key(map, ".filename", ".export")?;
        let filename = self
            .evaluator
            .eval_expression(text_of(filename_node)?, &self.stack)
            .with_range(filename_node)?;
        let filename = filename
            .as_str()
            .ok_or_else(|| kinded_err!(Kind::TypeError, "`.filename` must render to a string"))?;
        let path = safe_path(&self.source_dir, filename, false).with_range(filename_node)?;

        let payload = first_of(map, &[".content", ".do", "content"])
            .ok_or_else(|| kinded_err!(Kind::KeyNotFound, "`.export` is missing its payload (`.content`, `.do`, or `content`)"))?;
        let tree = self
            .process_node(payload)?
            .unwrap_or_else(|| Node::Null.unspanned());
        let format = map
            .get(".format")
            .and_then(|f| f.value.as_str())
            .unwrap_or("yaml");
        let text = crate::serializer::serialize(&tree.value, format)?;
        std::fs::write(&path, text)
            .map_err(|e| kinded_err!(Kind::LoadError, "writing {}: {e}", path.display()).into())
    }
}

/// Folds a dotted construct's result into the enclosing mapping's two
/// accumulators (spec.md §4.A, §9 Open Question #1): a `Mapping` result
/// merges its entries into `result_dict` key-by-key, a `Sequence` result
/// extends `result_list` with its items, and a bare scalar is appended as
/// one item — mirroring `original_source/yamlpp/core.py`'s
/// `result_dict.update(r)` / `result_list += r` rather than treating every
/// construct result as one opaque list item.
fn merge_outcome(
    result_dict: &mut IndexMap<String, Spanned<Node>>,
    result_list: &mut Vec<Spanned<Node>>,
    result: Spanned<Node>,
) {
    let Spanned { value, span } = result;
    match value {
        Node::Mapping(entries) => {
            for (k, v) in entries {
                result_dict.insert(k, v);
            }
        }
        Node::Sequence(items) => result_list.extend(items),
        other => result_list.push(other.spanned(span)),
    }
}

struct MappingEntryRef<'a> {
    key: &'a str,
    value: &'a Spanned<Node>,
}

fn text_of(node: &Spanned<Node>) -> Result<&str> {
    node.value
        .as_str()
        .ok_or_else(|| kinded_err!(Kind::TypeError, "expected a string expression").into())
}

fn node_as_case_key(node: &Node) -> String {
    match node {
        Node::String(s) => s.clone(),
        Node::Int(i) => i.to_string(),
        Node::Float(f) => f.to_string(),
        Node::Bool(b) => b.to_string(),
        Node::Null => "null".to_string(),
        _ => String::new(),
    }
}

/// Enforces the `.import`/`.export` path-confinement invariant (spec.md
/// §3/§7 `PathEscape`), grounded on `original_source/yamlpp/util.py:
/// safe_path`. Unlike the original, the existence check is optional:
/// `.import` requires the file to already exist, `.export` does not (it
/// is about to create it).
fn safe_path(source_dir: &Path, candidate: &str, require_exists: bool) -> Result<PathBuf> {
    let joined = source_dir.join(candidate);
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            std::path::Component::ParentDir => {
                if !normalized.pop() {
                    return Err(kinded_err!(
                        Kind::PathEscape,
                        "path `{candidate}` escapes the source directory"
                    )
                    .into());
                }
            }
            std::path::Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    if !normalized.starts_with(source_dir) {
        return Err(kinded_err!(
            Kind::PathEscape,
            "path `{candidate}` escapes the source directory"
        )
        .into());
    }
    if require_exists && !normalized.exists() {
        return Err(kinded_err!(Kind::LoadError, "no such file: {}", normalized.display()).into());
    }
    Ok(normalized)
}

struct StackSwapGuard<'a> {
    interp: &'a mut Interpreter,
    saved: Option<ScopeStack>,
}

impl<'a> StackSwapGuard<'a> {
    fn new(interp: &'a mut Interpreter, new_stack: ScopeStack) -> Self {
        let saved = std::mem::replace(&mut interp.stack, new_stack);
        StackSwapGuard {
            interp,
            saved: Some(saved),
        }
    }
}

impl Drop for StackSwapGuard<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.interp.stack = saved;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn interp() -> Interpreter {
        Interpreter::new(PathBuf::from("/tmp"))
    }

    fn run(yaml: &str) -> Option<Spanned<Node>> {
        let mut it = interp();
        let doc = loader::load(yaml).unwrap();
        it.process_node(&doc).unwrap()
    }

    #[test]
    fn ordinary_keys_recurse_and_reattach() {
        let result = run("a: 1\nb: hello\n").unwrap();
        let map = result.value.as_mapping().unwrap();
        assert_eq!(map["a"].value, Node::Int(1));
        assert_eq!(map["b"].value, Node::String("hello".into()));
    }

    #[test]
    fn if_then_else_picks_the_matching_branch() {
        let result = run(".if:\n  .cond: \"{{ true }}\"\n  .then: yes-branch\n  .else: no-branch\n")
            .unwrap();
        // dict is empty (only a dotted key), so result is the list accumulator
        let seq = result.value.as_sequence().unwrap();
        assert_eq!(seq[0].value, Node::String("yes-branch".into()));
    }

    #[test]
    fn switch_falls_back_to_default_case() {
        let yaml = ".switch:\n  .expr: \"{{ 1 + 1 }}\"\n  .cases:\n    \"3\": three\n    .default: other\n";
        let result = run(yaml).unwrap();
        let seq = result.value.as_sequence().unwrap();
        assert_eq!(seq[0].value, Node::String("other".into()));
    }

    #[test]
    fn define_then_reference_in_sibling_scalar() {
        let yaml = ".do:\n  - .define:\n      x: 5\n  - \"{{ x }}\"\n";
        let result = run(yaml).unwrap();
        let seq = result.value.as_sequence().unwrap();
        // first .do entry (.define) contributes nothing, second is `{{ x }}`
        assert_eq!(seq.last().unwrap().value, Node::Int(5));
    }

    #[test]
    fn context_pops_even_when_body_errors() {
        let mut it = interp();
        let doc = loader::load(".context:\n  x: 1\n.call:\n  .name: missing\n").unwrap();
        let depth_before = it.stack.depth();
        let _ = it.process_node(&doc);
        assert_eq!(it.stack.depth(), depth_before);
    }

    #[test]
    fn construct_result_with_no_entries_is_dropped_not_wrapped() {
        // `.do` holding only a `.define` contributes nothing to either
        // accumulator, so the whole mapping must resolve to `None`.
        let result = run(".do:\n  - .define:\n      x: 5\n");
        assert!(result.is_none());
    }

    #[test]
    fn mapping_result_from_if_merges_into_the_enclosing_dict() {
        // `.if` forwards its taken branch's result unchanged; when that
        // branch is itself a mapping, it must merge key-by-key into the
        // parent's dict accumulator rather than appending the whole
        // mapping as one opaque list item.
        let yaml = "a: 1\n.if:\n  .cond: \"{{ true }}\"\n  .then:\n    b: 2\n";
        let result = run(yaml).unwrap();
        let map = result.value.as_mapping().unwrap();
        assert_eq!(map["a"].value, Node::Int(1));
        assert_eq!(map["b"].value, Node::Int(2));
    }

    #[test]
    fn sequence_result_from_do_extends_rather_than_nests() {
        // `.do`'s own sequence result must be *extended* into the parent's
        // list accumulator, not appended as a single nested item.
        let yaml = ".do:\n  - 10\n  - 20\n";
        let result = run(yaml).unwrap();
        let seq = result.value.as_sequence().unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq[0].value, Node::Int(10));
        assert_eq!(seq[1].value, Node::Int(20));
    }

    #[test]
    fn module_filters_become_callable_from_expressions() {
        let dir = std::env::temp_dir().join("yamlpp_test_module_filters_interp");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("helpers.rhai"),
            "fn filter_shout(value) { value + \"!\" }\n",
        )
        .unwrap();

        let mut it = Interpreter::new(dir);
        let doc = loader::load(".module:\n  .filename: helpers.rhai\n").unwrap();
        it.process_node(&doc).unwrap();

        let result = it
            .evaluator
            .eval_expression("shout(\"hi\")", &it.stack)
            .unwrap();
        assert_eq!(result, Node::String("hi!".to_string()));
    }

    #[test]
    fn templated_ordinary_key_renders_before_becoming_a_dict_key() {
        let yaml = ".define:\n  svc_name: api\n\"{{ svc_name }}\":\n  port: 8080\n";
        let result = run(yaml).unwrap();
        let map = result.value.as_mapping().unwrap();
        assert!(map.contains_key("api"), "expected rendered key `api`, got {map:?}");
    }
}
