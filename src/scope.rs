#[allow(unused_imports)]
use log::info;

use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Kind, Result};
use crate::kinded_err;
use crate::node::{Node, Spanned};

/// A binding in a `Frame`: either an ordinary value, or a function object
/// carrying its formal argument names, its body, and the frames it closes
/// over by reference (spec.md §4.D/§4.F.5 — "late binding... captures the
/// live environment, not a snapshot").
#[derive(Debug, Clone)]
pub enum Binding {
    Value(Spanned<Node>),
    Function(Rc<Function>),
}

#[derive(Debug)]
pub struct Function {
    pub formal_args: Vec<String>,
    pub body: Spanned<Node>,
    pub captured: Vec<Rc<RefCell<Frame>>>,
}

/// A single lexical frame: the bindings introduced by one `.context`,
/// `.foreach` iteration, `.function` call, or the base frame.
pub type Frame = IndexMap<String, Binding>;

/// The interpreter's lexical scope stack (spec.md §4.D). Frames are
/// reference-counted so that a `.function`'s `captured` list and the live
/// stack can share the same frame: a `.define` in an enclosing frame after
/// the function was created is still visible when the function is called.
#[derive(Clone)]
pub struct ScopeStack {
    frames: Vec<Rc<RefCell<Frame>>>,
}

impl ScopeStack {
    pub fn new(base: Frame) -> Self {
        ScopeStack {
            frames: vec![Rc::new(RefCell::new(base))],
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(Rc::new(RefCell::new(frame)));
    }

    pub fn push_shared(&mut self, frame: Rc<RefCell<Frame>>) {
        self.frames.push(frame);
    }

    /// Pops the top frame. Invariant (spec.md §3): the stack must never be
    /// emptied; callers only invoke this paired with a matching `push` from
    /// the same scope, unconditionally, ahead of any `?` that could
    /// propagate an error out of that scope (spec.md §5's "guaranteed
    /// release on all exit paths" — see e.g. `interp::Interpreter::process_mapping`).
    pub fn pop(&mut self) -> Option<Rc<RefCell<Frame>>> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    /// Innermost-wins lookup across all live frames.
    pub fn lookup(&self, name: &str) -> Option<Binding> {
        for frame in self.frames.iter().rev() {
            if let Some(binding) = frame.borrow().get(name) {
                return Some(binding.clone());
            }
        }
        None
    }

    /// Assigns into the current top frame (`.define`).
    pub fn define(&mut self, name: impl Into<String>, value: Spanned<Node>) {
        self.frames
            .last()
            .expect("scope stack is never empty")
            .borrow_mut()
            .insert(name.into(), Binding::Value(value));
    }

    pub fn define_function(&mut self, name: impl Into<String>, function: Function) {
        self.frames
            .last()
            .expect("scope stack is never empty")
            .borrow_mut()
            .insert(name.into(), Binding::Function(Rc::new(function)));
    }

    /// Merges `bindings` into the *current* top frame, used by `.module` to
    /// expose external names without pushing a new frame (spec.md §4.F.7).
    pub fn update_top(&mut self, bindings: impl IntoIterator<Item = (String, Binding)>) {
        let top = self.frames.last().expect("scope stack is never empty");
        top.borrow_mut().extend(bindings);
    }

    /// A snapshot of the live frame stack, captured by reference, for
    /// storing inside a `Function`.
    pub fn snapshot(&self) -> Vec<Rc<RefCell<Frame>>> {
        self.frames.clone()
    }

    pub fn lookup_required(&self, name: &str) -> Result<Binding> {
        self.lookup(name)
            .ok_or_else(|| kinded_err!(Kind::UndefinedName, "name '{name}' is not defined").into())
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn innermost_frame_wins_on_lookup() {
        let mut stack = ScopeStack::new(Frame::new());
        stack.define("x", Node::Int(1).unspanned());
        stack.push(Frame::new());
        stack.define("x", Node::Int(2).unspanned());
        assert_eq!(
            stack.lookup("x"),
            Some(Binding::Value(Node::Int(2).unspanned()))
        );
        stack.pop();
        assert_eq!(
            stack.lookup("x"),
            Some(Binding::Value(Node::Int(1).unspanned()))
        );
    }

    #[test]
    fn frame_pops_even_if_caller_returns_early() {
        // mirrors the manual push/pop-before-`?` pattern every construct
        // handler in `interp.rs` actually uses.
        fn fails(stack: &mut ScopeStack) -> Result<()> {
            stack.push(Frame::new());
            stack.define("y", Node::Int(1).unspanned());
            let result = Err(kinded_err!(Kind::TypeError, "boom").into());
            stack.pop();
            result
        }
        let mut stack = ScopeStack::new(Frame::new());
        let depth_before = stack.depth();
        let _ = fails(&mut stack);
        assert_eq!(stack.depth(), depth_before);
        assert!(stack.lookup("y").is_none());
    }

    #[test]
    fn define_after_function_capture_is_visible_at_call_time() {
        let mut stack = ScopeStack::new(Frame::new());
        stack.define("late", Node::Int(1).unspanned());
        let captured = stack.snapshot();
        stack.define("late", Node::Int(2).unspanned());
        // look up `late` via the captured frames, not a stale clone of values
        let found = captured
            .iter()
            .rev()
            .find_map(|f| f.borrow().get("late").cloned());
        assert_eq!(found, Some(Binding::Value(Node::Int(2).unspanned())));
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Binding::Value(a), Binding::Value(b)) => a == b,
            _ => false,
        }
    }
}
