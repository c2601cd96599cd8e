#[allow(unused_imports)]
use log::info;

use crate::node::Node;
use crate::scope::Frame;

/// The base frame (spec.md §6), grounded on
/// `original_source/protein/global_context.py: GLOBAL_CONTEXT`. The host
/// built-ins themselves (`getenv`, `get_password`, `osquery`, `assert`,
/// `to_html`) are registered as callable functions on the `Evaluator`'s
/// `rhai::Engine` (see `expr.rs`), not as scope bindings — they are called
/// like `getenv("HOME")` inside `{{ }}` expressions, so they belong with
/// `quote`/`dequote` in the engine's function table rather than here. This
/// frame is left for host-provided constants, of which there are none yet.
pub fn base_frame() -> Frame {
    Frame::new()
}

/// `getenv(name)`: reads an environment variable, returning `null` when
/// unset (mirrors Python's `os.getenv`, which returns `None`).
pub fn getenv(name: &str) -> Node {
    match std::env::var(name) {
        Ok(value) => Node::String(value),
        Err(_) => Node::Null,
    }
}

/// `get_password(service, username)`: stubbed. Non-goal per spec.md §1.
pub fn get_password(_service: &str, _username: &str) -> Node {
    Node::Null
}

/// `osquery(query)`: stubbed. Non-goal per spec.md §1.
pub fn osquery(_query: &str) -> Node {
    Node::Null
}

/// `assert(condition, message)`: a debugging/inspection hook, not a
/// control-flow primitive (grounded on `protein/global_context.py:
/// jinja_assert`, a plain Python `assert`). Panics like the original; this
/// is intentionally not a recoverable `Result` because the original itself
/// uses a bare `assert` statement.
pub fn host_assert(condition: bool, message: Option<&str>) {
    if !condition {
        panic!("{}", message.unwrap_or("assertion failed"));
    }
}

/// `to_html(markdown)`: stubbed passthrough. Non-goal per spec.md §1 (the
/// Markdown renderer is explicitly out of scope); this just exposes the
/// filter name so templates that reference it do not fail to resolve.
pub fn to_html(markdown: &str) -> String {
    markdown.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn getenv_returns_null_when_unset() {
        assert_eq!(getenv("YAMLPP_DEFINITELY_UNSET_VAR"), Node::Null);
    }

    #[test]
    #[should_panic]
    fn host_assert_panics_on_false() {
        host_assert(false, Some("boom"));
    }

    #[test]
    fn host_assert_is_noop_on_true() {
        host_assert(true, None);
    }
}
