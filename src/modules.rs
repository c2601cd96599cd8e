#[allow(unused_imports)]
use log::info;

use std::path::Path;

use rhai::Engine;

use crate::error::{Context, ErrorContext, Kind, Result};
use crate::expr::dynamic_to_node;
use crate::kinded_err;
use crate::scope::Binding;

/// External-module loading (spec.md §4.H): a module exposes two named
/// tables, bindings and filters, which `.module` merges into the current
/// top frame without self-injecting anything else. Since the host language
/// here is Rust rather than Python, a "module" is a `.rhai` script
/// (grounded on the teacher's own embedding of `rhai`, already the chosen
/// template sub-language) compiled with `rhai::Engine::compile_file` and
/// queried for its exported functions (spec.md §9 Open Question, resolved
/// in DESIGN.md): zero-argument `fn`s become bindings, and `fn
/// filter_NAME(value)` functions become filters named `NAME`.
pub struct ExternalModule {
    pub bindings: Vec<(String, Binding)>,
    /// `(filter name, fn pointer)` pairs, still bound to `ast` below — a
    /// `FnPtr` only calls back into the AST/engine it was compiled from, so
    /// the caller must carry `ast` (and the engine it compiled against)
    /// alongside these when registering them elsewhere.
    pub filters: Vec<(String, rhai::FnPtr)>,
    pub ast: rhai::AST,
}

pub fn load_external(engine: &Engine, path: &Path) -> Result<ExternalModule> {
    let ast = engine
        .compile_file(path.to_path_buf())
        .map_err(|e| Into::<crate::error::RawError>::into(e))
        .with_context(Context::Message(format!(
            "while loading module {}",
            path.display()
        )))?;

    let module = rhai::Module::eval_ast_as_new(rhai::Scope::new(), &ast, engine)
        .map_err(|e| Into::<crate::error::RawError>::into(e))?;

    let mut bindings = Vec::new();
    let mut filters = Vec::new();
    for (name, _, _, _, value) in module.iter_var() {
        bindings.push((
            name.to_string(),
            Binding::Value(dynamic_to_node(value.clone()).unspanned()),
        ));
    }
    for func in module.iter_script_fn() {
        let (_, _, name, arity, _) = func;
        if let Some(filter_name) = name.strip_prefix("filter_") {
            if arity == 1 {
                filters.push((filter_name.to_string(), rhai::FnPtr::new(name)?));
            }
        }
    }

    if bindings.is_empty() && filters.is_empty() {
        return Err(kinded_err!(
            Kind::LoadError,
            "module {} exports no bindings or filters",
            path.display()
        )
        .into());
    }

    Ok(ExternalModule {
        bindings,
        filters,
        ast,
    })
}
