#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

#[macro_use]
pub mod error;

pub mod expr;
pub mod host;
pub mod loader;
pub mod modules;
pub mod node;
pub mod schema;
pub mod scope;
pub mod serializer;

// the interpreter core (Component F) depends on all of the above
pub mod interp;
