//! The Whiley compiler front end.
//!
//! Given parsed source files and a module loader, the `Resolver` folds
//! constant declarations, expands named types to their structural form
//! (synthesising constraint blocks for `where` predicates), and lowers
//! function bodies into IL blocks, producing one `whiley_il::Module` per
//! input file.

#[macro_use] extern crate log;
extern crate num_bigint;
extern crate num_rational;
extern crate num_traits;
extern crate parking_lot;
extern crate vec_map;
extern crate whiley_env;
extern crate whiley_diag;
extern crate whiley_types;
extern crate whiley_il;
extern crate whiley_syntax;

pub use loader::{ModuleLoader, ResolveError, CachingLoader, FixedModules, NoModules};
pub use resolver::Resolver;

pub mod message;
mod loader;
mod resolver;
