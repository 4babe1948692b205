//! The Whiley intermediate language (IL).
//!
//! Lowered code is a sequence of stack-plus-slot operations grouped into
//! `Block`s; constants and literals are `Value`s. A lowered compilation unit
//! is a `Module` carrying its type, constant and function declarations.

#[macro_use] extern crate log;
extern crate num_bigint;
extern crate num_rational;
extern crate num_traits;
extern crate vec_map;
extern crate whiley_env;
extern crate whiley_types;

pub use value::Value;
pub use code::{Code, BOp, COp, OpDir, Label};
pub use block::{Block, Entry, THIS_SLOT, fresh_label};
pub use module::{Module, TypeDecl, ConstDecl, FunctionDecl};

mod value;
mod code;
mod block;
mod module;
