//! The abstract syntax tree (AST) of Whiley source files.
//!
//! The tree is produced by the parser (an external collaborator of this
//! workspace) and consumed by the resolution and lowering passes. Every node
//! of interest is `Spanned` so diagnostics can point back into the source.
//! Name resolution is assumed to have happened already: external accesses
//! carry fully qualified names, and invocations carry the module a matching
//! symbol was found in, if any.

extern crate whiley_env;
extern crate whiley_il;

pub use ast::{WhileyFile, Decl, TypeDecl, ConstDecl, FunDecl, Parameter};
pub use ast::{Stmt, Case, Catch, Expr, UnresolvedType};
pub use ast::{BOp, UOp, NOp, CompOp};

mod ast;
