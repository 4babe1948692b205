//! The structural type system of Whiley.
//!
//! Types are immutable graphs encoded as flat node arrays with integer edges,
//! so recursive types are just cycles through the root and never heap cycles.
//! Every operation exposed from this crate returns a *canonical* type:
//! minimised, union-flattened, subsumption-pruned and field-sorted, so that
//! structural equality decides type equivalence.

#[macro_use] extern crate log;
extern crate whiley_env;

pub use graph::{Leaf, Node, Compound, Type, NoSuchLabel};
pub use graph::{T_VOID, T_ANY, T_NULL, T_BOOL, T_BYTE, T_CHAR, T_INT, T_REAL, T_STRING};
pub use subtype::is_subtype;
pub use minimise::minimise;
pub use algebra::{union, union_all, intersect, negation};
pub use algebra::{least_upper_bound, greatest_lower_bound, least_difference};

mod graph;
mod subtype;
mod minimise;
mod algebra;
mod display;
