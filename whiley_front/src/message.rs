//! The catalog of diagnostic messages the front end can produce.
//!
//! Keeping the wording here, rather than scattered through the passes, keeps
//! messages for the same failure identical everywhere and lets tests match on
//! them.

use whiley_env::NameId;

pub const CYCLIC_CONSTANT: &'static str = "cyclic constant declaration";
pub const CYCLIC_TYPE: &'static str = "cyclic type declaration not guarded by a constructor";
pub const INVALID_CONSTANT_AS_TYPE: &'static str = "constant cannot be used as a type";
pub const INVALID_FUNCTION_AS_TYPE: &'static str = "function or method cannot be used as a type";
pub const NON_CONSTANT_EXPRESSION: &'static str = "expression is not a constant";
pub const INVALID_BOOLEAN_EXPRESSION: &'static str = "invalid boolean expression";
pub const INVALID_BINARY_EXPRESSION: &'static str = "invalid binary expression";
pub const INVALID_NUMERIC_EXPRESSION: &'static str = "invalid numeric expression";
pub const INVALID_LIST_EXPRESSION: &'static str = "invalid list expression";
pub const INVALID_SET_EXPRESSION: &'static str = "invalid set expression";
pub const INVALID_LVAL_EXPRESSION: &'static str = "invalid assignment target";
pub const INVALID_TUPLE_LVAL: &'static str = "only variables can occur in a tuple assignment";
pub const UNKNOWN_VARIABLE: &'static str = "unknown variable";
pub const UNKNOWN_FUNCTION_OR_METHOD: &'static str = "unknown function or method";
pub const VARIABLE_POSSIBLY_UNINITIALISED: &'static str = "variable may be uninitialised";
pub const BREAK_OUTSIDE_LOOP: &'static str = "break outside a loop or switch";
pub const CONTINUE_OUTSIDE_LOOP: &'static str = "continue outside a loop";
pub const DUPLICATE_CASE_LABEL: &'static str = "duplicate case label";
pub const DUPLICATE_DEFAULT_LABEL: &'static str = "duplicate default label";
pub const UNREACHABLE_CODE: &'static str = "unreachable code";
pub const DIVISION_BY_ZERO: &'static str = "division by zero in constant expression";

pub fn unable_to_resolve(name: &NameId) -> String {
    format!("unable to resolve name {}", name)
}

pub fn type_constraint_not_satisfied(name: &NameId) -> String {
    format!("constraint on type not satisfied ({})", name)
}
