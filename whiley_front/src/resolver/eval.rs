//! The constant evaluator: folds constant declarations into `Value`s through
//! a cycle-detecting walk over their defining expressions.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use num_rational::BigRational;
use num_traits::Zero;
use whiley_env::{NameId, Span, Spanned};
use whiley_diag::Result;
use whiley_types as types;
use whiley_types::{is_subtype, Type, T_BOOL, T_REAL, T_ANY};
use whiley_il::Value;
use whiley_syntax::{Expr, BOp, NOp};
use loader::ModuleLoader;
use message as m;
use super::Resolver;

impl<'a> Resolver<'a> {
    /// Evaluates the named constant, memoising the result. A second
    /// encounter of the same name within one call chain is a cyclic
    /// declaration and fails on the spot.
    pub fn expand_constant(&mut self, key: &NameId, span: Span,
                           visited: &mut HashSet<NameId>) -> Result<Value> {
        if let Some(v) = self.constants.get(key) {
            return Ok(v.clone());
        }

        if !self.modules.contains(&key.module) {
            // a non-local name, fully resolved by the loader
            let module = match self.loader.load_module(&key.module) {
                Ok(module) => module,
                Err(e) => return self.syntax_error(span, e.to_string()),
            };
            return match module.constant(&key.name) {
                Some(cd) => Ok(cd.value.clone()),
                None => self.syntax_error(span, m::unable_to_resolve(key)),
            };
        }

        if visited.contains(key) {
            let at = self.decl_spans.get(key).cloned().unwrap_or(span);
            return self.syntax_error(at, m::CYCLIC_CONSTANT);
        }
        visited.insert(key.clone());

        let expr = match self.const_exprs.get(key) {
            Some(e) => e.clone(),
            None => return self.syntax_error(span, m::unable_to_resolve(key)),
        };

        trace!("expanding constant {}", key);
        let v = self.eval_const_expr(&expr, visited)?;
        self.constants.insert(key.clone(), v.clone());
        Ok(v)
    }

    /// Folds an expression which must be constant, e.g. a case label.
    pub fn fold_constant(&mut self, e: &Spanned<Expr>) -> Result<Value> {
        self.eval_const_expr(e, &mut HashSet::new())
    }

    /// Looks up an already-evaluated constant, going through the loader for
    /// foreign names.
    pub fn lookup_constant(&mut self, nid: &NameId, span: Span) -> Result<Value> {
        if let Some(v) = self.constants.get(nid) {
            return Ok(v.clone());
        }
        let module = match self.loader.load_module(&nid.module) {
            Ok(module) => module,
            Err(e) => return self.syntax_error(span, e.to_string()),
        };
        match module.constant(&nid.name) {
            Some(cd) => Ok(cd.value.clone()),
            None => self.syntax_error(span, m::unable_to_resolve(nid)),
        }
    }

    fn eval_const_expr(&mut self, e: &Spanned<Expr>,
                       visited: &mut HashSet<NameId>) -> Result<Value> {
        match e.base {
            Expr::Constant(ref v) => Ok(v.clone()),

            Expr::ExternalAccess(ref nid) => self.expand_constant(nid, e.span, visited),

            Expr::BinOp(op, ref lhs, ref rhs) => {
                let l = self.eval_const_expr(lhs, visited)?;
                let r = self.eval_const_expr(rhs, visited)?;
                self.eval_binop(op, l, r, e.span)
            }

            Expr::NaryOp(NOp::ListGen, ref args) => {
                let mut values = Vec::new();
                for a in args {
                    values.push(self.eval_const_expr(a, visited)?);
                }
                Ok(Value::List(values))
            }

            Expr::NaryOp(NOp::SetGen, ref args) => {
                let mut values = BTreeSet::new();
                for a in args {
                    values.insert(self.eval_const_expr(a, visited)?);
                }
                Ok(Value::Set(values))
            }

            Expr::RecordGen(ref fields) => {
                let mut values = BTreeMap::new();
                for &(ref name, ref value) in fields {
                    let v = self.eval_const_expr(value, visited)?;
                    values.insert(name.base.clone(), v);
                }
                Ok(Value::Record(values))
            }

            Expr::TupleGen(ref fields) => {
                let mut values = Vec::new();
                for field in fields {
                    values.push(self.eval_const_expr(field, visited)?);
                }
                Ok(Value::Tuple(values))
            }

            Expr::DictionaryGen(ref pairs) => {
                let mut values = BTreeMap::new();
                for &(ref k, ref v) in pairs {
                    let k = self.eval_const_expr(k, visited)?;
                    let v = self.eval_const_expr(v, visited)?;
                    values.insert(k, v);
                }
                Ok(Value::Dictionary(values))
            }

            Expr::Function { ref name, ref parameter_types, ref module } => {
                if let Some(ref mid) = *module {
                    let nid = NameId::new(mid.clone(), name.base.clone());
                    let tf = match *parameter_types {
                        Some(ref pts) => {
                            // TODO: carry parameter constraints on function references
                            let mut params = Vec::new();
                            for pt in pts {
                                let (t, _constraint) = self.expand_in_context(pt)?;
                                params.push(t);
                            }
                            Some(Type::function(T_ANY, params))
                        }
                        None => None,
                    };
                    return Ok(Value::FunConst(nid, tf));
                }
                self.syntax_error(e.span, m::NON_CONSTANT_EXPRESSION)
            }

            _ => self.syntax_error(e.span, m::NON_CONSTANT_EXPRESSION),
        }
    }

    // dispatches on the least upper bound of the operand types, mirroring
    // how the lowered code would coerce the operands
    fn eval_binop(&mut self, op: BOp, v1: Value, v2: Value, span: Span) -> Result<Value> {
        let lub = types::union(&v1.ty(), &v2.ty());
        if is_subtype(&T_BOOL, &lub) {
            self.eval_boolean(op, v1, v2, span)
        } else if is_subtype(&T_REAL, &lub) {
            self.eval_numeric(op, v1, v2, span)
        } else if is_subtype(&Type::list(T_ANY), &lub) {
            self.eval_list(op, v1, v2, span)
        } else if is_subtype(&Type::set(T_ANY), &lub) {
            self.eval_set(op, v1, v2, span)
        } else {
            self.syntax_error(span, m::INVALID_BINARY_EXPRESSION)
        }
    }

    fn eval_boolean(&mut self, op: BOp, v1: Value, v2: Value, span: Span) -> Result<Value> {
        if let (Value::Bool(a), Value::Bool(b)) = (v1, v2) {
            match op {
                BOp::And => return Ok(Value::Bool(a & b)),
                BOp::Or => return Ok(Value::Bool(a | b)),
                BOp::Xor => return Ok(Value::Bool(a ^ b)),
                _ => {}
            }
        }
        self.syntax_error(span, m::INVALID_BOOLEAN_EXPRESSION)
    }

    fn eval_numeric(&mut self, op: BOp, v1: Value, v2: Value, span: Span) -> Result<Value> {
        // two integers stay integral; otherwise both sides promote to rational
        if let (&Value::Int(ref a), &Value::Int(ref b)) = (&v1, &v2) {
            match op {
                BOp::Add => return Ok(Value::Int(a + b)),
                BOp::Sub => return Ok(Value::Int(a - b)),
                BOp::Mul => return Ok(Value::Int(a * b)),
                BOp::Div => {
                    if b.is_zero() {
                        return self.syntax_error(span, m::DIVISION_BY_ZERO);
                    }
                    return Ok(Value::Int(a / b));
                }
                BOp::Rem => {
                    if b.is_zero() {
                        return self.syntax_error(span, m::DIVISION_BY_ZERO);
                    }
                    return Ok(Value::Int(a % b));
                }
                _ => return self.syntax_error(span, m::INVALID_NUMERIC_EXPRESSION),
            }
        }

        let a = match rational_of(&v1) {
            Some(a) => a,
            None => return self.syntax_error(span, m::INVALID_NUMERIC_EXPRESSION),
        };
        let b = match rational_of(&v2) {
            Some(b) => b,
            None => return self.syntax_error(span, m::INVALID_NUMERIC_EXPRESSION),
        };
        match op {
            BOp::Add => Ok(Value::Real(a + b)),
            BOp::Sub => Ok(Value::Real(a - b)),
            BOp::Mul => Ok(Value::Real(a * b)),
            BOp::Div => {
                if b.is_zero() {
                    return self.syntax_error(span, m::DIVISION_BY_ZERO);
                }
                Ok(Value::Real(a / b))
            }
            _ => self.syntax_error(span, m::INVALID_NUMERIC_EXPRESSION),
        }
    }

    fn eval_list(&mut self, op: BOp, v1: Value, v2: Value, span: Span) -> Result<Value> {
        if let (Value::List(mut a), Value::List(b)) = (v1, v2) {
            if op == BOp::Add {
                a.extend(b);
                return Ok(Value::List(a));
            }
        }
        self.syntax_error(span, m::INVALID_LIST_EXPRESSION)
    }

    fn eval_set(&mut self, op: BOp, v1: Value, v2: Value, span: Span) -> Result<Value> {
        if let (Value::Set(a), Value::Set(b)) = (v1, v2) {
            match op {
                BOp::Union => {
                    return Ok(Value::Set(a.union(&b).cloned().collect()));
                }
                BOp::Intersection => {
                    return Ok(Value::Set(a.intersection(&b).cloned().collect()));
                }
                BOp::Difference => {
                    return Ok(Value::Set(a.difference(&b).cloned().collect()));
                }
                _ => {}
            }
        }
        self.syntax_error(span, m::INVALID_SET_EXPRESSION)
    }
}

fn rational_of(v: &Value) -> Option<BigRational> {
    match *v {
        Value::Int(ref i) => Some(BigRational::from_integer(i.clone())),
        Value::Real(ref r) => Some(r.clone()),
        _ => None,
    }
}
