//! The type resolver: expands named types to their structural form and
//! synthesises the constraint blocks encoding their `where` predicates.

use std::collections::HashMap;

use whiley_env::{Name, NameId, Span, Spanned};
use whiley_diag::Result;
use whiley_types as types;
use whiley_types::{Type, T_ANY, T_VOID, T_NULL, T_BOOL, T_BYTE, T_CHAR, T_INT, T_REAL,
                   T_STRING};
use whiley_il::{Block, Code, fresh_label, THIS_SLOT};
use whiley_syntax::UnresolvedType;
use loader::ModuleLoader;
use message as m;
use super::Resolver;

impl<'a> Resolver<'a> {
    /// Expands the named type to `(type, constraint)`.
    ///
    /// Recursion terminates through the per-walk cache: before a declaration
    /// is expanded a nominal placeholder is inserted, and a *guarded*
    /// re-encounter resolves to that placeholder (to be closed into a proper
    /// recursive type by the caller). An unguarded re-encounter is a cyclic
    /// declaration like `define X as X` and is reported as such.
    pub fn expand_type_name(&mut self, key: &NameId, cache: &mut HashMap<NameId, Type>,
                            guarded: bool, span: Span) -> Result<(Type, Option<Block>)> {
        if let Some(cached) = cache.get(key) {
            if *cached == Type::nominal(key.clone()) && !guarded {
                let at = self.decl_spans.get(key).cloned().unwrap_or(span);
                return self.syntax_error(at, m::CYCLIC_TYPE);
            }
            return Ok((cached.clone(), None));
        }

        if let Some(p) = self.types.get(key) {
            return Ok(p.clone());
        }

        if !self.modules.contains(&key.module) {
            // a non-local name, fully resolved by the loader
            let module = match self.loader.load_module(&key.module) {
                Ok(module) => module,
                Err(e) => return self.syntax_error(span, e.to_string()),
            };
            return match module.type_decl(&key.name) {
                Some(td) => Ok((td.ty.clone(), td.constraint.clone())),
                None => self.syntax_error(span, m::unable_to_resolve(key)),
            };
        }

        if self.constants.contains_key(key) || self.const_exprs.contains_key(key) {
            // the name refers to a (non-set) constant declared in this run
            return self.syntax_error(span, m::INVALID_CONSTANT_AS_TYPE);
        }
        if !self.unresolved.contains_key(key) {
            // the name refers to a function or method, or nothing at all
            return self.syntax_error(span, m::INVALID_FUNCTION_AS_TYPE);
        }

        // needed to terminate any recursion
        cache.insert(key.clone(), Type::nominal(key.clone()));

        let (ut, constraint_expr) = match self.unresolved.get(key) {
            Some(p) => p.clone(),
            None => return self.internal_failure(span, "unresolved declaration vanished"),
        };

        let (mut ty, mut blk) = self.expand_unresolved(&ut, cache, false)?;

        // when the expansion mentions the name itself, the type is open and
        // recursive on this name; close it to complete the cycle
        if ty.is_open_on(key) {
            ty = match Type::close_recursive(key, &ty) {
                Ok(t) => t,
                Err(_) => return self.internal_failure(span, "failed to close recursive type"),
            };
        }

        if let Some(ref cexpr) = constraint_expr {
            let true_label = fresh_label();
            let mut env = HashMap::new();
            env.insert(Name::from("$"), THIS_SLOT);
            let mut constraint = self.lower_condition(&true_label, cexpr, &mut env)?;
            constraint.append(Code::Fail(m::type_constraint_not_satisfied(key)), cexpr.span);
            constraint.append(Code::Label(true_label), cexpr.span);
            match blk {
                Some(ref mut b) => b.extend(constraint),
                None => blk = Some(constraint),
            }
        }

        cache.insert(key.clone(), ty.clone());
        Ok((ty, blk))
    }

    /// Expands a type written in a declaration signature or expression,
    /// outside the walk of any particular named declaration.
    pub fn expand_in_context(&mut self, t: &Spanned<UnresolvedType>)
                             -> Result<(Type, Option<Block>)> {
        let mut cache = HashMap::new();
        self.expand_unresolved(t, &mut cache, false)
    }

    // `guarded` tracks whether the walk has passed a constructor under which
    // a recursive occurrence is well-founded (list, set, dictionary, record,
    // tuple, union); a bare or merely negated occurrence is not
    fn expand_unresolved(&mut self, t: &Spanned<UnresolvedType>,
                         cache: &mut HashMap<NameId, Type>,
                         guarded: bool) -> Result<(Type, Option<Block>)> {
        match t.base {
            UnresolvedType::Any => Ok((T_ANY, None)),
            UnresolvedType::Void => Ok((T_VOID, None)),
            UnresolvedType::Null => Ok((T_NULL, None)),
            UnresolvedType::Bool => Ok((T_BOOL, None)),
            UnresolvedType::Byte => Ok((T_BYTE, None)),
            UnresolvedType::Char => Ok((T_CHAR, None)),
            UnresolvedType::Int => Ok((T_INT, None)),
            UnresolvedType::Real => Ok((T_REAL, None)),
            UnresolvedType::Strung => Ok((T_STRING, None)),

            UnresolvedType::List(ref elem) => {
                let (et, eblk) = self.expand_unresolved(elem, cache, true)?;
                let blk = eblk.map(|b| each_element_constraint(&b, t.span));
                Ok((Type::list(et), blk))
            }

            UnresolvedType::Set(ref elem) => {
                let (et, eblk) = self.expand_unresolved(elem, cache, true)?;
                let blk = eblk.map(|b| each_element_constraint(&b, t.span));
                Ok((Type::set(et), blk))
            }

            UnresolvedType::Dictionary(ref key, ref value) => {
                let (kt, kblk) = self.expand_unresolved(key, cache, true)?;
                let (vt, vblk) = self.expand_unresolved(value, cache, true)?;
                if kblk.is_some() || vblk.is_some() {
                    // there is no IL iteration form over dictionaries yet,
                    // so key/value constraints have no runtime witness
                    trace!("dropping constraints of a dictionary type at {:?}", t.span);
                }
                Ok((Type::dictionary(kt, vt), None))
            }

            UnresolvedType::Tuple(ref elems) => {
                let mut blk = None;
                let mut tys = Vec::new();
                for (i, e) in elems.iter().enumerate() {
                    let (et, eblk) = self.expand_unresolved(e, cache, true)?;
                    tys.push(et);
                    if let Some(ref c) = eblk {
                        let b = blk.get_or_insert_with(|| Block::new(1));
                        b.append(Code::Load(THIS_SLOT), t.span);
                        b.append(Code::TupleLoad(i), t.span);
                        b.append(Code::Store(THIS_SLOT + 1), t.span);
                        b.extend(c.shift(1).relabel());
                    }
                }
                Ok((Type::tuple(tys), blk))
            }

            UnresolvedType::Record { open, ref fields } => {
                let mut blk = None;
                let mut tys = Vec::new();
                for &(ref name, ref ft) in fields {
                    let (et, eblk) = self.expand_unresolved(ft, cache, true)?;
                    if let Some(ref c) = eblk {
                        let b = blk.get_or_insert_with(|| Block::new(1));
                        b.append(Code::Load(THIS_SLOT), t.span);
                        b.append(Code::FieldLoad(name.base.clone()), t.span);
                        b.append(Code::Store(THIS_SLOT + 1), t.span);
                        b.extend(c.shift(1).relabel());
                    }
                    tys.push((name.base.clone(), et));
                }
                Ok((Type::record(open, tys), blk))
            }

            UnresolvedType::Union(ref uts) => self.expand_union(t.span, uts, cache),

            UnresolvedType::Not(ref inner) => {
                let (it, iblk) = self.expand_unresolved(inner, cache, guarded)?;
                if iblk.is_some() {
                    // a negative constraint has no runtime witness to check
                    trace!("dropping the constraint under a negation type at {:?}", t.span);
                }
                Ok((types::negation(&it), None))
            }

            UnresolvedType::Intersection(ref uts) => {
                let mut result: Option<Type> = None;
                for ut in uts {
                    let (bt, bblk) = self.expand_unresolved(ut, cache, guarded)?;
                    if bblk.is_some() {
                        trace!("dropping a constraint under an intersection type at {:?}",
                               t.span);
                    }
                    result = Some(match result {
                        Some(r) => types::intersect(&r, &bt),
                        None => bt,
                    });
                }
                match result {
                    Some(ty) => Ok((ty, None)),
                    None => self.internal_failure(t.span, "intersection type with no bounds"),
                }
            }

            UnresolvedType::Process(ref inner) => {
                let (it, iblk) = self.expand_unresolved(inner, cache, guarded)?;
                if iblk.is_some() {
                    trace!("dropping the constraint of a process state type at {:?}", t.span);
                }
                Ok((Type::process(it), None))
            }

            UnresolvedType::Named(ref nid) => {
                self.expand_type_name(nid, cache, guarded, t.span)
            }
        }
    }

    // a union type accepts a value when some bound does. bounds without
    // constraints become direct type tests; constrained bounds test the type
    // first and then chain their constraint so a failure merely moves on to
    // the next alternative.
    fn expand_union(&mut self, span: Span, uts: &[Spanned<UnresolvedType>],
                    cache: &mut HashMap<NameId, Type>) -> Result<(Type, Option<Block>)> {
        let mut bounds: Vec<Type> = Vec::new();
        let mut blk = Block::new(1);
        let exit = fresh_label();
        let mut constrained = false;

        for ut in uts {
            let (bt, bblk) = self.expand_unresolved(ut, cache, true)?;

            let recursive_bound = cache.keys().any(|k| bt.is_open_on(k));
            match bblk {
                Some(ref c) if !recursive_bound => {
                    constrained = true;
                    let next = fresh_label();
                    blk.append(Code::IfType {
                        slot: Some(THIS_SLOT),
                        ty: types::negation(&bt),
                        target: next.clone(),
                    }, ut.span);
                    blk.extend(c.chain(&next));
                    blk.append(Code::Goto(exit.clone()), ut.span);
                    blk.append(Code::Label(next), ut.span);
                }
                Some(_) => {
                    // TODO: a constrained bound which is recursive on a name
                    // still being expanded degrades to a plain type test;
                    // testing against the nominal type instead would lift this
                    blk.append(Code::IfType {
                        slot: Some(THIS_SLOT),
                        ty: bt.clone(),
                        target: exit.clone(),
                    }, ut.span);
                }
                None => {
                    blk.append(Code::IfType {
                        slot: Some(THIS_SLOT),
                        ty: bt.clone(),
                        target: exit.clone(),
                    }, ut.span);
                }
            }
            bounds.push(bt);
        }

        let blk = if constrained {
            blk.append(Code::Fail("type constraint not satisfied".into()), span);
            blk.append(Code::Label(exit), span);
            Some(blk)
        } else {
            None
        };

        if bounds.len() == 1 {
            match bounds.into_iter().next() {
                Some(ty) => Ok((ty, blk)),
                None => self.internal_failure(span, "union type with no bounds"),
            }
        } else if bounds.is_empty() {
            self.internal_failure(span, "union type with no bounds")
        } else {
            Ok((types::union_all(bounds), blk))
        }
    }
}

// wraps an element constraint into a loop over the value in the subject slot
fn each_element_constraint(constraint: &Block, span: Span) -> Block {
    let label = fresh_label();
    let mut blk = Block::new(1);
    blk.append(Code::Load(THIS_SLOT), span);
    blk.append(Code::ForAll { slot: THIS_SLOT + 1, end: label.clone(), modified: vec![] },
               span);
    blk.extend(constraint.shift(1).relabel());
    blk.append(Code::End(label), span);
    blk
}
