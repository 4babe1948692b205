//! The lowerer: translates statements, conditions and expressions into IL
//! blocks over an environment mapping variable names to slots.

use std::collections::{BTreeSet, HashMap};

use whiley_env::{Name, NameId, Span, Spanned, WithLoc};
use whiley_diag::Result;
use whiley_types as types;
use whiley_types::{Type, T_ANY, T_NULL, T_VOID};
use whiley_il::{Block, Code, Label, OpDir, Value, fresh_label};
use whiley_il::{BOp as IlBOp, COp};
use whiley_syntax::{Expr, Stmt, Case, Catch, BOp, UOp, NOp, CompOp};
use message as m;
use super::{Resolver, LoopScope};

type Env = HashMap<Name, usize>;

// slots are handed out in the order names first appear and never reused
// within one function
fn allocate(name: &Name, env: &mut Env) -> usize {
    if let Some(&slot) = env.get(name) {
        return slot;
    }
    let slot = env.len();
    env.insert(name.clone(), slot);
    slot
}

fn allocate_temp(env: &mut Env) -> usize {
    let name: Name = format!("${}", env.len()).into();
    allocate(&name, env)
}

// negates a condition syntactically, pushing the negation down through the
// connectives and comparisons so the common shapes need no extra branches
fn invert(e: &Spanned<Expr>) -> Spanned<Expr> {
    let span = e.span;
    match e.base {
        Expr::BinOp(op, ref lhs, ref rhs) => {
            match op {
                BOp::And => {
                    return Expr::BinOp(BOp::Or, Box::new(invert(lhs)),
                                       Box::new(invert(rhs))).with_loc(span);
                }
                BOp::Or => {
                    return Expr::BinOp(BOp::And, Box::new(invert(lhs)),
                                       Box::new(invert(rhs))).with_loc(span);
                }
                BOp::Eq => return Expr::BinOp(BOp::Neq, lhs.clone(), rhs.clone()).with_loc(span),
                BOp::Neq => return Expr::BinOp(BOp::Eq, lhs.clone(), rhs.clone()).with_loc(span),
                BOp::Lt => return Expr::BinOp(BOp::GtEq, lhs.clone(), rhs.clone()).with_loc(span),
                BOp::LtEq => return Expr::BinOp(BOp::Gt, lhs.clone(), rhs.clone()).with_loc(span),
                BOp::Gt => return Expr::BinOp(BOp::LtEq, lhs.clone(), rhs.clone()).with_loc(span),
                BOp::GtEq => return Expr::BinOp(BOp::Lt, lhs.clone(), rhs.clone()).with_loc(span),
                _ => {}
            }
        }
        Expr::UnOp(UOp::Not, ref inner) => return (**inner).clone(),
        _ => {}
    }
    Expr::UnOp(UOp::Not, Box::new(e.clone())).with_loc(span)
}

fn comparison_op(op: BOp) -> Option<COp> {
    match op {
        BOp::Eq => Some(COp::Eq),
        BOp::Neq => Some(COp::Neq),
        BOp::Lt => Some(COp::Lt),
        BOp::LtEq => Some(COp::LtEq),
        BOp::Gt => Some(COp::Gt),
        BOp::GtEq => Some(COp::GtEq),
        BOp::Subset => Some(COp::Subset),
        BOp::SubsetEq => Some(COp::SubsetEq),
        BOp::ElemOf => Some(COp::ElemOf),
        _ => None,
    }
}

fn binary_op(op: BOp) -> Option<IlBOp> {
    match op {
        BOp::Add => Some(IlBOp::Add),
        BOp::Sub => Some(IlBOp::Sub),
        BOp::Mul => Some(IlBOp::Mul),
        BOp::Div => Some(IlBOp::Div),
        BOp::Rem => Some(IlBOp::Rem),
        BOp::Range => Some(IlBOp::Range),
        BOp::Xor => Some(IlBOp::Xor),
        BOp::BitwiseAnd => Some(IlBOp::And),
        BOp::BitwiseOr => Some(IlBOp::Or),
        BOp::BitwiseXor => Some(IlBOp::Xor),
        BOp::Shl => Some(IlBOp::Shl),
        BOp::Shr => Some(IlBOp::Shr),
        _ => None,
    }
}

fn is_null_constant(e: &Spanned<Expr>) -> bool {
    match e.base {
        Expr::Constant(Value::Null) => true,
        _ => false,
    }
}

// binds a constraint block (over the subject slot 0) to an arbitrary slot,
// moving its scratch slots past everything the environment has handed out
fn bind_constraint(constraint: &Block, subject: usize, env: &mut Env) -> Block {
    let scratch = constraint.num_slots().saturating_sub(1);
    let base = env.len();
    for _ in 0..scratch {
        allocate_temp(env);
    }
    let mut out = Block::new(constraint.num_inputs());
    for entry in constraint.entries() {
        let code = entry.code.remap_slots(|s| if s == 0 { subject } else { base + s - 1 });
        out.append(code, entry.span);
    }
    out.relabel()
}

impl<'a> Resolver<'a> {
    // -----------------------------------------------------------------
    // statements

    /// Translates a statement into a block using the given environment.
    pub fn lower_stmt(&mut self, s: &Spanned<Stmt>, env: &mut Env) -> Result<Block> {
        match s.base {
            Stmt::Assign(ref lhs, ref rhs) => self.lower_assign(s.span, lhs, rhs, env),

            Stmt::Assert(ref e) => {
                let lab = fresh_label();
                let mut blk = Block::new(env.len());
                blk.append(Code::Assert(lab.clone()), s.span);
                let cond = self.lower_condition(&lab, e, env)?;
                blk.extend(cond);
                blk.append(Code::Fail("assertion failed".into()), s.span);
                blk.append(Code::Label(lab), s.span);
                Ok(blk)
            }

            Stmt::Return(ref e) => {
                let ret_ty = match self.current {
                    Some(ref c) => c.ret.clone(),
                    None => return self.internal_failure(s.span, "return outside a function"),
                };
                match *e {
                    Some(ref e) => {
                        let mut blk = self.lower_expr(e, env)?;
                        blk.append(Code::Return(ret_ty), s.span);
                        Ok(blk)
                    }
                    None => {
                        let mut blk = Block::new(env.len());
                        blk.append(Code::Return(T_VOID), s.span);
                        Ok(blk)
                    }
                }
            }

            Stmt::Debug(ref e) => {
                let mut blk = self.lower_expr(e, env)?;
                blk.append(Code::Debug, s.span);
                Ok(blk)
            }

            Stmt::Skip => {
                let mut blk = Block::new(env.len());
                blk.append(Code::Skip, s.span);
                Ok(blk)
            }

            Stmt::IfElse { ref condition, ref true_branch, ref false_branch } => {
                self.lower_if(s.span, condition, true_branch, false_branch, env)
            }

            Stmt::Switch { ref expr, ref cases } => self.lower_switch(s.span, expr, cases, env),

            Stmt::TryCatch { ref body, ref catches } => {
                self.lower_try_catch(s.span, body, catches, env)
            }

            Stmt::Break => {
                let target = match self.scopes.last() {
                    Some(scope) => scope.break_label.clone(),
                    None => return self.syntax_error(s.span, m::BREAK_OUTSIDE_LOOP),
                };
                let mut blk = Block::new(env.len());
                blk.append(Code::Goto(target), s.span);
                Ok(blk)
            }

            Stmt::Continue => {
                let target = self.scopes.iter().rev()
                                 .filter_map(|scope| scope.continue_label.clone())
                                 .next();
                let target = match target {
                    Some(l) => l,
                    None => return self.syntax_error(s.span, m::CONTINUE_OUTSIDE_LOOP),
                };
                let mut blk = Block::new(env.len());
                blk.append(Code::Goto(target), s.span);
                Ok(blk)
            }

            Stmt::Throw(ref e) => {
                let mut blk = self.lower_expr(e, env)?;
                blk.append(Code::Throw, s.span);
                Ok(blk)
            }

            Stmt::While { ref condition, ref invariant, ref body } => {
                self.lower_while(s.span, condition, invariant, body, env)
            }

            Stmt::DoWhile { ref condition, ref invariant, ref body } => {
                self.lower_do_while(s.span, condition, invariant, body, env)
            }

            Stmt::For { ref variables, ref source, ref invariant, ref body } => {
                self.lower_for(s.span, variables, source, invariant, body, env)
            }

            Stmt::ExprStmt(ref e) => {
                match e.base {
                    Expr::Invoke { .. } => self.lower_invoke(e, false, env),
                    Expr::UnOp(UOp::ProcessSpawn, _) => self.lower_expr(e, env),
                    _ => self.internal_failure(e.span, "unsupported expression statement"),
                }
            }
        }
    }

    fn lower_assign(&mut self, span: Span, lhs: &Spanned<Expr>, rhs: &Spanned<Expr>,
                    env: &mut Env) -> Result<Block> {
        match lhs.base {
            Expr::LocalVariable(ref v) => {
                let mut blk = self.lower_expr(rhs, env)?;
                let slot = allocate(v, env);
                blk.append(Code::Store(slot), span);
                Ok(blk)
            }

            Expr::TupleGen(ref vars) => {
                let mut blk = self.lower_expr(rhs, env)?;
                blk.append(Code::Destructure, span);
                // the last component ends up topmost, so store in reverse
                for e in vars.iter().rev() {
                    match e.base {
                        Expr::LocalVariable(ref v) => {
                            let slot = allocate(v, env);
                            blk.append(Code::Store(slot), span);
                        }
                        _ => return self.syntax_error(e.span, m::INVALID_TUPLE_LVAL),
                    }
                }
                Ok(blk)
            }

            Expr::ListAccess(..) | Expr::RecordAccess(..) => {
                // walk to the root variable, evaluating indices onto the
                // stack and collecting the field path, then update in place
                let mut fields = Vec::new();
                let mut blk = Block::new(env.len());
                let (var, depth) = self.extract_lval(lhs, &mut fields, &mut blk, env)?;
                let slot = match env.get(&var.base) {
                    Some(&s) => s,
                    None => return self.syntax_error(var.span, m::UNKNOWN_VARIABLE),
                };
                let rblk = self.lower_expr(rhs, env)?;
                blk.extend(rblk);
                blk.append(Code::Update { slot: slot, depth: depth, fields: fields }, span);
                Ok(blk)
            }

            _ => self.syntax_error(lhs.span, m::INVALID_LVAL_EXPRESSION),
        }
    }

    fn extract_lval(&mut self, e: &Spanned<Expr>, fields: &mut Vec<Name>, blk: &mut Block,
                    env: &mut Env) -> Result<(Spanned<Name>, usize)> {
        match e.base {
            Expr::LocalVariable(ref v) => Ok((v.clone().with_loc(e.span), 0)),
            Expr::ListAccess(ref src, ref index) => {
                let (var, depth) = self.extract_lval(src, fields, blk, env)?;
                let iblk = self.lower_expr(index, env)?;
                blk.extend(iblk);
                Ok((var, depth + 1))
            }
            Expr::RecordAccess(ref lhs, ref name) => {
                let (var, depth) = self.extract_lval(lhs, fields, blk, env)?;
                fields.push(name.base.clone());
                Ok((var, depth + 1))
            }
            _ => self.syntax_error(e.span, m::INVALID_LVAL_EXPRESSION),
        }
    }

    fn lower_if(&mut self, span: Span, condition: &Spanned<Expr>,
                true_branch: &[Spanned<Stmt>], false_branch: &[Spanned<Stmt>],
                env: &mut Env) -> Result<Block> {
        let false_lab = fresh_label();
        let exit_lab = if false_branch.is_empty() { false_lab.clone() } else { fresh_label() };

        let mut blk = self.lower_condition(&false_lab, &invert(condition), env)?;
        for st in true_branch {
            blk.extend(self.lower_stmt(st, env)?);
        }
        if !false_branch.is_empty() {
            blk.append(Code::Goto(exit_lab.clone()), span);
            blk.append(Code::Label(false_lab), span);
            for st in false_branch {
                blk.extend(self.lower_stmt(st, env)?);
            }
        }
        blk.append(Code::Label(exit_lab), span);
        Ok(blk)
    }

    fn lower_switch(&mut self, span: Span, expr: &Spanned<Expr>, cases: &[Spanned<Case>],
                    env: &mut Env) -> Result<Block> {
        let exit = fresh_label();
        let mut blk = self.lower_expr(expr, env)?;
        let mut cblk = Block::new(env.len());
        let mut default_target: Option<Label> = None;
        let mut seen = BTreeSet::new();
        let mut table = Vec::new();

        for c in cases {
            if c.values.is_empty() {
                if default_target.is_some() {
                    return self.syntax_error(c.span, m::DUPLICATE_DEFAULT_LABEL);
                }
                let target = fresh_label();
                default_target = Some(target.clone());
                cblk.append(Code::Label(target), c.span);
                for st in &c.body {
                    cblk.extend(self.lower_stmt(st, env)?);
                }
                cblk.append(Code::Goto(exit.clone()), c.span);
            } else if default_target.is_none() {
                let target = fresh_label();
                cblk.append(Code::Label(target.clone()), c.span);
                for v in &c.values {
                    let constant = self.fold_constant(v)?;
                    if seen.contains(&constant) {
                        return self.syntax_error(v.span, m::DUPLICATE_CASE_LABEL);
                    }
                    table.push((constant.clone(), target.clone()));
                    seen.insert(constant);
                }
                for st in &c.body {
                    cblk.extend(self.lower_stmt(st, env)?);
                }
                cblk.append(Code::Goto(exit.clone()), c.span);
            } else {
                // anything after the default arm can never run
                return self.syntax_error(c.span, m::UNREACHABLE_CODE);
            }
        }

        blk.append(Code::Switch {
            default: default_target.unwrap_or_else(|| exit.clone()),
            cases: table,
        }, span);
        blk.extend(cblk);
        blk.append(Code::Label(exit), span);
        Ok(blk)
    }

    fn lower_try_catch(&mut self, span: Span, body: &[Spanned<Stmt>], catches: &[Catch],
                       env: &mut Env) -> Result<Block> {
        let exit = fresh_label();
        let mut cblk = Block::new(env.len());
        for st in body {
            cblk.extend(self.lower_stmt(st, env)?);
        }
        cblk.append(Code::Goto(exit.clone()), span);

        let mut end_label: Option<Label> = None;
        let mut handlers = Vec::new();
        for c in catches {
            let reg = allocate(&c.variable.base, env);
            let lab = fresh_label();
            if end_label.is_none() {
                end_label = Some(lab.clone());
            }
            let (t, constraint) = self.expand_in_context(&c.ty)?;
            if constraint.is_some() {
                // TODO: run the caught type's constraint before entering the handler
                trace!("dropping the constraint of a caught type at {:?}", c.ty.span);
            }
            handlers.push((t, lab.clone()));
            cblk.append(Code::Label(lab), c.ty.span);
            cblk.append(Code::Store(reg), c.ty.span);
            for st in &c.body {
                cblk.extend(self.lower_stmt(st, env)?);
            }
            cblk.append(Code::Goto(exit.clone()), c.ty.span);
        }

        match end_label {
            Some(end) => {
                let mut blk = Block::new(env.len());
                blk.append(Code::TryCatch { end: end, catches: handlers }, span);
                blk.extend(cblk);
                blk.append(Code::Label(exit), span);
                Ok(blk)
            }
            None => {
                // no handlers; only the protected body remains
                cblk.append(Code::Label(exit), span);
                Ok(cblk)
            }
        }
    }

    fn lower_while(&mut self, span: Span, condition: &Spanned<Expr>,
                   invariant: &Option<Spanned<Expr>>, body: &[Spanned<Stmt>],
                   env: &mut Env) -> Result<Block> {
        let label = fresh_label();
        let mut blk = Block::new(env.len());
        self.append_invariant(&mut blk, invariant, env, "loop invariant not satisfied on entry")?;
        blk.append(Code::Loop { end: label.clone(), modified: vec![] }, span);
        blk.extend(self.lower_condition(&label, &invert(condition), env)?);

        let cont = fresh_label();
        let scope = LoopScope {
            break_label: label.clone(),
            continue_label: Some(cont.clone()),
        };
        let body_blk = self.with_scope(scope, |this| {
            let mut b = Block::new(0);
            for st in body {
                b.extend(this.lower_stmt(st, env)?);
            }
            Ok(b)
        })?;
        blk.extend(body_blk);
        blk.append(Code::Label(cont), span);

        self.append_invariant(&mut blk, invariant, env, "loop invariant not restored")?;
        blk.append(Code::End(label), span);
        Ok(blk)
    }

    fn lower_do_while(&mut self, span: Span, condition: &Spanned<Expr>,
                      invariant: &Option<Spanned<Expr>>, body: &[Spanned<Stmt>],
                      env: &mut Env) -> Result<Block> {
        let label = fresh_label();
        let mut blk = Block::new(env.len());
        self.append_invariant(&mut blk, invariant, env, "loop invariant not satisfied on entry")?;
        blk.append(Code::Loop { end: label.clone(), modified: vec![] }, span);

        let cont = fresh_label();
        let scope = LoopScope {
            break_label: label.clone(),
            continue_label: Some(cont.clone()),
        };
        let body_blk = self.with_scope(scope, |this| {
            let mut b = Block::new(0);
            for st in body {
                b.extend(this.lower_stmt(st, env)?);
            }
            Ok(b)
        })?;
        blk.extend(body_blk);
        blk.append(Code::Label(cont), span);

        self.append_invariant(&mut blk, invariant, env, "loop invariant not restored")?;
        blk.extend(self.lower_condition(&label, &invert(condition), env)?);
        blk.append(Code::End(label), span);
        Ok(blk)
    }

    fn lower_for(&mut self, span: Span, variables: &[Spanned<Name>], source: &Spanned<Expr>,
                 invariant: &Option<Spanned<Expr>>, body: &[Spanned<Stmt>],
                 env: &mut Env) -> Result<Block> {
        let label = fresh_label();
        let mut blk = Block::new(env.len());
        self.append_invariant(&mut blk, invariant, env, "loop invariant not satisfied on entry")?;
        blk.extend(self.lower_expr(source, env)?);

        if variables.len() > 1 {
            // iterate into a temporary and destructure it each time round
            let free = allocate_temp(env);
            blk.append(Code::ForAll { slot: free, end: label.clone(), modified: vec![] }, span);
            blk.append(Code::Load(free), span);
            blk.append(Code::Destructure, span);
            for var in variables.iter().rev() {
                let reg = allocate(&var.base, env);
                blk.append(Code::Store(reg), span);
            }
        } else {
            let var = match variables.first() {
                Some(var) => var,
                None => return self.internal_failure(span, "for loop without variables"),
            };
            let reg = allocate(&var.base, env);
            blk.append(Code::ForAll { slot: reg, end: label.clone(), modified: vec![] }, span);
        }

        let cont = fresh_label();
        let scope = LoopScope {
            break_label: label.clone(),
            continue_label: Some(cont.clone()),
        };
        let body_blk = self.with_scope(scope, |this| {
            let mut b = Block::new(0);
            for st in body {
                b.extend(this.lower_stmt(st, env)?);
            }
            Ok(b)
        })?;
        blk.extend(body_blk);
        blk.append(Code::Label(cont), span);

        self.append_invariant(&mut blk, invariant, env, "loop invariant not restored")?;
        blk.append(Code::End(label), span);
        Ok(blk)
    }

    // the `Assert ... Fail ... Label` shape shared by every invariant site
    fn append_invariant(&mut self, blk: &mut Block, invariant: &Option<Spanned<Expr>>,
                        env: &mut Env, msg: &str) -> Result<()> {
        if let Some(ref inv) = *invariant {
            let lab = fresh_label();
            blk.append(Code::Assert(lab.clone()), inv.span);
            let cond = self.lower_condition(&lab, inv, env)?;
            blk.extend(cond);
            blk.append(Code::Fail(msg.into()), inv.span);
            blk.append(Code::Label(lab), inv.span);
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // conditions

    /// Translates a condition: the block falls through when the condition is
    /// false and branches to `target` when it is true.
    pub fn lower_condition(&mut self, target: &Label, e: &Spanned<Expr>,
                           env: &mut Env) -> Result<Block> {
        match e.base {
            Expr::Constant(ref v) => {
                let mut blk = Block::new(env.len());
                match *v {
                    Value::Bool(true) => blk.append(Code::Goto(target.clone()), e.span),
                    Value::Bool(false) => {}
                    _ => return self.syntax_error(e.span, m::INVALID_BOOLEAN_EXPRESSION),
                }
                Ok(blk)
            }

            Expr::LocalVariable(ref v) => {
                let slot = match env.get(v) {
                    Some(&s) => s,
                    None => return self.syntax_error(e.span, m::UNKNOWN_VARIABLE),
                };
                let mut blk = Block::new(env.len());
                blk.append(Code::Load(slot), e.span);
                blk.append(Code::Const(Value::Bool(true)), e.span);
                blk.append(Code::IfGoto(COp::Eq, target.clone()), e.span);
                Ok(blk)
            }

            Expr::ExternalAccess(..) | Expr::Invoke { .. } |
            Expr::RecordAccess(..) | Expr::ListAccess(..) => {
                let mut blk = self.lower_expr(e, env)?;
                blk.append(Code::Const(Value::Bool(true)), e.span);
                blk.append(Code::IfGoto(COp::Eq, target.clone()), e.span);
                Ok(blk)
            }

            Expr::BinOp(op, ref lhs, ref rhs) => {
                self.lower_binop_condition(target, e.span, op, lhs, rhs, env)
            }

            Expr::UnOp(UOp::Not, ref inner) => {
                let lab = fresh_label();
                let mut blk = self.lower_condition(&lab, inner, env)?;
                blk.append(Code::Goto(target.clone()), e.span);
                blk.append(Code::Label(lab), e.span);
                Ok(blk)
            }

            Expr::Comprehension { op, ref sources, ref condition, .. } => {
                self.lower_quantifier_condition(target, e.span, op, sources, condition, env)
            }

            _ => self.syntax_error(e.span, m::INVALID_BOOLEAN_EXPRESSION),
        }
    }

    fn lower_binop_condition(&mut self, target: &Label, span: Span, op: BOp,
                             lhs: &Spanned<Expr>, rhs: &Spanned<Expr>,
                             env: &mut Env) -> Result<Block> {
        match op {
            BOp::Or => {
                let mut blk = self.lower_condition(target, lhs, env)?;
                blk.extend(self.lower_condition(target, rhs, env)?);
                Ok(blk)
            }

            BOp::And => {
                let exit = fresh_label();
                let mut blk = self.lower_condition(&exit, &invert(lhs), env)?;
                blk.extend(self.lower_condition(target, rhs, env)?);
                blk.append(Code::Label(exit), span);
                Ok(blk)
            }

            BOp::Is => self.lower_type_condition(target, span, lhs, rhs, env),

            _ => {
                let cop = match comparison_op(op) {
                    Some(c) => c,
                    None => return self.syntax_error(span, m::INVALID_BOOLEAN_EXPRESSION),
                };

                // comparisons against null rewrite into type tests so the
                // flow typing can narrow afterwards
                if (cop == COp::Eq || cop == COp::Neq) && is_null_constant(rhs) {
                    if let Expr::LocalVariable(ref v) = lhs.base {
                        let slot = match env.get(v) {
                            Some(&s) => s,
                            None => return self.syntax_error(lhs.span, m::UNKNOWN_VARIABLE),
                        };
                        let mut blk = Block::new(env.len());
                        if cop == COp::Eq {
                            blk.append(Code::IfType {
                                slot: Some(slot),
                                ty: T_NULL,
                                target: target.clone(),
                            }, span);
                        } else {
                            let exit = fresh_label();
                            blk.append(Code::IfType {
                                slot: Some(slot),
                                ty: T_NULL,
                                target: exit.clone(),
                            }, span);
                            blk.append(Code::Goto(target.clone()), span);
                            blk.append(Code::Label(exit), span);
                        }
                        return Ok(blk);
                    }
                }

                let mut blk = self.lower_expr(lhs, env)?;
                blk.extend(self.lower_expr(rhs, env)?);
                blk.append(Code::IfGoto(cop, target.clone()), span);
                Ok(blk)
            }
        }
    }

    fn lower_type_condition(&mut self, target: &Label, span: Span, lhs: &Spanned<Expr>,
                            rhs: &Spanned<Expr>, env: &mut Env) -> Result<Block> {
        let (ty, constraint) = match rhs.base {
            Expr::TypeConst(ref ut) => self.expand_in_context(ut)?,
            _ => return self.syntax_error(rhs.span, m::INVALID_BOOLEAN_EXPRESSION),
        };

        let (slot, mut blk) = match lhs.base {
            Expr::LocalVariable(ref v) => {
                match env.get(v) {
                    Some(&s) => (Some(s), Block::new(env.len())),
                    None => return self.syntax_error(lhs.span, m::UNKNOWN_VARIABLE),
                }
            }
            _ => (None, self.lower_expr(lhs, env)?),
        };

        match constraint {
            None => {
                blk.append(Code::IfType { slot: slot, ty: ty, target: target.clone() }, span);
                Ok(blk)
            }
            Some(c) => {
                // a constrained type holds when the structural test *and* the
                // constraint hold; normalise the subject into a slot so the
                // constraint can read it
                let subject = match slot {
                    Some(s) => s,
                    None => {
                        let tmp = allocate_temp(env);
                        blk.append(Code::Store(tmp), span);
                        tmp
                    }
                };
                let exit = fresh_label();
                blk.append(Code::IfType {
                    slot: Some(subject),
                    ty: types::negation(&ty),
                    target: exit.clone(),
                }, span);
                let bound = bind_constraint(&c.chain(&exit), subject, env);
                blk.extend(bound);
                blk.append(Code::Goto(target.clone()), span);
                blk.append(Code::Label(exit), span);
                Ok(blk)
            }
        }
    }

    fn lower_quantifier_condition(&mut self, target: &Label, span: Span, op: CompOp,
                                  sources: &[(Spanned<Name>, Spanned<Expr>)],
                                  condition: &Option<Box<Spanned<Expr>>>,
                                  env: &mut Env) -> Result<Block> {
        if op != CompOp::Some && op != CompOp::None {
            return self.syntax_error(span, m::INVALID_BOOLEAN_EXPRESSION);
        }
        let cond = match *condition {
            Some(ref c) => c,
            None => return self.syntax_error(span, m::INVALID_BOOLEAN_EXPRESSION),
        };

        let mut blk = Block::new(env.len());
        let slots = self.comprehension_sources(&mut blk, sources, env)?;

        let mut labels = Vec::new();
        for &(var_slot, src_slot) in &slots {
            let lab = fresh_label();
            blk.append(Code::Load(src_slot), span);
            blk.append(Code::ForAll { slot: var_slot, end: lab.clone(), modified: vec![] },
                       span);
            labels.push(lab);
        }

        if op == CompOp::None {
            let exit = fresh_label();
            blk.extend(self.lower_condition(&exit, cond, env)?);
            for lab in labels.iter().rev() {
                blk.append(Code::End(lab.clone()), span);
            }
            blk.append(Code::Goto(target.clone()), span);
            blk.append(Code::Label(exit), span);
        } else {
            blk.extend(self.lower_condition(target, cond, env)?);
            for lab in labels.iter().rev() {
                blk.append(Code::End(lab.clone()), span);
            }
        }
        Ok(blk)
    }

    // evaluates the source collections of a comprehension, reusing the slot
    // of a plain variable source rather than copying it
    fn comprehension_sources(&mut self, blk: &mut Block,
                             sources: &[(Spanned<Name>, Spanned<Expr>)],
                             env: &mut Env) -> Result<Vec<(usize, usize)>> {
        let mut slots = Vec::new();
        for &(ref var, ref src) in sources {
            let var_slot = allocate(&var.base, env);
            let src_slot = match src.base {
                Expr::LocalVariable(ref v) if env.contains_key(v) => env[v],
                _ => {
                    blk.extend(self.lower_expr(src, env)?);
                    let s = allocate_temp(env);
                    blk.append(Code::Store(s), src.span);
                    s
                }
            };
            slots.push((var_slot, src_slot));
        }
        Ok(slots)
    }

    // -----------------------------------------------------------------
    // expressions

    /// Translates an expression; the resulting block leaves the value on the
    /// operand stack.
    pub fn lower_expr(&mut self, e: &Spanned<Expr>, env: &mut Env) -> Result<Block> {
        match e.base {
            Expr::Constant(ref v) => {
                let mut blk = Block::new(env.len());
                blk.append(Code::Const(v.clone()), e.span);
                Ok(blk)
            }

            Expr::LocalVariable(ref v) => {
                match env.get(v) {
                    Some(&slot) => {
                        let mut blk = Block::new(env.len());
                        blk.append(Code::Load(slot), e.span);
                        Ok(blk)
                    }
                    None => self.syntax_error(e.span, m::VARIABLE_POSSIBLY_UNINITIALISED),
                }
            }

            Expr::ExternalAccess(ref nid) => {
                let val = self.lookup_constant(nid, e.span)?;
                let mut blk = Block::new(env.len());
                blk.append(Code::Const(val), e.span);
                Ok(blk)
            }

            Expr::BinOp(op, ref lhs, ref rhs) => self.lower_binop_expr(e, op, lhs, rhs, env),

            Expr::UnOp(op, ref inner) => self.lower_unop_expr(e, op, inner, env),

            Expr::NaryOp(NOp::SubList, ref args) => {
                if args.len() != 3 {
                    return self.internal_failure(e.span, "sublist takes exactly three operands");
                }
                let mut blk = self.lower_expr(&args[0], env)?;
                blk.extend(self.lower_expr(&args[1], env)?);
                blk.extend(self.lower_expr(&args[2], env)?);
                blk.append(Code::SubList, e.span);
                Ok(blk)
            }

            Expr::NaryOp(nop, ref args) => {
                let mut blk = Block::new(env.len());
                for a in args {
                    blk.extend(self.lower_expr(a, env)?);
                }
                match nop {
                    NOp::ListGen => blk.append(Code::NewList(args.len()), e.span),
                    NOp::SetGen => blk.append(Code::NewSet(args.len()), e.span),
                    NOp::SubList => {}
                }
                Ok(blk)
            }

            Expr::Convert(ref ut, ref inner) => {
                let mut blk = self.lower_expr(inner, env)?;
                let (t, constraint) = self.expand_in_context(ut)?;
                if constraint.is_some() {
                    // TODO: check the target type's constraint after converting
                    trace!("dropping the constraint of a conversion target at {:?}", e.span);
                }
                blk.append(Code::Convert(t), e.span);
                Ok(blk)
            }

            Expr::ListAccess(ref src, ref index) => {
                let mut blk = self.lower_expr(src, env)?;
                blk.extend(self.lower_expr(index, env)?);
                blk.append(Code::ListLoad, e.span);
                Ok(blk)
            }

            Expr::RecordAccess(ref lhs, ref name) => {
                let mut blk = self.lower_expr(lhs, env)?;
                blk.append(Code::FieldLoad(name.base.clone()), e.span);
                Ok(blk)
            }

            Expr::RecordGen(ref fields) => {
                // fields evaluate in name order, matching the record layout
                let mut sorted: Vec<&(Spanned<Name>, Spanned<Expr>)> = fields.iter().collect();
                sorted.sort_by(|a, b| a.0.base.cmp(&b.0.base));
                let mut blk = Block::new(env.len());
                let mut tys = Vec::new();
                for pair in &sorted {
                    blk.extend(self.lower_expr(&pair.1, env)?);
                    tys.push((pair.0.base.clone(), T_ANY));
                }
                blk.append(Code::NewRecord(Type::record(false, tys)), e.span);
                Ok(blk)
            }

            Expr::TupleGen(ref fields) => {
                let mut blk = Block::new(env.len());
                for f in fields {
                    blk.extend(self.lower_expr(f, env)?);
                }
                blk.append(Code::NewTuple(fields.len()), e.span);
                Ok(blk)
            }

            Expr::DictionaryGen(ref pairs) => {
                let mut blk = Block::new(env.len());
                for &(ref k, ref v) in pairs {
                    blk.extend(self.lower_expr(k, env)?);
                    blk.extend(self.lower_expr(v, env)?);
                }
                blk.append(Code::NewDict(pairs.len()), e.span);
                Ok(blk)
            }

            Expr::Comprehension { .. } => self.lower_comprehension(e, env),

            Expr::Invoke { .. } => self.lower_invoke(e, true, env),

            Expr::Function { ref name, ref parameter_types, ref module } => {
                let mid = match *module {
                    Some(ref m) => m.clone(),
                    None => return self.syntax_error(e.span, m::UNKNOWN_FUNCTION_OR_METHOD),
                };
                let nid = NameId::new(mid, name.base.clone());
                let tf = match *parameter_types {
                    Some(ref pts) => {
                        let mut params = Vec::new();
                        for pt in pts {
                            let (t, _constraint) = self.expand_in_context(pt)?;
                            params.push(t);
                        }
                        Some(Type::function(T_ANY, params))
                    }
                    None => None,
                };
                let mut blk = Block::new(env.len());
                blk.append(Code::Const(Value::FunConst(nid, tf)), e.span);
                Ok(blk)
            }

            Expr::TypeConst(_) => {
                self.internal_failure(e.span, "type expression outside a type test")
            }
        }
    }

    fn lower_binop_expr(&mut self, e: &Spanned<Expr>, op: BOp, lhs: &Spanned<Expr>,
                        rhs: &Spanned<Expr>, env: &mut Env) -> Result<Block> {
        match op {
            BOp::Eq | BOp::Neq | BOp::Lt | BOp::LtEq | BOp::Gt | BOp::GtEq |
            BOp::Subset | BOp::SubsetEq | BOp::ElemOf | BOp::And | BOp::Or | BOp::Is => {
                // materialise a boolean via the condition form
                let true_lab = fresh_label();
                let exit_lab = fresh_label();
                let mut blk = self.lower_condition(&true_lab, e, env)?;
                blk.append(Code::Const(Value::Bool(false)), e.span);
                blk.append(Code::Goto(exit_lab.clone()), e.span);
                blk.append(Code::Label(true_lab), e.span);
                blk.append(Code::Const(Value::Bool(true)), e.span);
                blk.append(Code::Label(exit_lab), e.span);
                Ok(blk)
            }

            BOp::Union => {
                let mut blk = self.lower_expr(lhs, env)?;
                blk.extend(self.lower_expr(rhs, env)?);
                blk.append(Code::SetUnion(OpDir::Uniform), e.span);
                Ok(blk)
            }

            BOp::Intersection => {
                let mut blk = self.lower_expr(lhs, env)?;
                blk.extend(self.lower_expr(rhs, env)?);
                blk.append(Code::SetIntersect(OpDir::Uniform), e.span);
                Ok(blk)
            }

            BOp::Difference => {
                // set difference rides on the subtraction opcode
                let mut blk = self.lower_expr(lhs, env)?;
                blk.extend(self.lower_expr(rhs, env)?);
                blk.append(Code::BinOp(IlBOp::Sub), e.span);
                Ok(blk)
            }

            _ => {
                let bop = match binary_op(op) {
                    Some(b) => b,
                    None => return self.syntax_error(e.span, m::INVALID_BINARY_EXPRESSION),
                };
                let mut blk = self.lower_expr(lhs, env)?;
                blk.extend(self.lower_expr(rhs, env)?);
                blk.append(Code::BinOp(bop), e.span);
                Ok(blk)
            }
        }
    }

    fn lower_unop_expr(&mut self, e: &Spanned<Expr>, op: UOp, inner: &Spanned<Expr>,
                       env: &mut Env) -> Result<Block> {
        match op {
            UOp::Neg => {
                // no unary negate exists; subtract from zero instead
                let mut blk = Block::new(env.len());
                blk.append(Code::Const(Value::int(0)), e.span);
                blk.extend(self.lower_expr(inner, env)?);
                blk.append(Code::BinOp(IlBOp::Sub), e.span);
                Ok(blk)
            }

            UOp::Invert => {
                // byte inversion is xor against the full byte
                let mut blk = Block::new(env.len());
                blk.append(Code::Const(Value::Byte(0xff)), e.span);
                blk.extend(self.lower_expr(inner, env)?);
                blk.append(Code::BinOp(IlBOp::Xor), e.span);
                Ok(blk)
            }

            UOp::Not => {
                let false_lab = fresh_label();
                let exit = fresh_label();
                let mut blk = self.lower_condition(&false_lab, inner, env)?;
                blk.append(Code::Const(Value::Bool(true)), e.span);
                blk.append(Code::Goto(exit.clone()), e.span);
                blk.append(Code::Label(false_lab), e.span);
                blk.append(Code::Const(Value::Bool(false)), e.span);
                blk.append(Code::Label(exit), e.span);
                Ok(blk)
            }

            UOp::LengthOf => {
                let mut blk = self.lower_expr(inner, env)?;
                blk.append(Code::ListLength, e.span);
                Ok(blk)
            }

            UOp::ProcessAccess => {
                let mut blk = self.lower_expr(inner, env)?;
                blk.append(Code::ProcLoad, e.span);
                Ok(blk)
            }

            UOp::ProcessSpawn => {
                let mut blk = self.lower_expr(inner, env)?;
                blk.append(Code::Spawn, e.span);
                Ok(blk)
            }
        }
    }

    fn lower_comprehension(&mut self, e: &Spanned<Expr>, env: &mut Env) -> Result<Block> {
        let (op, value, sources, condition) = match e.base {
            Expr::Comprehension { op, ref value, ref sources, ref condition } => {
                (op, value, sources, condition)
            }
            _ => return self.internal_failure(e.span, "not a comprehension"),
        };

        if op == CompOp::Some || op == CompOp::None {
            // materialise the quantifier through the condition form
            let true_lab = fresh_label();
            let exit = fresh_label();
            let free = allocate_temp(env);
            let mut blk = self.lower_quantifier_condition(&true_lab, e.span, op, sources,
                                                          condition, env)?;
            blk.append(Code::Const(Value::Bool(false)), e.span);
            blk.append(Code::Store(free), e.span);
            blk.append(Code::Goto(exit.clone()), e.span);
            blk.append(Code::Label(true_lab), e.span);
            blk.append(Code::Const(Value::Bool(true)), e.span);
            blk.append(Code::Store(free), e.span);
            blk.append(Code::Label(exit), e.span);
            blk.append(Code::Load(free), e.span);
            return Ok(blk);
        }

        let value = match *value {
            Some(ref v) => v,
            None => return self.internal_failure(e.span, "comprehension without a value"),
        };

        let mut blk = Block::new(env.len());
        let slots = self.comprehension_sources(&mut blk, sources, env)?;

        // the accumulator starts empty and each iteration unions one element in
        let result = allocate_temp(env);
        match op {
            CompOp::List => blk.append(Code::NewList(0), e.span),
            _ => blk.append(Code::NewSet(0), e.span),
        }
        blk.append(Code::Store(result), e.span);

        let continue_lab = fresh_label();
        let mut labels = Vec::new();
        for &(var_slot, src_slot) in &slots {
            let lab = fresh_label();
            blk.append(Code::Load(src_slot), e.span);
            blk.append(Code::ForAll { slot: var_slot, end: lab.clone(), modified: vec![] },
                       e.span);
            labels.push(lab);
        }

        if let Some(ref cond) = *condition {
            blk.extend(self.lower_condition(&continue_lab, &invert(cond), env)?);
        }

        blk.append(Code::Load(result), e.span);
        blk.extend(self.lower_expr(value, env)?);
        blk.append(Code::SetUnion(OpDir::Left), e.span);
        blk.append(Code::Store(result), e.span);

        if condition.is_some() {
            blk.append(Code::Label(continue_lab), e.span);
        }
        for lab in labels.iter().rev() {
            blk.append(Code::End(lab.clone()), e.span);
        }
        blk.append(Code::Load(result), e.span);
        Ok(blk)
    }

    // selects exactly one invocation form: indirect through a local variable
    // (with or without a receiver), indirect through a record field, direct,
    // direct on `this`, or a message send to another process
    fn lower_invoke(&mut self, e: &Spanned<Expr>, retval: bool, env: &mut Env) -> Result<Block> {
        let (name, receiver, arguments, synchronous, module) = match e.base {
            Expr::Invoke { ref name, ref receiver, ref arguments, synchronous, ref module } => {
                (name, receiver, arguments, synchronous, module)
            }
            _ => return self.internal_failure(e.span, "not an invocation"),
        };

        let receiver_is_this = match *receiver {
            Some(ref r) => match r.base {
                Expr::LocalVariable(ref v) => v.as_str() == "this",
                _ => false,
            },
            None => false,
        };
        let variable_indirect = env.contains_key(&name.base);
        let direct = !variable_indirect && receiver.is_none() && module.is_some();
        let method_invoke = !variable_indirect && receiver_is_this && module.is_some();
        let field_indirect = !variable_indirect && receiver.is_some() && module.is_none();
        let direct_send = !variable_indirect && receiver.is_some() && !receiver_is_this &&
                          module.is_some();

        let mut blk = Block::new(env.len());
        if variable_indirect {
            let slot = env[&name.base];
            blk.append(Code::Load(slot), e.span);
        }
        if let Some(ref r) = *receiver {
            blk.extend(self.lower_expr(r, env)?);
        }
        if field_indirect {
            blk.append(Code::FieldLoad(name.base.clone()), e.span);
        }

        let mut param_tys = Vec::new();
        for a in arguments {
            blk.extend(self.lower_expr(a, env)?);
            // parameter types default to any; a later inference stage tightens them
            param_tys.push(T_ANY);
        }

        if variable_indirect {
            if receiver.is_some() {
                blk.append(Code::IndirectSend {
                    ty: Type::method(None, T_VOID, param_tys),
                    synchronous: synchronous,
                    retval: retval,
                }, e.span);
            } else {
                blk.append(Code::IndirectInvoke {
                    ty: Type::function(T_VOID, param_tys),
                    retval: retval,
                }, e.span);
            }
        } else if field_indirect {
            blk.append(Code::IndirectInvoke {
                ty: Type::function(T_VOID, param_tys),
                retval: retval,
            }, e.span);
        } else if direct || method_invoke {
            let mid = match *module {
                Some(ref mid) => mid.clone(),
                None => return self.internal_failure(e.span, "missing module of a direct call"),
            };
            let nid = NameId::new(mid, name.base.clone());
            let ty = if receiver_is_this {
                Type::method(None, T_VOID, param_tys)
            } else {
                Type::function(T_VOID, param_tys)
            };
            blk.append(Code::Invoke { name: nid, ty: ty, retval: retval }, e.span);
        } else if direct_send {
            let mid = match *module {
                Some(ref mid) => mid.clone(),
                None => return self.internal_failure(e.span, "missing module of a send"),
            };
            let nid = NameId::new(mid, name.base.clone());
            blk.append(Code::Send {
                name: nid,
                ty: Type::method(None, T_VOID, param_tys),
                synchronous: synchronous,
                retval: retval,
            }, e.span);
        } else {
            return self.syntax_error(e.span, m::UNKNOWN_FUNCTION_OR_METHOD);
        }
        Ok(blk)
    }
}
